pub mod epipolar;
pub mod factors;
pub mod linear;
pub mod problem;
pub mod solver;
pub mod sparsity;
pub mod tiny_backend;

pub use linear::*;
pub use problem::BundleProblem;
pub use solver::{BlockResidualProblem, LeastSquaresSolver, SolveOptions, SolveReport, TerminationReason};
pub use sparsity::JacobianSparsity;
pub use tiny_backend::TinySolverBackend;
