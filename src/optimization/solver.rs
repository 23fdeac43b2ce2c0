use std::sync::Arc;

use nalgebra as na;
use rayon::prelude::*;
use serde::Serialize;

use super::sparsity::JacobianSparsity;
use crate::config::BundleAdjustConfig;

/// A least-squares problem whose residual splits into two-row blocks, each
/// depending on one camera block and one point block of the parameter vector.
///
/// `residual_block` is generic so backends can evaluate it with dual numbers.
pub trait BlockResidualProblem: Send + Sync {
    fn sparsity(&self) -> &JacobianSparsity;

    fn residual_block<T: na::RealField>(&self, obs: usize, camera: &[T], point: &[T]) -> na::Vector2<T>;

    /// Parameters that must not move. Their Jacobian columns are zero.
    fn is_fixed(&self, _col: usize) -> bool {
        false
    }

    fn residuals(&self, x: &[f64]) -> na::DVector<f64> {
        let sparsity = self.sparsity();
        let blocks: Vec<na::Vector2<f64>> = (0..sparsity.n_observations())
            .into_par_iter()
            .map(|obs| {
                let cam = &x[sparsity.camera_columns(sparsity.camera_indices[obs])];
                let point = &x[sparsity.point_columns(sparsity.point_indices[obs])];
                self.residual_block(obs, cam, point)
            })
            .collect();
        let mut out = na::DVector::zeros(2 * blocks.len());
        for (i, r) in blocks.iter().enumerate() {
            out[2 * i] = r.x;
            out[2 * i + 1] = r.y;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOptions {
    /// Stop when a step lowers the cost by less than `ftol * cost`.
    pub ftol: f64,
    /// Stop when `|dx| < xtol * (xtol + |x|)`.
    pub xtol: f64,
    pub max_nfev: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions::from(&BundleAdjustConfig::default())
    }
}

impl From<&BundleAdjustConfig> for SolveOptions {
    fn from(config: &BundleAdjustConfig) -> Self {
        SolveOptions {
            ftol: config.ftol,
            xtol: config.xtol,
            max_nfev: config.max_nfev,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Ftol,
    /// The step shrank below `xtol`, or no damping produced a descent step.
    Xtol,
    /// The cost reached zero to working precision.
    Converged,
    /// The evaluation cap was hit. Not an error: the last iterate is returned.
    MaxEvaluations,
    /// Nothing to optimize.
    NoResiduals,
    /// The backend could not solve a step; `x` is the last accepted iterate.
    BackendFailed,
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub x: na::DVector<f64>,
    pub initial_cost: f64,
    /// `0.5 * |r|^2` at `x`.
    pub cost: f64,
    pub residuals: na::DVector<f64>,
    pub nfev: usize,
    pub njev: usize,
    pub iterations: usize,
    pub status: TerminationReason,
}

impl SolveReport {
    pub fn mean_abs_residual(&self) -> f64 {
        if self.residuals.is_empty() {
            0.0
        } else {
            self.residuals.abs().mean()
        }
    }

    /// Report for a problem that was not iterated.
    pub fn unchanged(x: na::DVector<f64>, residuals: na::DVector<f64>, status: TerminationReason) -> SolveReport {
        let cost = 0.5 * residuals.norm_squared();
        SolveReport {
            x,
            initial_cost: cost,
            cost,
            residuals,
            nfev: 1,
            njev: 0,
            iterations: 0,
            status,
        }
    }
}

/// A sparse nonlinear least-squares backend.
///
/// Never fails: whatever the iteration reached is returned with a status.
pub trait LeastSquaresSolver {
    fn solve<P: BlockResidualProblem + 'static>(
        &self,
        problem: &Arc<P>,
        x0: &na::DVector<f64>,
        opts: &SolveOptions,
    ) -> SolveReport;
}
