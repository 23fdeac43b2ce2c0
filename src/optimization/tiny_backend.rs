use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use nalgebra as na;
use tiny_solver::LevenbergMarquardtOptimizer;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;

use super::factors::ReprojectionFactor;
use super::solver::{BlockResidualProblem, LeastSquaresSolver, SolveOptions, SolveReport, TerminationReason};
use super::sparsity::{JacobianSparsity, POINT_PARAMS};

const MIN_DIAGONAL: f64 = 1e-6;
const MAX_DIAGONAL: f64 = 1e32;
const INITIAL_TRUST_REGION_RADIUS: f64 = 1e4;
const MAX_TRUST_REGION_RADIUS: f64 = 1e8;
const MIN_TRUST_REGION_RADIUS: f64 = 1e-12;
const ZERO_COST: f64 = 1e-20;

fn camera_key(block: usize) -> String {
    format!("cam{}", block)
}

fn point_key(point: usize) -> String {
    format!("pt{}", point)
}

/// tiny-solver's sparse autodiff Levenberg-Marquardt as a bundle adjustment backend.
///
/// tiny-solver scales the Jacobian by its column norms and solves the damped
/// normal equations with a sparse Cholesky over the factor graph. It is run one
/// iteration at a time so the trust region, the tolerances and the evaluation
/// cap are tracked here.
#[derive(Debug, Clone, Default)]
pub struct TinySolverBackend {
    pub verbosity: usize,
}

/// Parameter blocks handed to tiny-solver, and how they map back into `x`.
struct BlockLayout {
    cameras: Vec<(usize, Vec<usize>)>,
    points: Vec<usize>,
}

impl BlockLayout {
    fn new<P: BlockResidualProblem>(problem: &P) -> BlockLayout {
        let sparsity = problem.sparsity();
        let used_cameras: BTreeSet<usize> = sparsity.camera_indices.iter().copied().collect();
        let used_points: BTreeSet<usize> = sparsity.point_indices.iter().copied().collect();
        let cameras = used_cameras
            .into_iter()
            .map(|c| {
                let free = sparsity.camera_columns(c).filter(|col| !problem.is_fixed(*col)).collect();
                (c, free)
            })
            .collect();
        BlockLayout {
            cameras,
            points: used_points.into_iter().collect(),
        }
    }

    fn values(&self, sparsity: &JacobianSparsity, x: &na::DVector<f64>) -> HashMap<String, na::DVector<f64>> {
        let mut values = HashMap::new();
        for (c, free) in &self.cameras {
            values.insert(camera_key(*c), na::DVector::from_iterator(free.len(), free.iter().map(|col| x[*col])));
        }
        for &p in &self.points {
            let start = sparsity.point_columns(p).start;
            values.insert(point_key(p), x.rows(start, POINT_PARAMS).into_owned());
        }
        values
    }

    fn write_back(
        &self,
        sparsity: &JacobianSparsity,
        x: &mut na::DVector<f64>,
        values: &HashMap<String, na::DVector<f64>>,
    ) {
        for (c, free) in &self.cameras {
            if let Some(v) = values.get(&camera_key(*c)) {
                for (col, value) in free.iter().zip(v.iter()) {
                    x[*col] = *value;
                }
            }
        }
        for &p in &self.points {
            if let Some(v) = values.get(&point_key(p)) {
                x.rows_mut(sparsity.point_columns(p).start, POINT_PARAMS)
                    .copy_from(v);
            }
        }
    }
}

impl LeastSquaresSolver for TinySolverBackend {
    fn solve<P: BlockResidualProblem + 'static>(
        &self,
        problem: &Arc<P>,
        x0: &na::DVector<f64>,
        opts: &SolveOptions,
    ) -> SolveReport {
        let sparsity = problem.sparsity();
        let initial_residuals = problem.residuals(x0.as_slice());
        if sparsity.n_observations() == 0 {
            return SolveReport::unchanged(x0.clone(), initial_residuals, TerminationReason::NoResiduals);
        }

        let layout = BlockLayout::new(problem.as_ref());
        let camera_layouts: HashMap<usize, Arc<Vec<Option<f64>>>> = layout
            .cameras
            .iter()
            .map(|(c, _)| {
                let slots = sparsity
                    .camera_columns(*c)
                    .map(|col| if problem.is_fixed(col) { Some(x0[col]) } else { None })
                    .collect();
                (*c, Arc::new(slots))
            })
            .collect();

        let mut ts_problem = Problem::new();
        for obs in 0..sparsity.n_observations() {
            let c = sparsity.camera_indices[obs];
            let cam = camera_key(c);
            let pt = point_key(sparsity.point_indices[obs]);
            ts_problem.add_residual_block(
                2,
                &[cam.as_str(), pt.as_str()],
                Box::new(ReprojectionFactor::new(
                    problem.clone(),
                    obs,
                    camera_layouts[&c].clone(),
                )),
                None,
            );
        }

        let options = OptimizerOptions {
            max_iteration: 1,
            verbosity_level: self.verbosity,
            ..Default::default()
        };

        let mut values = layout.values(sparsity, x0);
        let mut x = x0.clone();
        let mut residuals = initial_residuals;
        let initial_cost = 0.5 * residuals.norm_squared();
        let mut cost = initial_cost;
        let mut radius = INITIAL_TRUST_REGION_RADIUS;
        let mut nfev = 1;
        let mut njev = 0;
        let mut iterations = 0;

        let status = loop {
            if cost <= ZERO_COST {
                break TerminationReason::Converged;
            }
            if iterations >= opts.max_nfev {
                break TerminationReason::MaxEvaluations;
            }
            iterations += 1;

            let optimizer = LevenbergMarquardtOptimizer::new(MIN_DIAGONAL, MAX_DIAGONAL, radius);
            let Some(next) = optimizer.optimize(&ts_problem, &values, Some(options.clone())) else {
                log::warn!("tiny-solver could not solve a step, keeping the last iterate");
                break TerminationReason::BackendFailed;
            };
            njev += 1;

            let mut x_new = x.clone();
            layout.write_back(sparsity, &mut x_new, &next);
            let r_new = problem.residuals(x_new.as_slice());
            nfev += 1;
            let cost_new = 0.5 * r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let step = (&x_new - &x).norm();
                let ftol_hit = cost - cost_new < opts.ftol * cost;
                let xtol_hit = step < opts.xtol * (opts.xtol + x.norm());
                log::trace!("lm iter {} cost {:.6e} radius {:.3e}", iterations, cost_new, radius);
                x = x_new;
                residuals = r_new;
                cost = cost_new;
                values = next;
                radius = (radius * 3.0).min(MAX_TRUST_REGION_RADIUS);
                if ftol_hit {
                    break TerminationReason::Ftol;
                }
                if xtol_hit {
                    break TerminationReason::Xtol;
                }
            } else {
                radius *= 0.5;
                if radius < MIN_TRUST_REGION_RADIUS {
                    break TerminationReason::Xtol;
                }
            }
        };

        SolveReport {
            x,
            initial_cost,
            cost,
            residuals,
            nfev,
            njev,
            iterations,
            status,
        }
    }
}
