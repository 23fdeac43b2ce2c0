use std::sync::Arc;

use nalgebra as na;
use tiny_solver::factors::Factor;

use super::solver::BlockResidualProblem;

/// One observation of a [`BlockResidualProblem`] as a tiny-solver factor.
///
/// Parameter blocks are `[camera, point]`. The camera block only carries the
/// free camera parameters; held ones are baked into `camera_layout`.
pub struct ReprojectionFactor<P> {
    pub problem: Arc<P>,
    pub obs: usize,
    /// One slot per camera parameter: `Some(value)` if held, `None` if free.
    pub camera_layout: Arc<Vec<Option<f64>>>,
}

impl<P> ReprojectionFactor<P> {
    pub fn new(problem: Arc<P>, obs: usize, camera_layout: Arc<Vec<Option<f64>>>) -> ReprojectionFactor<P> {
        ReprojectionFactor {
            problem,
            obs,
            camera_layout,
        }
    }
}

impl<P: BlockResidualProblem, T: na::RealField> Factor<T> for ReprojectionFactor<P> {
    fn residual_func(&self, params: &[na::DVector<T>]) -> na::DVector<T> {
        debug_assert_eq!(params.len(), 2, "expected [camera, point] parameter blocks");
        let mut free = params[0].iter();
        let camera: Vec<T> = self
            .camera_layout
            .iter()
            .map(|slot| match slot {
                Some(v) => na::convert(*v),
                None => free.next().cloned().unwrap_or_else(|| na::convert(0.0)),
            })
            .collect();
        let r = self
            .problem
            .residual_block(self.obs, &camera, params[1].as_slice());
        na::dvector![r[0].clone(), r[1].clone()]
    }
}
