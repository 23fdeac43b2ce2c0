use nalgebra as na;
use rayon::prelude::*;

pub trait CameraModel<T: na::RealField + Clone>
where
    Self: Sync,
{
    fn params(&self) -> na::DVector<T>;
    /// Projects a point already expressed in the camera frame.
    fn project_one(&self, pt: &na::Vector3<T>) -> na::Vector2<T>;
    fn project(&self, p3d: &[na::Vector3<T>]) -> Vec<na::Vector2<T>> {
        p3d.par_iter().map(|pt| self.project_one(pt)).collect()
    }
}

/// Rodrigues rotation of `p` by the axis-angle vector `rvec`.
///
/// Generic so it can be differentiated; near zero angle it falls back to the
/// first-order form `p + rvec x p`, which keeps derivatives finite at the origin.
pub fn rotate_axis_angle<T: na::RealField>(rvec: &na::Vector3<T>, p: &na::Vector3<T>) -> na::Vector3<T> {
    let theta2 = rvec.dot(rvec);
    let eps: T = na::convert(1e-12);
    if theta2 > eps {
        let theta = theta2.sqrt();
        let axis = rvec / theta.clone();
        let (sin, cos) = theta.sin_cos();
        let w_cross_p = axis.cross(p);
        let w_dot_p = axis.dot(p);
        p * cos.clone() + w_cross_p * sin + axis * (w_dot_p * (T::one() - cos))
    } else {
        p + rvec.cross(p)
    }
}
