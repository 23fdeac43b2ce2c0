use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Camera pose as an axis-angle rotation and a translation, mapping world
/// points into the camera frame: `p_cam = R(rvec) * p_world + tvec`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RvecTvec {
    pub rvec: na::Vector3<f64>,
    pub tvec: na::Vector3<f64>,
}

impl RvecTvec {
    pub fn new(rvec: na::Vector3<f64>, tvec: na::Vector3<f64>) -> RvecTvec {
        RvecTvec { rvec, tvec }
    }
    pub fn identity() -> RvecTvec {
        RvecTvec::new(na::Vector3::zeros(), na::Vector3::zeros())
    }
    pub fn to_na_isometry3(&self) -> na::Isometry3<f64> {
        na::Isometry3::new(self.tvec, self.rvec)
    }
    pub fn rotation_matrix(&self) -> na::Matrix3<f64> {
        na::Rotation3::new(self.rvec).into_inner()
    }
}

pub trait ToRvecTvec {
    fn to_rvec_tvec(&self) -> RvecTvec;
}

impl ToRvecTvec for na::Isometry3<f64> {
    fn to_rvec_tvec(&self) -> RvecTvec {
        RvecTvec::new(self.rotation.scaled_axis(), self.translation.vector)
    }
}

/// Pinhole intrinsics. The principal point is fixed per rig (image center)
/// and never optimized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Intrinsics {
        Intrinsics { fx, fy, cx, cy }
    }

    /// Intrinsics for an image of `width x height` with the principal point at the center.
    pub fn centered(focal: f64, width: u32, height: u32) -> Intrinsics {
        Intrinsics::new(focal, focal, width as f64 / 2.0, height as f64 / 2.0)
    }

    pub fn k_matrix(&self) -> na::Matrix3<f64> {
        na::Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn from_k_matrix(k: &na::Matrix3<f64>) -> Intrinsics {
        Intrinsics::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    pub fn mean_focal(&self) -> f64 {
        (self.fx + self.fy) / 2.0
    }
}
