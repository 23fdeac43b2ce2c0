use nalgebra as na;

use super::generic::{CameraModel, rotate_axis_angle};
use super::opencv5::OpenCVModel5;
use crate::detected_points::Points2d;
use crate::error::{NetworkError, Result};
use crate::types::{Intrinsics, RvecTvec};

/// Parameters per camera in a bundle adjustment block:
/// `rvec(3) tvec(3) fx fy k1 k2 p1 p2 k3`.
pub const CAMERA_PARAMS: usize = 13;

/// Projects `p` (world frame) through a 13-element camera block.
///
/// The principal point is not part of the block and comes in as plain `f64`.
pub fn project_params<T: na::RealField>(
    params: &[T],
    principal: (f64, f64),
    p: &na::Vector3<T>,
) -> na::Vector2<T> {
    debug_assert!(params.len() >= CAMERA_PARAMS);
    let rvec = na::Vector3::new(params[0].clone(), params[1].clone(), params[2].clone());
    let tvec = na::Vector3::new(params[3].clone(), params[4].clone(), params[5].clone());
    let model = OpenCVModel5 {
        fx: params[6].clone(),
        fy: params[7].clone(),
        cx: na::convert(principal.0),
        cy: na::convert(principal.1),
        k1: params[8].clone(),
        k2: params[9].clone(),
        p1: params[10].clone(),
        p2: params[11].clone(),
        k3: params[12].clone(),
    };
    let p_cam = rotate_axis_angle(&rvec, p) + tvec;
    model.project_one(&p_cam)
}

/// Snapshot of a calibrated camera's geometry. Cheap to copy into worker threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraGeometry {
    pub cam_id: usize,
    pub pose: RvecTvec,
    pub intrinsics: Intrinsics,
    pub distortion: [f64; 5],
}

impl CameraGeometry {
    /// `P = K [R | t]`, distortion not included.
    pub fn projection_matrix(&self) -> na::Matrix3x4<f64> {
        let mut rt = na::Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.pose.rotation_matrix());
        rt.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.pose.tvec);
        self.intrinsics.k_matrix() * rt
    }

    pub fn project_one(&self, p: &na::Vector3<f64>) -> na::Vector2<f64> {
        project_params(&self.to_params(), self.principal(), p)
    }

    pub fn project(&self, p3d: &[na::Vector3<f64>]) -> Vec<na::Vector2<f64>> {
        let params = self.to_params();
        let principal = self.principal();
        p3d.iter()
            .map(|p| project_params(&params, principal, p))
            .collect()
    }

    /// `(|project(p) - observed|, project(p) - observed)`.
    pub fn reprojection_error(
        &self,
        p: &na::Vector3<f64>,
        observed: &na::Vector2<f64>,
    ) -> (f64, na::Vector2<f64>) {
        let residual = self.project_one(p) - observed;
        (residual.norm(), residual)
    }

    pub fn principal(&self) -> (f64, f64) {
        (self.intrinsics.cx, self.intrinsics.cy)
    }

    pub fn to_params(&self) -> [f64; CAMERA_PARAMS] {
        let mut out = [0.0; CAMERA_PARAMS];
        out[0..3].copy_from_slice(self.pose.rvec.as_slice());
        out[3..6].copy_from_slice(self.pose.tvec.as_slice());
        out[6] = self.intrinsics.fx;
        out[7] = self.intrinsics.fy;
        out[8..13].copy_from_slice(&self.distortion);
        out
    }

    /// Geometry with every parameter taken from a 13-element block.
    pub fn with_params(&self, params: &[f64]) -> CameraGeometry {
        let mut distortion = [0.0; 5];
        distortion.copy_from_slice(&params[8..13]);
        CameraGeometry {
            cam_id: self.cam_id,
            pose: RvecTvec::new(
                na::Vector3::new(params[0], params[1], params[2]),
                na::Vector3::new(params[3], params[4], params[5]),
            ),
            intrinsics: Intrinsics::new(params[6], params[7], self.intrinsics.cx, self.intrinsics.cy),
            distortion,
        }
    }

    pub fn model(&self) -> OpenCVModel5<f64> {
        OpenCVModel5 {
            fx: self.intrinsics.fx,
            fy: self.intrinsics.fy,
            cx: self.intrinsics.cx,
            cy: self.intrinsics.cy,
            k1: self.distortion[0],
            k2: self.distortion[1],
            p1: self.distortion[2],
            p2: self.distortion[3],
            k3: self.distortion[4],
        }
    }
}

/// One camera of the rig: identity, calibration state and its 2D observations.
#[derive(Debug, Clone)]
pub struct Camera {
    pub cam_id: usize,
    /// Index under which this camera's raw data is stored on disk.
    pub cam_id_read: usize,
    rvec: Option<na::Vector3<f64>>,
    tvec: Option<na::Vector3<f64>>,
    intrinsics: Option<Intrinsics>,
    distortion: [f64; 5],
    pub points2d: Points2d,
}

impl Camera {
    pub fn new(cam_id: usize, cam_id_read: usize, points2d: Points2d) -> Camera {
        Camera {
            cam_id,
            cam_id_read,
            rvec: None,
            tvec: None,
            intrinsics: None,
            distortion: [0.0; 5],
            points2d,
        }
    }

    pub fn set_rotation(&mut self, rvec: na::Vector3<f64>) {
        self.rvec = Some(rvec);
    }

    pub fn set_rotation_matrix(&mut self, r: &na::Matrix3<f64>) {
        let rot = na::Rotation3::from_matrix(r);
        self.rvec = Some(rot.scaled_axis());
    }

    pub fn set_translation(&mut self, tvec: na::Vector3<f64>) {
        self.tvec = Some(tvec);
    }

    pub fn set_intrinsics(&mut self, intrinsics: Intrinsics) {
        self.intrinsics = Some(intrinsics);
    }

    pub fn set_distortion(&mut self, distortion: [f64; 5]) {
        self.distortion = distortion;
    }

    pub fn set_pose(&mut self, pose: &RvecTvec) {
        self.set_rotation(pose.rvec);
        self.set_translation(pose.tvec);
    }

    pub fn rvec(&self) -> Option<na::Vector3<f64>> {
        self.rvec
    }
    pub fn tvec(&self) -> Option<na::Vector3<f64>> {
        self.tvec
    }
    pub fn intrinsics(&self) -> Option<Intrinsics> {
        self.intrinsics
    }
    pub fn distortion(&self) -> [f64; 5] {
        self.distortion
    }

    pub fn is_calibrated(&self) -> bool {
        self.rvec.is_some() && self.tvec.is_some() && self.intrinsics.is_some()
    }

    pub fn geometry(&self) -> Option<CameraGeometry> {
        Some(CameraGeometry {
            cam_id: self.cam_id,
            pose: RvecTvec::new(self.rvec?, self.tvec?),
            intrinsics: self.intrinsics?,
            distortion: self.distortion,
        })
    }

    /// Like [`Camera::geometry`], but a missing calibration is an error.
    pub fn calibrated_geometry(&self) -> Result<CameraGeometry> {
        self.geometry().ok_or(NetworkError::MissingCalibration {
            cam_id: self.cam_id,
        })
    }

    /// Applies a 13-element block. Intrinsics and distortion are written only
    /// when `with_intrinsics` is set.
    pub fn apply_params(&mut self, params: &[f64], with_intrinsics: bool) {
        self.set_rotation(na::Vector3::new(params[0], params[1], params[2]));
        self.set_translation(na::Vector3::new(params[3], params[4], params[5]));
        if with_intrinsics {
            if let Some(intr) = self.intrinsics {
                self.set_intrinsics(Intrinsics::new(params[6], params[7], intr.cx, intr.cy));
            }
            let mut distortion = [0.0; 5];
            distortion.copy_from_slice(&params[8..13]);
            self.set_distortion(distortion);
        }
    }

    pub fn project(&self, p3d: &[na::Vector3<f64>]) -> Result<Vec<na::Vector2<f64>>> {
        Ok(self.calibrated_geometry()?.project(p3d))
    }

    pub fn reprojection_error(
        &self,
        p: &na::Vector3<f64>,
        observed: &na::Vector2<f64>,
    ) -> Result<(f64, na::Vector2<f64>)> {
        Ok(self.calibrated_geometry()?.reprojection_error(p, observed))
    }
}
