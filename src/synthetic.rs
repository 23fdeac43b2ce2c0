//! Synthetic rigs with exact ground truth, for tests, benches and demos.

use nalgebra as na;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::camera_model::{Camera, CameraGeometry};
use crate::config::NetworkConfig;
use crate::detected_points::{Detections, Points2d, is_missing};
use crate::error::Result;
use crate::io::{CalibrationRecord, CameraCalibration};
use crate::network::CameraNetwork;
use crate::skeleton::SkeletonConfig;
use crate::types::{Intrinsics, RvecTvec};

/// Pose of a camera at `eye` looking at `target`, image y pointing away from `up`.
pub fn look_at(eye: &na::Vector3<f64>, target: &na::Vector3<f64>, up: &na::Vector3<f64>) -> RvecTvec {
    let z = (target - eye).normalize();
    let x = z.cross(up).normalize();
    let y = z.cross(&x);
    let r = na::Matrix3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]);
    let rvec = na::Rotation3::from_matrix_unchecked(r).scaled_axis();
    RvecTvec::new(rvec, -(r * eye))
}

#[derive(Debug, Clone)]
pub struct SyntheticRig {
    pub geometries: Vec<CameraGeometry>,
    /// Ground truth, `[frame][joint]`.
    pub points: Vec<Vec<na::Vector3<f64>>>,
    pub image_shape: [u32; 2],
}

impl SyntheticRig {
    /// Cameras spread over half a ring of `radius` around the origin,
    /// alternating slightly above and below the ring plane, all looking at
    /// the origin. No two cameras face each other.
    pub fn ring(n_cameras: usize, radius: f64, focal: f64, image_shape: [u32; 2]) -> Vec<CameraGeometry> {
        let up = na::Vector3::z();
        (0..n_cameras)
            .map(|cam_id| {
                let theta = std::f64::consts::PI * cam_id as f64 / n_cameras as f64;
                let sign = if cam_id % 2 == 0 { 1.0 } else { -1.0 };
                let height = 0.2 * radius * sign;
                let eye = na::Vector3::new(radius * theta.cos(), radius * theta.sin(), height);
                CameraGeometry {
                    cam_id,
                    pose: look_at(&eye, &na::Vector3::zeros(), &up),
                    intrinsics: Intrinsics::centered(focal, image_shape[0], image_shape[1]),
                    distortion: [0.0; 5],
                }
            })
            .collect()
    }

    /// Uniform points in the cube `[-extent, extent]^3`.
    pub fn random_points(n_frames: usize, n_joints: usize, extent: f64, seed: u64) -> Vec<Vec<na::Vector3<f64>>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n_frames)
            .map(|_| {
                (0..n_joints)
                    .map(|_| {
                        na::Vector3::new(
                            rng.random_range(-extent..extent),
                            rng.random_range(-extent..extent),
                            rng.random_range(-extent..extent),
                        )
                    })
                    .collect()
            })
            .collect()
    }

    /// Ring of radius 10 with focal length 1000 on 960x480 images, points within 1 of the origin.
    pub fn new(n_cameras: usize, n_frames: usize, n_joints: usize, seed: u64) -> SyntheticRig {
        let image_shape = [960, 480];
        SyntheticRig {
            geometries: SyntheticRig::ring(n_cameras, 10.0, 1000.0, image_shape),
            points: SyntheticRig::random_points(n_frames, n_joints, 1.0, seed),
            image_shape,
        }
    }

    pub fn n_frames(&self) -> usize {
        self.points.len()
    }

    pub fn n_joints(&self) -> usize {
        self.points.first().map(|f| f.len()).unwrap_or(0)
    }

    /// Noiseless observation table of one camera.
    pub fn project(&self, cam: usize) -> Points2d {
        let g = &self.geometries[cam];
        let mut table = Points2d::zeros(self.n_frames(), self.n_joints());
        for (f, frame) in self.points.iter().enumerate() {
            for (j, p) in frame.iter().enumerate() {
                table.set(f, j, g.project_one(p));
            }
        }
        table
    }

    pub fn project_all(&self) -> Vec<Points2d> {
        (0..self.geometries.len()).map(|c| self.project(c)).collect()
    }

    /// Adds uniform noise in `[-amplitude, amplitude]` to every observed coordinate.
    pub fn add_noise(points2d: &mut Points2d, amplitude: f64, seed: u64) {
        if amplitude <= 0.0 {
            return;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for f in 0..points2d.n_frames() {
            for j in 0..points2d.n_joints() {
                let p = points2d.get(f, j);
                if is_missing(&p) {
                    continue;
                }
                let noise = na::Vector2::new(
                    rng.random_range(-amplitude..=amplitude),
                    rng.random_range(-amplitude..=amplitude),
                );
                points2d.set(f, j, p + noise);
            }
        }
    }

    /// Calibrated network over the rig's observations. The skeleton decides
    /// who sees what.
    pub fn to_network(&self, skeleton: SkeletonConfig, config: NetworkConfig, noise: f64, seed: u64) -> Result<CameraNetwork> {
        let cameras = self
            .geometries
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let mut points2d = self.project(i);
                SyntheticRig::add_noise(&mut points2d, noise, seed.wrapping_add(i as u64));
                let mut cam = Camera::new(g.cam_id, g.cam_id, points2d);
                cam.set_pose(&g.pose);
                cam.set_intrinsics(g.intrinsics);
                cam.set_distortion(g.distortion);
                cam
            })
            .collect();
        CameraNetwork::new(cameras, skeleton, config)
    }

    /// Every camera sees every joint.
    pub fn default_skeleton(&self) -> SkeletonConfig {
        let cam_ids: Vec<usize> = self.geometries.iter().map(|g| g.cam_id).collect();
        SkeletonConfig::all_visible(self.n_joints(), &cam_ids)
    }

    /// Detector-style output in pixels.
    pub fn detections(&self, noise: f64, seed: u64) -> Detections {
        let points = (0..self.geometries.len())
            .map(|i| {
                let mut table = self.project(i);
                SyntheticRig::add_noise(&mut table, noise, seed.wrapping_add(i as u64));
                table.to_nested()
            })
            .collect();
        Detections {
            points,
            normalized: false,
        }
    }

    pub fn calibration_record(&self) -> CalibrationRecord {
        let cameras = self
            .geometries
            .iter()
            .filter_map(|g| {
                let mut cam = Camera::new(g.cam_id, g.cam_id, Points2d::zeros(0, 0));
                cam.set_pose(&g.pose);
                cam.set_intrinsics(g.intrinsics);
                cam.set_distortion(g.distortion);
                CameraCalibration::from_camera(&cam).map(|c| (g.cam_id, c))
            })
            .collect();
        CalibrationRecord {
            cameras,
            meta: serde_json::json!({ "source": "synthetic" }),
        }
    }
}
