use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use nalgebra as na;
use rayon::prelude::*;
use serde::Serialize;

use crate::camera_model::Camera;
use crate::config::NetworkConfig;
use crate::data_loader::{CameraOrder, ManualCorrections};
use crate::detected_points::{Detections, Points2d, Points3d};
use crate::error::{NetworkError, Result};
use crate::io::{CalibrationRecord, CameraCalibration, CameraStats, Reconstruction};
use crate::optimization::epipolar::{RelativePose, relative_pose};
use crate::optimization::{BundleProblem, LeastSquaresSolver, SolveOptions, TerminationReason};
use crate::postprocess::{pin_points2d_to_median, pin_points3d_to_median};
use crate::skeleton::{DetectionHalf, SkeletonConfig};
use crate::triangulation::{CameraView, OutlierRecord, Triangulator};
use crate::types::{Intrinsics, RvecTvec};
use crate::util::reprojection_stats;

/// Mean absolute residual component plus the raw signed residuals.
#[derive(Debug, Clone, Default)]
pub struct ReprojectionSummary {
    pub mean_abs: f64,
    pub residuals: Vec<na::Vector2<f64>>,
}

impl ReprojectionSummary {
    fn from_residuals(residuals: Vec<na::Vector2<f64>>) -> ReprojectionSummary {
        let mean_abs = if residuals.is_empty() {
            0.0
        } else {
            residuals.iter().map(|r| r.x.abs() + r.y.abs()).sum::<f64>() / (2 * residuals.len()) as f64
        };
        ReprojectionSummary { mean_abs, residuals }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleAdjustReport {
    /// Cameras that owned a parameter block.
    pub cam_ids: Vec<usize>,
    pub n_points: usize,
    pub n_observations: usize,
    pub merged_observations: usize,
    /// Mean absolute residual before the solve.
    pub initial_error: f64,
    /// Mean absolute residual the solver finished on.
    pub final_error: f64,
    pub initial_cost: f64,
    pub cost: f64,
    pub nfev: usize,
    pub iterations: usize,
    pub status: TerminationReason,
}

/// A joint flagged for review by [`CameraNetwork::find_next_error`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewHit {
    pub frame: usize,
    pub joint: usize,
    pub error: f64,
}

fn collect_views<'a>(cameras: &'a [Camera], indices: &[usize]) -> Result<Vec<CameraView<'a>>> {
    indices
        .iter()
        .map(|&i| {
            let cam = &cameras[i];
            Ok(CameraView {
                geometry: cam.calibrated_geometry()?,
                points2d: &cam.points2d,
            })
        })
        .collect()
}

fn copy_joints(dst: &mut Points2d, src: &Points2d, offset: usize) {
    let n_frames = dst.n_frames().min(src.n_frames());
    for f in 0..n_frames {
        for j in 0..src.n_joints() {
            dst.set(f, offset + j, src.get(f, j));
        }
    }
}

/// The camera rig for one recording: one canonical camera registry plus the
/// shared `[frame][joint]` point tensor. Left, right and all-camera views are
/// index subsets of the same registry.
#[derive(Debug, Clone)]
pub struct CameraNetwork {
    cameras: Vec<Camera>,
    points3d: Points3d,
    skeleton: SkeletonConfig,
    config: NetworkConfig,
    outliers: Vec<OutlierRecord>,
}

impl CameraNetwork {
    /// Every camera's observation table must cover the same frames and the
    /// skeleton's joints.
    pub fn new(cameras: Vec<Camera>, skeleton: SkeletonConfig, config: NetworkConfig) -> Result<CameraNetwork> {
        skeleton.validate()?;
        let n_frames = cameras.first().map(|c| c.points2d.n_frames()).unwrap_or(0);
        for cam in &cameras {
            if cam.points2d.n_frames() != n_frames || cam.points2d.n_joints() != skeleton.num_joints {
                return Err(NetworkError::ShapeMismatch(format!(
                    "camera {} has {}x{} observations, expected {}x{}",
                    cam.cam_id,
                    cam.points2d.n_frames(),
                    cam.points2d.n_joints(),
                    n_frames,
                    skeleton.num_joints
                )));
            }
        }
        let points3d = Points3d::zeros(n_frames, skeleton.num_joints);
        Ok(CameraNetwork {
            cameras,
            points3d,
            skeleton,
            config,
            outliers: Vec::new(),
        })
    }

    /// Builds uncalibrated cameras from detector output.
    ///
    /// Half-skeleton detections are placed by the camera's side; a center
    /// camera takes its second half from the next view past the camera count.
    pub fn from_detections(
        detections: &Detections,
        order: &CameraOrder,
        skeleton: SkeletonConfig,
        config: NetworkConfig,
    ) -> Result<CameraNetwork> {
        let num_joints = skeleton.num_joints;
        let det_joints = detections.n_joints();
        let half_skeleton = det_joints != num_joints;
        if half_skeleton && det_joints * 2 != num_joints {
            return Err(NetworkError::ShapeMismatch(format!(
                "detections carry {} joints, skeleton has {}",
                det_joints, num_joints
            )));
        }
        let shape = config.image_shape.0;
        let mut extra_view = order.len();
        let mut cameras = Vec::with_capacity(order.len());
        for (cam_id, &cam_id_read) in order.cid2cidread.iter().enumerate() {
            let view = detections.view(cam_id_read, shape)?;
            let points2d = if half_skeleton {
                let mut points2d = Points2d::zeros(detections.n_frames(), num_joints);
                let offset = match skeleton.detection_half(cam_id) {
                    DetectionHalf::First => 0,
                    DetectionHalf::Second => det_joints,
                };
                copy_joints(&mut points2d, &view, offset);
                if skeleton.is_center_camera(cam_id) {
                    if extra_view < detections.n_views() {
                        let second = detections.view(extra_view, shape)?;
                        copy_joints(&mut points2d, &second, det_joints);
                    }
                    extra_view += 1;
                }
                points2d
            } else {
                view
            };
            cameras.push(Camera::new(cam_id, cam_id_read, points2d));
        }
        log::debug!(
            "{} cameras, {} frames from detections",
            cameras.len(),
            detections.n_frames()
        );
        CameraNetwork::new(cameras, skeleton, config)
    }

    pub fn set_camera_order(&mut self, order: &CameraOrder) -> Result<()> {
        if order.len() != self.cameras.len() {
            return Err(NetworkError::ShapeMismatch(format!(
                "camera order for {} cameras, network has {}",
                order.len(),
                self.cameras.len()
            )));
        }
        for cam in self.cameras.iter_mut() {
            if let Some(&read) = order.cid2cidread.get(cam.cam_id) {
                cam.cam_id_read = read;
            }
        }
        Ok(())
    }

    pub fn cameras(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn camera(&self, cam_id: usize) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.cam_id == cam_id)
    }

    pub fn camera_mut(&mut self, cam_id: usize) -> Option<&mut Camera> {
        self.cameras.iter_mut().find(|c| c.cam_id == cam_id)
    }

    pub fn index_of(&self, cam_id: usize) -> Option<usize> {
        self.cameras.iter().position(|c| c.cam_id == cam_id)
    }

    pub fn points3d(&self) -> &Points3d {
        &self.points3d
    }

    pub fn skeleton(&self) -> &SkeletonConfig {
        &self.skeleton
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Joints changed by the last triangulation's outlier rejection.
    pub fn outliers(&self) -> &[OutlierRecord] {
        &self.outliers
    }

    pub fn n_frames(&self) -> usize {
        self.points3d.n_frames()
    }

    pub fn all_ids(&self) -> Vec<usize> {
        self.cameras.iter().map(|c| c.cam_id).collect()
    }

    pub fn left_ids(&self) -> Vec<usize> {
        self.group_ids(&self.skeleton.left_cameras)
    }

    pub fn right_ids(&self) -> Vec<usize> {
        self.group_ids(&self.skeleton.right_cameras)
    }

    fn group_ids(&self, group: &[usize]) -> Vec<usize> {
        self.cameras
            .iter()
            .map(|c| c.cam_id)
            .filter(|id| group.contains(id))
            .collect()
    }

    pub fn has_calibration(&self) -> bool {
        !self.cameras.is_empty() && self.cameras.iter().all(|c| c.is_calibrated())
    }

    /// Registry indices for a camera-id subset, all cameras when `None`.
    fn resolve(&self, subset: Option<&[usize]>) -> Result<Vec<usize>> {
        match subset {
            None => Ok((0..self.cameras.len()).collect()),
            Some(ids) => ids
                .iter()
                .map(|&id| self.index_of(id).ok_or(NetworkError::UnknownCamera(id)))
                .collect(),
        }
    }

    /// Calibrated views of a subset. Fails before any geometry runs if one of
    /// them is not calibrated.
    pub fn views(&self, subset: Option<&[usize]>) -> Result<Vec<CameraView<'_>>> {
        collect_views(&self.cameras, &self.resolve(subset)?)
    }

    /// Rebuilds the whole point tensor from the given cameras.
    pub fn triangulate(&mut self, subset: Option<&[usize]>) -> Result<&[OutlierRecord]> {
        let indices = self.resolve(subset)?;
        let report = {
            let views = collect_views(&self.cameras, &indices)?;
            Triangulator::new(&self.skeleton, &self.config.triangulation).triangulate_all(
                &views,
                self.points3d.n_frames(),
                self.points3d.n_joints(),
            )
        };
        log::debug!("{} points triangulated", report.points3d.count_set());
        self.points3d = report.points3d;
        self.outliers = report.outliers;
        Ok(&self.outliers)
    }

    /// Residuals of every triangulated, non-ignored joint against every camera
    /// in the subset that sees and observed it.
    pub fn reprojection_error(
        &self,
        subset: Option<&[usize]>,
        ignore_joints: Option<&[usize]>,
    ) -> Result<ReprojectionSummary> {
        let views = self.views(subset)?;
        let ignore = ignore_joints.unwrap_or(self.skeleton.ignore_joints.as_slice());
        let residuals = self.residuals_for(&views, ignore);
        let summary = ReprojectionSummary::from_residuals(residuals);
        log::debug!("Ignore list {:?}: {:.4}", ignore, summary.mean_abs);
        Ok(summary)
    }

    fn residuals_for(&self, views: &[CameraView], ignore: &[usize]) -> Vec<na::Vector2<f64>> {
        let points3d = &self.points3d;
        let skeleton = &self.skeleton;
        (0..points3d.n_frames())
            .into_par_iter()
            .map(|frame| {
                let mut out = Vec::new();
                for joint in 0..points3d.n_joints() {
                    if ignore.contains(&joint) {
                        continue;
                    }
                    let Some(p) = points3d.get(frame, joint) else {
                        continue;
                    };
                    for view in views {
                        if !skeleton.camera_sees_joint(view.geometry.cam_id, joint) {
                            continue;
                        }
                        if let Some(obs) = view.points2d.observed(frame, joint) {
                            out.push(view.geometry.reprojection_error(&p, &obs).1);
                        }
                    }
                }
                out
            })
            .flatten()
            .collect()
    }

    /// `(cam_id, mean, median, count)` of the reprojection distance per camera.
    pub fn camera_stats(&self, ignore_joints: Option<&[usize]>) -> Result<Vec<CameraStats>> {
        let ignore = ignore_joints.unwrap_or(self.skeleton.ignore_joints.as_slice());
        let views = self.views(None)?;
        Ok(views
            .iter()
            .map(|view| {
                let residuals = self.residuals_for(std::slice::from_ref(view), ignore);
                let (avg, med) = reprojection_stats(&residuals);
                (view.geometry.cam_id, avg, med, residuals.len())
            })
            .collect())
    }

    /// Jointly refines the subset's cameras and the triangulated points, writes
    /// the refined poses back and re-triangulates with them.
    pub fn bundle_adjust<S: LeastSquaresSolver>(
        &mut self,
        solver: &S,
        subset: Option<&[usize]>,
        ignore_joints: Option<&[usize]>,
    ) -> Result<BundleAdjustReport> {
        let initial = self.reprojection_error(subset, ignore_joints)?;
        log::debug!(
            "Reprojection error before bundle adjustment: {:.4}",
            initial.mean_abs
        );
        let ignore = ignore_joints
            .map(|j| j.to_vec())
            .unwrap_or_else(|| self.skeleton.ignore_joints.clone());
        let indices = self.resolve(subset)?;
        let problem = {
            let views = collect_views(&self.cameras, &indices)?;
            BundleProblem::build(
                &views,
                &self.points3d,
                &self.skeleton,
                &ignore,
                &self.config.bundle_adjust,
            )
        };
        log::debug!(
            "Number of points for calibration: {}, observations: {}",
            problem.n_points(),
            problem.n_observations()
        );
        let problem = Arc::new(problem);
        let opts = SolveOptions::from(&self.config.bundle_adjust);
        let solve = solver.solve(&problem, problem.x0(), &opts);
        log::info!(
            "Bundle adjustment, average reprojection error: {:.4} ({:?})",
            solve.mean_abs_residual(),
            solve.status
        );

        for (cam_id, params) in problem.unpack_cameras(&solve.x) {
            if let Some(cam) = self.camera_mut(cam_id) {
                cam.apply_params(&params, problem.refines_intrinsics());
            }
        }
        self.triangulate(subset)?;

        Ok(BundleAdjustReport {
            cam_ids: problem.cam_ids().to_vec(),
            n_points: problem.n_points(),
            n_observations: problem.n_observations(),
            merged_observations: problem.merged_observations(),
            initial_error: initial.mean_abs,
            final_error: solve.mean_abs_residual(),
            initial_cost: solve.initial_cost,
            cost: solve.cost,
            nfev: solve.nfev,
            iterations: solve.iterations,
            status: solve.status,
        })
    }

    /// Snapshot of every calibrated camera.
    pub fn calibration_record(&self, meta: Option<serde_json::Value>) -> CalibrationRecord {
        CalibrationRecord {
            cameras: self
                .cameras
                .iter()
                .filter_map(|c| CameraCalibration::from_camera(c).map(|calib| (c.cam_id, calib)))
                .collect(),
            meta: meta.unwrap_or(serde_json::Value::Null),
        }
    }

    /// Merges this network's calibration into the file at `path`.
    pub fn save_calibration(
        &self,
        path: impl AsRef<Path>,
        meta: Option<serde_json::Value>,
    ) -> Result<CalibrationRecord> {
        let path = path.as_ref();
        log::info!("Saving calibration {}", path.display());
        self.calibration_record(meta).save_merged(path)
    }

    /// Applies a record. Cameras without an entry stay as they are. Returns
    /// the record's metadata.
    pub fn load_calibration(&mut self, record: &CalibrationRecord) -> serde_json::Value {
        for cam in self.cameras.iter_mut() {
            match record.cameras.get(&cam.cam_id) {
                Some(calib) => calib.apply_to(cam),
                None => log::debug!("Camera {} is not on the calibration file", cam.cam_id),
            }
        }
        record.meta.clone()
    }

    pub fn load_calibration_file(&mut self, path: impl AsRef<Path>) -> Result<serde_json::Value> {
        let record = CalibrationRecord::load(path)?;
        Ok(self.load_calibration(&record))
    }

    /// Seeds camera `b`'s pose relative to camera `a` from their shared
    /// observations.
    ///
    /// Camera `a` keeps its pose, or becomes the world origin when it has
    /// none. The baseline gets unit length. Cameras without intrinsics get
    /// centered ones with the configured focal length.
    pub fn bootstrap_pair(&mut self, a: usize, b: usize) -> Result<RelativePose> {
        let ia = self.index_of(a).ok_or(NetworkError::UnknownCamera(a))?;
        let ib = self.index_of(b).ok_or(NetworkError::UnknownCamera(b))?;
        let shape = self.config.image_shape;
        let assumed = Intrinsics::centered(
            self.config.bootstrap.assumed_focal,
            shape.width(),
            shape.height(),
        );
        let intr_a = self.cameras[ia].intrinsics().unwrap_or(assumed);
        let intr_b = self.cameras[ib].intrinsics().unwrap_or(assumed);

        let n_joints = self.points3d.n_joints();
        let (pts_a, pts_b): (Vec<_>, Vec<_>) = {
            let (cam_a, cam_b) = (&self.cameras[ia], &self.cameras[ib]);
            (0..self.points3d.n_frames())
                .flat_map(|f| (0..n_joints).map(move |j| (f, j)))
                .filter(|&(_, j)| {
                    self.skeleton.camera_sees_joint(a, j) && self.skeleton.camera_sees_joint(b, j)
                })
                .filter_map(|(f, j)| Some((cam_a.points2d.observed(f, j)?, cam_b.points2d.observed(f, j)?)))
                .unzip()
        };
        log::debug!("{} shared observations between cameras {} and {}", pts_a.len(), a, b);
        let pose = relative_pose(&pts_a, &pts_b, &intr_a, &intr_b, &self.config.bootstrap)?;

        let base = match self.cameras[ia].geometry() {
            Some(g) => g.pose,
            None => RvecTvec::identity(),
        };
        let r_a = base.rotation_matrix();
        let r_b = pose.rotation * r_a;
        let t_b = pose.rotation * base.tvec + pose.translation;

        let cam_a = &mut self.cameras[ia];
        cam_a.set_pose(&base);
        cam_a.set_intrinsics(intr_a);
        let cam_b = &mut self.cameras[ib];
        cam_b.set_rotation_matrix(&r_b);
        cam_b.set_translation(t_b);
        cam_b.set_intrinsics(intr_b);
        Ok(pose)
    }

    /// Overwrites whole `(camera, frame)` rows. Returns how many were replaced.
    pub fn apply_corrections(&mut self, corrections: &ManualCorrections) -> Result<usize> {
        let mut count = 0;
        for (&cam_id, frames) in corrections {
            let Some(cam) = self.camera_mut(cam_id) else {
                log::debug!("Correction for unknown camera {}", cam_id);
                continue;
            };
            for (&frame, row) in frames {
                if frame >= cam.points2d.n_frames() {
                    continue;
                }
                let row: Vec<na::Vector2<f64>> = row.iter().map(|p| na::Vector2::new(p[0], p[1])).collect();
                cam.points2d.set_frame(frame, &row)?;
                count += 1;
            }
        }
        log::info!("Replaced points2d with {} manual corrections", count);
        Ok(count)
    }

    fn snapshot_points2d(&self) -> Vec<Points2d> {
        self.cameras.iter().map(|c| c.points2d.clone()).collect()
    }

    fn restore_points2d(&mut self, saved: Vec<Points2d>) {
        for (cam, points2d) in self.cameras.iter_mut().zip(saved) {
            cam.points2d = points2d;
        }
    }

    /// Refines the left and right camera groups on a frame window with manual
    /// corrections applied, then restores the original observations.
    pub fn calibrate_range<S: LeastSquaresSolver>(
        &mut self,
        solver: &S,
        frames: Range<usize>,
        corrections: Option<&ManualCorrections>,
    ) -> Result<Vec<BundleAdjustReport>> {
        log::info!(
            "Calibration considering frames between {}:{}",
            frames.start,
            frames.end
        );
        let saved = self.snapshot_points2d();
        let n_frames = self.points3d.n_frames();
        let result = self.calibrate_window(solver, frames, corrections);
        self.restore_points2d(saved);
        self.points3d = Points3d::zeros(n_frames, self.skeleton.num_joints);
        let reports = result?;
        if self.has_calibration() {
            self.triangulate(None)?;
        }
        Ok(reports)
    }

    fn calibrate_window<S: LeastSquaresSolver>(
        &mut self,
        solver: &S,
        frames: Range<usize>,
        corrections: Option<&ManualCorrections>,
    ) -> Result<Vec<BundleAdjustReport>> {
        if let Some(corrections) = corrections {
            let c = self.apply_corrections(corrections)?;
            log::info!("Calibration: replaced {} points from manual correction", c);
        }
        for cam in self.cameras.iter_mut() {
            cam.points2d = cam.points2d.slice_frames(frames.start, frames.end);
        }
        let window = self.cameras.first().map(|c| c.points2d.n_frames()).unwrap_or(0);
        self.points3d = Points3d::zeros(window, self.skeleton.num_joints);

        let mut reports = Vec::new();
        for group in [self.left_ids(), self.right_ids()] {
            if group.len() < 2 {
                continue;
            }
            self.triangulate(Some(group.as_slice()))?;
            reports.push(self.bundle_adjust(solver, Some(group.as_slice()), None)?);
        }
        Ok(reports)
    }

    /// Mean reprojection distance of one joint over the subset's cameras.
    pub fn joint_reprojection_error(&self, frame: usize, joint: usize, subset: Option<&[usize]>) -> Result<f64> {
        let views = self.views(subset)?;
        Ok(Triangulator::new(&self.skeleton, &self.config.triangulation).joint_error(&views, frame, joint))
    }

    /// Scans from `frame` in the direction of `step` (exclusive) for the first
    /// joint whose worse left/right reprojection error exceeds its review
    /// threshold.
    pub fn find_next_error(&self, frame: usize, step: isize) -> Result<Option<ReviewHit>> {
        if step == 0 || self.n_frames() == 0 {
            return Ok(None);
        }
        let left = self.views(Some(self.left_ids().as_slice()))?;
        let right = self.views(Some(self.right_ids().as_slice()))?;
        let triangulator = Triangulator::new(&self.skeleton, &self.config.triangulation);
        let mut current = frame as isize + step;
        while current >= 0 && (current as usize) < self.n_frames() {
            let f = current as usize;
            for joint in (0..self.skeleton.num_joints).filter(|j| !self.skeleton.is_ignored(*j)) {
                let error = triangulator
                    .joint_error(&left, f, joint)
                    .max(triangulator.joint_error(&right, f, joint));
                if error > self.skeleton.review_threshold(joint) {
                    log::info!("Error found at img={} joint={} err={:.3}", f, joint, error);
                    return Ok(Some(ReviewHit { frame: f, joint, error }));
                }
            }
            current += step;
        }
        Ok(None)
    }

    /// The persisted output: calibration, corrected 2D with pinned joint
    /// classes, and the 3D tensor when the network is calibrated. Observations
    /// and points are left as they were.
    pub fn reconstruction(&mut self, corrections: Option<&ManualCorrections>) -> Result<Reconstruction> {
        let saved = self.snapshot_points2d();
        let saved_points3d = self.points3d.clone();
        let saved_outliers = self.outliers.clone();
        let result = self.build_reconstruction(corrections);
        self.restore_points2d(saved);
        self.points3d = saved_points3d;
        self.outliers = saved_outliers;
        result
    }

    fn build_reconstruction(&mut self, corrections: Option<&ManualCorrections>) -> Result<Reconstruction> {
        if let Some(corrections) = corrections {
            self.apply_corrections(corrections)?;
        }
        let pinned: Vec<usize> = (0..self.skeleton.num_joints)
            .filter(|&j| self.skeleton.is_pinned(j))
            .collect();

        let points2d = self
            .cameras
            .iter()
            .map(|cam| {
                let mut table = cam.points2d.clone();
                for &j in pinned.iter().filter(|&&j| self.skeleton.camera_sees_joint(cam.cam_id, j)) {
                    pin_points2d_to_median(&mut table, j);
                }
                (cam.cam_id, table.to_nested())
            })
            .collect();

        let points3d = if self.has_calibration() {
            self.triangulate(None)?;
            let mut points3d = self.points3d.clone();
            for group in self.skeleton.pinned_groups() {
                pin_points3d_to_median(&mut points3d, &group);
            }
            Some(points3d.to_nested())
        } else {
            log::debug!("network is not calibrated, skipping 3D output");
            None
        };

        Ok(Reconstruction {
            calibration: self.calibration_record(None),
            points2d,
            points3d,
        })
    }
}
