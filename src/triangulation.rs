use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use nalgebra as na;
use rayon::prelude::*;
use serde::Serialize;

use crate::camera_model::CameraGeometry;
use crate::config::TriangulationConfig;
use crate::detected_points::{Points2d, Points3d};
use crate::optimization::linear::triangulate_linear;
use crate::skeleton::SkeletonConfig;

/// A calibrated camera together with its observation table.
#[derive(Debug, Clone, Copy)]
pub struct CameraView<'a> {
    pub geometry: CameraGeometry,
    pub points2d: &'a Points2d,
}

/// One joint whose three-camera estimate was replaced by a two-camera one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierRecord {
    pub frame: usize,
    pub joint: usize,
    /// All qualifying cameras, in view order.
    pub cam_ids: Vec<usize>,
    /// Reprojection distance of each camera against the all-camera estimate.
    pub distances: Vec<f64>,
    pub mean_error: f64,
    pub kept_cam_ids: [usize; 2],
    /// The extreme camera that was discarded.
    pub dropped_cam_id: usize,
}

#[derive(Debug, Clone)]
pub struct TriangulationReport {
    pub points3d: Points3d,
    /// Ordered by (frame, joint) regardless of scheduling.
    pub outliers: Vec<OutlierRecord>,
}

/// Which two of three or more cameras to keep, as indices into `distances`.
///
/// The median-error camera is always kept. Of the two extremes, the one
/// farther from the median is dropped; on a tie the smallest-error camera
/// goes. Returns `(kept, dropped)`.
pub fn select_camera_pair(distances: &[f64]) -> ([usize; 2], usize) {
    debug_assert!(distances.len() >= 3);
    let mut order: Vec<usize> = (0..distances.len()).collect();
    order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]));
    let min = order[0];
    let med = order[(order.len() - 1) / 2];
    let max = order[order.len() - 1];
    let gap_hi = distances[max] - distances[med];
    let gap_lo = distances[med] - distances[min];
    if gap_hi > gap_lo {
        ([med, min], max)
    } else {
        ([med, max], min)
    }
}

pub struct Triangulator<'a> {
    skeleton: &'a SkeletonConfig,
    config: &'a TriangulationConfig,
}

impl<'a> Triangulator<'a> {
    pub fn new(skeleton: &'a SkeletonConfig, config: &'a TriangulationConfig) -> Triangulator<'a> {
        Triangulator { skeleton, config }
    }

    /// Views allowed to see `joint` that also observed it in `frame`.
    fn qualifying(
        &self,
        views: &[CameraView],
        frame: usize,
        joint: usize,
    ) -> (Vec<usize>, Vec<na::Matrix3x4<f64>>, Vec<na::Vector2<f64>>) {
        let mut cam_idx = Vec::new();
        let mut projections = Vec::new();
        let mut points = Vec::new();
        for (i, view) in views.iter().enumerate() {
            if !self.skeleton.camera_sees_joint(view.geometry.cam_id, joint) {
                continue;
            }
            if let Some(p) = view.points2d.observed(frame, joint) {
                cam_idx.push(i);
                projections.push(view.geometry.projection_matrix());
                points.push(p);
            }
        }
        (cam_idx, projections, points)
    }

    /// Estimates one (frame, joint). `None` when fewer than two cameras qualify.
    pub fn triangulate_joint(
        &self,
        views: &[CameraView],
        frame: usize,
        joint: usize,
    ) -> (Option<na::Vector3<f64>>, Option<OutlierRecord>) {
        let (cam_idx, projections, points) = self.qualifying(views, frame, joint);
        if cam_idx.len() < 2 {
            return (None, None);
        }
        let p3d = triangulate_linear(&projections, &points);
        if !self.config.outlier_rejection
            || cam_idx.len() < 3
            || !self.skeleton.is_correction_eligible(joint)
        {
            return (Some(p3d), None);
        }

        let distances: Vec<f64> = cam_idx
            .iter()
            .zip(&points)
            .map(|(&i, obs)| views[i].geometry.reprojection_error(&p3d, obs).0)
            .collect();
        let mean_error = distances.iter().sum::<f64>() / distances.len() as f64;
        if mean_error <= self.config.outlier_threshold {
            return (Some(p3d), None);
        }

        let (kept, dropped) = select_camera_pair(&distances);
        let refined = triangulate_linear(
            &[projections[kept[0]], projections[kept[1]]],
            &[points[kept[0]], points[kept[1]]],
        );
        let cam_id = |k: usize| views[cam_idx[k]].geometry.cam_id;
        let record = OutlierRecord {
            frame,
            joint,
            cam_ids: (0..cam_idx.len()).map(cam_id).collect(),
            distances,
            mean_error,
            kept_cam_ids: [cam_id(kept[0]), cam_id(kept[1])],
            dropped_cam_id: cam_id(dropped),
        };
        (Some(refined), Some(record))
    }

    /// Runs every (frame, joint) cell. Frames are processed in parallel and
    /// written back in frame order, so the outlier log is deterministic.
    pub fn triangulate_all(
        &self,
        views: &[CameraView],
        n_frames: usize,
        n_joints: usize,
    ) -> TriangulationReport {
        let pb = if self.config.show_progress {
            ProgressBar::new(n_frames as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("triangulate {bar:40} {pos}/{len}") {
            pb.set_style(style);
        }
        let rows: Vec<(Vec<Option<na::Vector3<f64>>>, Vec<OutlierRecord>)> = (0..n_frames)
            .into_par_iter()
            .progress_with(pb)
            .map(|frame| {
                let mut row = Vec::with_capacity(n_joints);
                let mut records = Vec::new();
                for joint in 0..n_joints {
                    let (p, record) = self.triangulate_joint(views, frame, joint);
                    row.push(p);
                    records.extend(record);
                }
                (row, records)
            })
            .collect();

        let mut points3d = Points3d::zeros(n_frames, n_joints);
        let mut outliers = Vec::new();
        for (frame, (row, records)) in rows.into_iter().enumerate() {
            points3d.write_frame(frame, &row);
            outliers.extend(records);
        }
        log::info!("{} joints changed by outlier rejection", outliers.len());
        TriangulationReport { points3d, outliers }
    }

    /// Mean reprojection distance of a joint over the cameras that can see it,
    /// after triangulating from all of them. Zero with fewer than two views.
    pub fn joint_error(&self, views: &[CameraView], frame: usize, joint: usize) -> f64 {
        let (cam_idx, projections, points) = self.qualifying(views, frame, joint);
        if cam_idx.len() < 2 {
            return 0.0;
        }
        let p3d = triangulate_linear(&projections, &points);
        let total: f64 = cam_idx
            .iter()
            .zip(&points)
            .map(|(&i, obs)| views[i].geometry.reprojection_error(&p3d, obs).0)
            .sum();
        total / cam_idx.len() as f64
    }
}
