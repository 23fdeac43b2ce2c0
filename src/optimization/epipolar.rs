//! Relative pose of a camera pair from shared observations.
//!
//! ARRSAC drives the eight-point estimator over unit bearings. Each essential
//! matrix hypothesis expands into its four `(R, t)` factorizations, and the
//! consensus residual (two-view triangulation with a cheirality check) keeps
//! the one that places the points in front of both cameras.

use arrsac::Arrsac;
use cv_core::nalgebra as cvna;
use cv_core::sample_consensus::Consensus;
use cv_core::{FeatureMatch, Pose};
use eight_point::EightPoint;
use nalgebra as na;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;

use super::linear::triangulate_linear;
use crate::config::BootstrapConfig;
use crate::error::{NetworkError, Result};
use crate::types::Intrinsics;

const MIN_CORRESPONDENCES: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct RelativePose {
    /// Maps first-camera coordinates into the second camera: `x2 = R x1 + t`.
    pub rotation: na::Matrix3<f64>,
    /// Unit length; the baseline scale is not observable.
    pub translation: na::Vector3<f64>,
    pub inliers: Vec<bool>,
    /// Inliers that passed the cheirality check.
    pub n_in_front: usize,
}

impl RelativePose {
    pub fn rvec(&self) -> na::Vector3<f64> {
        na::Rotation3::from_matrix_unchecked(self.rotation).scaled_axis()
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.inliers.is_empty() {
            0.0
        } else {
            self.inliers.iter().filter(|i| **i).count() as f64 / self.inliers.len() as f64
        }
    }

    /// Projection matrix of the second camera in normalized coordinates.
    fn projection(&self) -> na::Matrix3x4<f64> {
        let mut p = na::Matrix3x4::zeros();
        p.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        p.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        p
    }
}

/// Pixel coordinates to the normalized image plane. Distortion is ignored.
pub fn normalize_points(points: &[na::Vector2<f64>], intrinsics: &Intrinsics) -> Vec<na::Vector2<f64>> {
    points
        .iter()
        .map(|p| {
            na::Vector2::new(
                (p.x - intrinsics.cx) / intrinsics.fx,
                (p.y - intrinsics.cy) / intrinsics.fy,
            )
        })
        .collect()
}

fn bearing(p: &na::Vector2<f64>) -> cvna::UnitVector3<f64> {
    cvna::UnitVector3::new_normalize(cvna::Vector3::new(p.x, p.y, 1.0))
}

/// Inlier threshold on the two-view residual for an angular error of `angle`
/// radians in each view.
pub fn residual_threshold(angle: f64) -> f64 {
    1.0 - angle.cos()
}

/// Counts inliers triangulating in front of both cameras, closer than `distance_threshold`.
pub fn count_in_front(
    pose: &RelativePose,
    x1: &[na::Vector2<f64>],
    x2: &[na::Vector2<f64>],
    distance_threshold: f64,
) -> usize {
    let p1 = na::Matrix3x4::identity();
    let p2 = pose.projection();
    x1.iter()
        .zip(x2)
        .zip(&pose.inliers)
        .filter(|(_, keep)| **keep)
        .filter(|((a, b), _)| {
            let x = triangulate_linear(&[p1, p2], &[**a, **b]);
            let z2 = (pose.rotation * x + pose.translation).z;
            x.z > 0.0 && z2 > 0.0 && x.z < distance_threshold && z2 < distance_threshold
        })
        .count()
}

/// Relative pose from normalized image coordinates.
///
/// `threshold` is the per-view angular error (radians) tolerated for inliers.
pub fn relative_pose_normalized(
    x1: &[na::Vector2<f64>],
    x2: &[na::Vector2<f64>],
    threshold: f64,
    config: &BootstrapConfig,
) -> Result<RelativePose> {
    let n = x1.len();
    if n < MIN_CORRESPONDENCES || x2.len() != n {
        return Err(NetworkError::InsufficientCorrespondences {
            needed: MIN_CORRESPONDENCES,
            got: n.min(x2.len()),
        });
    }
    let matches: Vec<FeatureMatch> = x1
        .iter()
        .zip(x2)
        .map(|(a, b)| FeatureMatch(bearing(a), bearing(b)))
        .collect();

    let mut consensus = Arrsac::new(
        residual_threshold(threshold),
        Xoshiro256PlusPlus::seed_from_u64(config.seed),
    );
    let (model, inlier_ids) = consensus
        .model_inliers(&EightPoint::new(), matches.iter().copied())
        .ok_or(NetworkError::EssentialEstimation("no consensus model"))?;

    let isometry = model.isometry();
    let r = isometry.rotation.matrix();
    let t = isometry.translation.vector;
    let rotation = na::Matrix3::from_fn(|i, j| r[(i, j)]);
    let translation = na::Vector3::new(t.x, t.y, t.z);
    let norm = translation.norm();
    if !norm.is_finite() || norm < f64::EPSILON {
        return Err(NetworkError::EssentialEstimation("degenerate baseline"));
    }

    let mut inliers = vec![false; n];
    for i in inlier_ids {
        inliers[i] = true;
    }
    let mut pose = RelativePose {
        rotation,
        translation: translation / norm,
        inliers,
        n_in_front: 0,
    };
    pose.n_in_front = count_in_front(&pose, x1, x2, config.distance_threshold);
    Ok(pose)
}

/// Relative pose of camera 2 with respect to camera 1 from pixel correspondences.
pub fn relative_pose(
    pts1: &[na::Vector2<f64>],
    pts2: &[na::Vector2<f64>],
    intr1: &Intrinsics,
    intr2: &Intrinsics,
    config: &BootstrapConfig,
) -> Result<RelativePose> {
    let x1 = normalize_points(pts1, intr1);
    let x2 = normalize_points(pts2, intr2);
    let focal = (intr1.mean_focal() + intr2.mean_focal()) / 2.0;
    let pose = relative_pose_normalized(&x1, &x2, config.ransac_threshold / focal, config)?;
    log::debug!(
        "Essential matrix inlier ratio: {}, {} in front",
        pose.inlier_ratio(),
        pose.n_in_front
    );
    Ok(pose)
}
