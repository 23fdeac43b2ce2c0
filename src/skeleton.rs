use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Anatomical role of a joint. Classes drive mirroring and median pinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointClass {
    BodyCoxa,
    Limb,
    Antenna,
    Stripe,
    Other,
}

/// Which half of the skeleton a half-skeleton detector row fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionHalf {
    First,
    Second,
}

const LEGS_PER_SIDE: usize = 3;
const JOINTS_PER_LEG: usize = 5;
const STRIPES_PER_SIDE: usize = 3;
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 30.0;

/// Visibility and skeleton lookup table.
///
/// Answers "can camera C see joint J", "which class is joint J", and carries
/// the per-joint outlier-correction eligibility and review thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonConfig {
    pub num_joints: usize,
    pub joint_classes: Vec<JointClass>,
    /// Camera id to the joints that camera can physically observe.
    pub visible_joints: BTreeMap<usize, Vec<usize>>,
    /// Classes whose second-half joints share a 3D point with their first-half mirror.
    pub mirror_classes: Vec<JointClass>,
    /// Classes pinned to their median position over frames in the output.
    pub pinned_classes: Vec<JointClass>,
    /// Joints eligible for the three-camera outlier rejection.
    pub correction_joints: Vec<usize>,
    /// Per-joint reprojection error above which a frame is flagged for review.
    pub review_thresholds: Vec<f64>,
    /// Joints left out of reprojection diagnostics and bundle adjustment.
    pub ignore_joints: Vec<usize>,
    pub left_cameras: Vec<usize>,
    pub right_cameras: Vec<usize>,
}

impl Default for SkeletonConfig {
    /// Bilateral fly rig: seven cameras, 19 joints per side (three legs of
    /// five joints, one antenna, three abdominal stripes). Cameras 0-2 see
    /// the first half, cameras 4-6 the second, camera 3 sees nothing.
    fn default() -> Self {
        SkeletonConfig::bilateral(7, &[0, 1, 2], &[4, 5, 6])
    }
}

impl SkeletonConfig {
    /// Skeleton with the fly joint layout for an arbitrary camera split.
    pub fn bilateral(num_cameras: usize, left: &[usize], right: &[usize]) -> SkeletonConfig {
        let side = LEGS_PER_SIDE * JOINTS_PER_LEG + 1 + STRIPES_PER_SIDE;
        let mut side_classes = Vec::with_capacity(side);
        for _ in 0..LEGS_PER_SIDE {
            side_classes.push(JointClass::BodyCoxa);
            side_classes.extend([JointClass::Limb; JOINTS_PER_LEG - 1]);
        }
        side_classes.push(JointClass::Antenna);
        side_classes.extend([JointClass::Stripe; STRIPES_PER_SIDE]);
        let joint_classes: Vec<_> = side_classes.iter().chain(side_classes.iter()).copied().collect();
        let num_joints = joint_classes.len();

        let mut visible_joints = BTreeMap::new();
        for cam_id in 0..num_cameras {
            let joints = if left.contains(&cam_id) {
                (0..side).collect()
            } else if right.contains(&cam_id) {
                (side..num_joints).collect()
            } else {
                Vec::new()
            };
            visible_joints.insert(cam_id, joints);
        }

        let legs = LEGS_PER_SIDE * JOINTS_PER_LEG;
        let correction_joints = (0..legs).chain(side..side + legs).collect();

        SkeletonConfig {
            num_joints,
            joint_classes,
            visible_joints,
            mirror_classes: vec![JointClass::Stripe],
            pinned_classes: vec![JointClass::BodyCoxa],
            correction_joints,
            review_thresholds: vec![DEFAULT_REVIEW_THRESHOLD; num_joints],
            ignore_joints: Vec::new(),
            left_cameras: left.to_vec(),
            right_cameras: right.to_vec(),
        }
    }

    /// Every camera sees every joint, no mirroring and no pinning.
    pub fn all_visible(num_joints: usize, cam_ids: &[usize]) -> SkeletonConfig {
        SkeletonConfig {
            num_joints,
            joint_classes: vec![JointClass::Other; num_joints],
            visible_joints: cam_ids.iter().map(|&c| (c, (0..num_joints).collect())).collect(),
            mirror_classes: Vec::new(),
            pinned_classes: Vec::new(),
            correction_joints: (0..num_joints).collect(),
            review_thresholds: vec![DEFAULT_REVIEW_THRESHOLD; num_joints],
            ignore_joints: Vec::new(),
            left_cameras: cam_ids.to_vec(),
            right_cameras: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.joint_classes.len() != self.num_joints {
            return Err(NetworkError::ShapeMismatch(format!(
                "{} joint classes for {} joints",
                self.joint_classes.len(),
                self.num_joints
            )));
        }
        let out_of_range = self
            .visible_joints
            .values()
            .flatten()
            .chain(&self.correction_joints)
            .chain(&self.ignore_joints)
            .find(|&&j| j >= self.num_joints);
        if let Some(j) = out_of_range {
            return Err(NetworkError::ShapeMismatch(format!(
                "joint {} out of range for {} joints",
                j, self.num_joints
            )));
        }
        Ok(())
    }

    pub fn camera_sees_joint(&self, cam_id: usize, joint: usize) -> bool {
        self.visible_joints
            .get(&cam_id)
            .is_some_and(|joints| joints.contains(&joint))
    }

    pub fn class_of(&self, joint: usize) -> JointClass {
        self.joint_classes.get(joint).copied().unwrap_or(JointClass::Other)
    }

    pub fn is_class(&self, joint: usize, class: JointClass) -> bool {
        self.class_of(joint) == class
    }

    /// First-half counterpart of a mirrored second-half joint.
    pub fn mirror_of(&self, joint: usize) -> Option<usize> {
        let half = self.num_joints / 2;
        if half > 0 && joint >= half && self.mirror_classes.contains(&self.class_of(joint)) {
            Some(joint - half)
        } else {
            None
        }
    }

    pub fn is_pinned(&self, joint: usize) -> bool {
        self.pinned_classes.contains(&self.class_of(joint))
    }

    /// Pinned joints grouped for 3D pinning. A pinned joint whose mirror is
    /// pinned too shares its group; every other pinned joint stands alone.
    pub fn pinned_groups(&self) -> Vec<Vec<usize>> {
        let pinned: Vec<usize> = (0..self.num_joints).filter(|&j| self.is_pinned(j)).collect();
        let partner = |j: usize| self.mirror_of(j).filter(|m| self.is_pinned(*m));
        let paired: Vec<usize> = pinned.iter().filter_map(|&j| partner(j)).collect();
        pinned
            .iter()
            .filter(|j| !paired.contains(j))
            .map(|&j| match partner(j) {
                Some(m) => vec![m, j],
                None => vec![j],
            })
            .collect()
    }

    pub fn is_correction_eligible(&self, joint: usize) -> bool {
        self.correction_joints.contains(&joint)
    }

    pub fn is_ignored(&self, joint: usize) -> bool {
        self.ignore_joints.contains(&joint)
    }

    pub fn review_threshold(&self, joint: usize) -> f64 {
        self.review_thresholds
            .get(joint)
            .copied()
            .unwrap_or(DEFAULT_REVIEW_THRESHOLD)
    }

    pub fn detection_half(&self, cam_id: usize) -> DetectionHalf {
        if self.right_cameras.contains(&cam_id) {
            DetectionHalf::Second
        } else {
            DetectionHalf::First
        }
    }

    /// Cameras in neither side group, e.g. a front view.
    pub fn is_center_camera(&self, cam_id: usize) -> bool {
        !self.left_cameras.contains(&cam_id) && !self.right_cameras.contains(&cam_id)
    }
}
