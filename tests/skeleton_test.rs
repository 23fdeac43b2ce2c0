use camera_network_calibration::NetworkError;
use camera_network_calibration::skeleton::{DetectionHalf, JointClass, SkeletonConfig};

#[test]
fn test_default_bilateral_layout() {
    let skeleton = SkeletonConfig::default();
    assert_eq!(skeleton.num_joints, 38);
    assert_eq!(skeleton.joint_classes.len(), 38);
    assert!(skeleton.validate().is_ok());

    assert_eq!(skeleton.class_of(0), JointClass::BodyCoxa);
    assert_eq!(skeleton.class_of(1), JointClass::Limb);
    assert_eq!(skeleton.class_of(5), JointClass::BodyCoxa);
    assert_eq!(skeleton.class_of(15), JointClass::Antenna);
    assert_eq!(skeleton.class_of(16), JointClass::Stripe);
    assert_eq!(skeleton.class_of(19), JointClass::BodyCoxa);
    assert_eq!(skeleton.class_of(37), JointClass::Stripe);
    // out of range falls back
    assert_eq!(skeleton.class_of(100), JointClass::Other);
}

#[test]
fn test_visibility() {
    let skeleton = SkeletonConfig::default();
    assert!(skeleton.camera_sees_joint(0, 0));
    assert!(skeleton.camera_sees_joint(2, 18));
    assert!(!skeleton.camera_sees_joint(0, 19));
    assert!(skeleton.camera_sees_joint(4, 19));
    assert!(skeleton.camera_sees_joint(6, 37));
    assert!(!skeleton.camera_sees_joint(6, 0));
    // camera 3 sees nothing, unknown cameras neither
    assert!((0..38).all(|j| !skeleton.camera_sees_joint(3, j)));
    assert!(!skeleton.camera_sees_joint(9, 0));
}

#[test]
fn test_mirror_and_pinning() {
    let skeleton = SkeletonConfig::default();
    assert_eq!(skeleton.mirror_of(35), Some(16));
    assert_eq!(skeleton.mirror_of(37), Some(18));
    // first-half stripes are the targets, never the sources
    assert_eq!(skeleton.mirror_of(16), None);
    // limbs are not mirrored
    assert_eq!(skeleton.mirror_of(20), None);

    assert!(skeleton.is_pinned(0));
    assert!(skeleton.is_pinned(19));
    assert!(!skeleton.is_pinned(1));
    assert!(!skeleton.is_pinned(16));

    assert!(skeleton.is_correction_eligible(0));
    assert!(skeleton.is_correction_eligible(33));
    assert!(!skeleton.is_correction_eligible(15));
    assert!(!skeleton.is_correction_eligible(16));
}

#[test]
fn test_camera_groups() {
    let skeleton = SkeletonConfig::default();
    assert_eq!(skeleton.detection_half(0), DetectionHalf::First);
    assert_eq!(skeleton.detection_half(5), DetectionHalf::Second);
    assert_eq!(skeleton.detection_half(3), DetectionHalf::First);
    assert!(skeleton.is_center_camera(3));
    assert!(!skeleton.is_center_camera(0));
    assert!(!skeleton.is_center_camera(6));
}

#[test]
fn test_review_thresholds_and_ignore() {
    let mut skeleton = SkeletonConfig::all_visible(3, &[0, 1]);
    skeleton.review_thresholds = vec![1.0, 2.0];
    skeleton.ignore_joints = vec![2];
    assert_eq!(skeleton.review_threshold(1), 2.0);
    // missing entries use the default
    assert_eq!(skeleton.review_threshold(2), 30.0);
    assert!(skeleton.is_ignored(2));
    assert!(!skeleton.is_ignored(0));
    assert_eq!(skeleton.mirror_of(2), None);
}

#[test]
fn test_validate_rejects_bad_shapes() {
    let mut skeleton = SkeletonConfig::all_visible(4, &[0, 1]);
    skeleton.joint_classes.pop();
    assert!(matches!(skeleton.validate(), Err(NetworkError::ShapeMismatch(_))));

    let mut skeleton = SkeletonConfig::all_visible(4, &[0, 1]);
    skeleton.visible_joints.insert(1, vec![0, 4]);
    assert!(matches!(skeleton.validate(), Err(NetworkError::ShapeMismatch(_))));

    let mut skeleton = SkeletonConfig::all_visible(4, &[0, 1]);
    skeleton.ignore_joints = vec![7];
    assert!(skeleton.validate().is_err());
}

#[test]
fn test_serde_roundtrip() {
    let skeleton = SkeletonConfig::bilateral(4, &[0], &[2]);
    let json = serde_json::to_string(&skeleton).unwrap();
    let back: SkeletonConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, skeleton);
    assert!(json.contains("\"body_coxa\""));
}

#[test]
fn test_pinned_groups() {
    let mut skeleton = SkeletonConfig::default();
    let groups = skeleton.pinned_groups();
    assert_eq!(groups, vec![vec![0], vec![5], vec![10], vec![19], vec![24], vec![29]]);

    skeleton.pinned_classes.push(JointClass::Stripe);
    let groups = skeleton.pinned_groups();
    assert!(groups.contains(&vec![16, 35]));
    assert!(groups.contains(&vec![18, 37]));
    assert!(groups.contains(&vec![0]) && groups.contains(&vec![19]));
    assert!(!groups.contains(&vec![35]));
    assert_eq!(groups.len(), 9);
}
