use std::collections::BTreeMap;

use camera_network_calibration::config::NetworkConfig;
use camera_network_calibration::data_loader::{CameraOrder, ManualCorrections};
use camera_network_calibration::detected_points::Detections;
use camera_network_calibration::optimization::TinySolverBackend;
use camera_network_calibration::skeleton::{JointClass, SkeletonConfig};
use camera_network_calibration::synthetic::SyntheticRig;
use camera_network_calibration::{CameraNetwork, NetworkError};
use nalgebra as na;

fn uncalibrated(rig: &SyntheticRig, order: &CameraOrder) -> CameraNetwork {
    CameraNetwork::from_detections(
        &rig.detections(0.0, 0),
        order,
        rig.default_skeleton(),
        NetworkConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_from_detections_applies_camera_order() {
    let rig = SyntheticRig::new(3, 4, 5, 1);
    let order = CameraOrder::from_cidread2cid(vec![2, 0, 1]).unwrap();
    assert_eq!(order.cid2cidread, vec![1, 2, 0]);
    let network = uncalibrated(&rig, &order);

    assert_eq!(network.all_ids(), vec![0, 1, 2]);
    assert_eq!(network.n_frames(), 4);
    let cam = network.camera(0).unwrap();
    assert_eq!(cam.cam_id_read, 1);
    assert_eq!(cam.points2d, rig.project(1));
    assert_eq!(network.camera(2).unwrap().points2d, rig.project(0));
    assert!(!network.has_calibration());
}

#[test]
fn test_from_detections_half_skeleton() {
    // camera 0 is left, camera 1 right, camera 2 sits in front
    let skeleton = SkeletonConfig::bilateral(3, &[0], &[1]);
    let half = skeleton.num_joints / 2;
    let view = |v: usize| -> Vec<Vec<[f64; 2]>> {
        (0..2)
            .map(|f| (0..half).map(|j| [(100 * v + j + 1) as f64, (f + 1) as f64]).collect())
            .collect()
    };
    let detections = Detections {
        points: (0..4).map(view).collect(),
        normalized: false,
    };
    let network = CameraNetwork::from_detections(
        &detections,
        &CameraOrder::identity(3),
        skeleton,
        NetworkConfig::default(),
    )
    .unwrap();

    let left = &network.camera(0).unwrap().points2d;
    assert_eq!(left.get(1, 3), na::Vector2::new(4.0, 2.0));
    assert_eq!(left.observed(1, half + 3), None);

    let right = &network.camera(1).unwrap().points2d;
    assert_eq!(right.observed(0, 3), None);
    assert_eq!(right.get(0, half + 3), na::Vector2::new(104.0, 1.0));

    // the center camera's second half comes from the view past the camera count
    let center = &network.camera(2).unwrap().points2d;
    assert_eq!(center.get(0, 0), na::Vector2::new(201.0, 1.0));
    assert_eq!(center.get(0, half), na::Vector2::new(301.0, 1.0));
}

#[test]
fn test_from_detections_normalized_and_shape_mismatch() {
    let detections = Detections {
        points: vec![vec![vec![[0.5, 0.25], [0.0, 0.0]]]; 2],
        normalized: true,
    };
    let skeleton = SkeletonConfig::all_visible(2, &[0, 1]);
    let network = CameraNetwork::from_detections(
        &detections,
        &CameraOrder::identity(2),
        skeleton,
        NetworkConfig::default(),
    )
    .unwrap();
    let points2d = &network.camera(1).unwrap().points2d;
    assert_eq!(points2d.get(0, 0), na::Vector2::new(480.0, 120.0));
    assert_eq!(points2d.observed(0, 1), None);

    let result = CameraNetwork::from_detections(
        &detections,
        &CameraOrder::identity(2),
        SkeletonConfig::all_visible(5, &[0, 1]),
        NetworkConfig::default(),
    );
    assert!(matches!(result, Err(NetworkError::ShapeMismatch(_))));
}

#[test]
fn test_uncalibrated_network_refuses_geometry() {
    let rig = SyntheticRig::new(3, 2, 3, 2);
    let mut network = uncalibrated(&rig, &CameraOrder::identity(3));
    assert!(matches!(
        network.triangulate(None),
        Err(NetworkError::MissingCalibration { cam_id: 0 })
    ));
    assert!(network.reprojection_error(None, None).is_err());
    assert!(matches!(
        network.triangulate(Some(&[7][..])),
        Err(NetworkError::UnknownCamera(7))
    ));
}

#[test]
fn test_load_calibration() {
    let rig = SyntheticRig::new(3, 6, 4, 3);
    let mut network = uncalibrated(&rig, &CameraOrder::identity(3));

    let mut partial = rig.calibration_record();
    partial.cameras.remove(&1);
    let meta = network.load_calibration(&partial);
    assert_eq!(meta["source"], "synthetic");
    assert!(network.camera(0).unwrap().is_calibrated());
    assert!(!network.camera(1).unwrap().is_calibrated());
    assert!(!network.has_calibration());

    network.load_calibration(&rig.calibration_record());
    assert!(network.has_calibration());
    network.triangulate(None).unwrap();
    for (f, frame) in rig.points.iter().enumerate() {
        for (j, gt) in frame.iter().enumerate() {
            assert!((network.points3d().get(f, j).unwrap() - gt).norm() < 1e-6);
        }
    }
    let summary = network.reprojection_error(None, None).unwrap();
    assert!(summary.mean_abs < 1e-6);
    assert_eq!(summary.residuals.len(), 6 * 4 * 3);
}

#[test]
fn test_reprojection_error_respects_subset_and_ignore() {
    let rig = SyntheticRig::new(3, 5, 4, 6);
    let mut network = rig
        .to_network(rig.default_skeleton(), NetworkConfig::default(), 1.0, 3)
        .unwrap();
    network.triangulate(None).unwrap();

    let all = network.reprojection_error(None, None).unwrap();
    assert_eq!(all.residuals.len(), 5 * 4 * 3);
    let subset = network.reprojection_error(Some(&[0, 2][..]), None).unwrap();
    assert_eq!(subset.residuals.len(), 5 * 4 * 2);
    let ignored = network.reprojection_error(None, Some(&[0, 1][..])).unwrap();
    assert_eq!(ignored.residuals.len(), 5 * 2 * 3);

    let stats = network.camera_stats(None).unwrap();
    assert_eq!(stats.len(), 3);
    for (i, (cam_id, mean, median, count)) in stats.iter().enumerate() {
        assert_eq!(*cam_id, i);
        assert_eq!(*count, 20);
        assert!(*mean > 0.0 && *median > 0.0);
    }
}

#[test]
fn test_apply_corrections() {
    let rig = SyntheticRig::new(2, 3, 2, 4);
    let mut network = uncalibrated(&rig, &CameraOrder::identity(2));
    let row = vec![[11.0, 12.0], [13.0, 14.0]];

    let mut corrections: ManualCorrections = BTreeMap::new();
    corrections.entry(0).or_default().insert(1, row.clone());
    // unknown camera and out-of-range frame are skipped
    corrections.entry(9).or_default().insert(0, row.clone());
    corrections.entry(1).or_default().insert(99, row.clone());
    assert_eq!(network.apply_corrections(&corrections).unwrap(), 1);
    let points2d = &network.camera(0).unwrap().points2d;
    assert_eq!(points2d.get(1, 0), na::Vector2::new(11.0, 12.0));
    assert_eq!(points2d.get(1, 1), na::Vector2::new(13.0, 14.0));

    let mut bad: ManualCorrections = BTreeMap::new();
    bad.entry(0).or_default().insert(0, vec![[1.0, 1.0]]);
    assert!(matches!(
        network.apply_corrections(&bad),
        Err(NetworkError::ShapeMismatch(_))
    ));
}

#[test]
fn test_calibrate_range_restores_observations() {
    let rig = SyntheticRig::new(4, 10, 3, 12);
    let mut network = rig
        .to_network(rig.default_skeleton(), NetworkConfig::default(), 0.5, 1)
        .unwrap();
    let original: Vec<_> = network.cameras().iter().map(|c| c.points2d.clone()).collect();

    let mut corrections: ManualCorrections = BTreeMap::new();
    let row: Vec<[f64; 2]> = rig
        .project(0)
        .frame(2)
        .iter()
        .map(|p| [p.x, p.y])
        .collect();
    corrections.entry(0).or_default().insert(2, row);

    let reports = network
        .calibrate_range(&TinySolverBackend::default(), 0..5, Some(&corrections))
        .unwrap();
    // every camera is on the left, the right group is empty
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].cam_ids, vec![0, 1, 2, 3]);
    assert_eq!(reports[0].n_points, 5 * 3);

    for (cam, points2d) in network.cameras().iter().zip(&original) {
        assert_eq!(&cam.points2d, points2d);
    }
    assert_eq!(network.points3d().n_frames(), 10);
    assert_eq!(network.points3d().count_set(), 10 * 3);
}

#[test]
fn test_find_next_error() {
    let rig = SyntheticRig::new(3, 10, 4, 5);
    let mut network = rig
        .to_network(rig.default_skeleton(), NetworkConfig::default(), 0.0, 0)
        .unwrap();
    let cam = network.camera_mut(0).unwrap();
    let p = cam.points2d.get(4, 2);
    cam.points2d.set(4, 2, p + na::Vector2::new(150.0, 150.0));

    let hit = network.find_next_error(0, 1).unwrap().unwrap();
    assert_eq!((hit.frame, hit.joint), (4, 2));
    assert!(hit.error > 30.0);
    let back = network.find_next_error(9, -1).unwrap().unwrap();
    assert_eq!(back.frame, 4);
    // the start frame is never inspected
    assert_eq!(network.find_next_error(4, 1).unwrap(), None);
    assert_eq!(network.find_next_error(4, 0).unwrap(), None);

    let single = network.joint_reprojection_error(4, 2, None).unwrap();
    assert!((single - hit.error).abs() < 1e-9);
    assert!(network.joint_reprojection_error(4, 1, None).unwrap() < 1e-6);
}

#[test]
fn test_reconstruction_pins_and_restores() {
    let rig = SyntheticRig::new(3, 6, 3, 14);
    let mut skeleton = rig.default_skeleton();
    skeleton.joint_classes[0] = JointClass::BodyCoxa;
    skeleton.pinned_classes = vec![JointClass::BodyCoxa];
    let mut network = rig.to_network(skeleton, NetworkConfig::default(), 0.0, 0).unwrap();
    network.triangulate(None).unwrap();
    let points3d = network.points3d().clone();
    let original = network.camera(1).unwrap().points2d.clone();

    let reconstruction = network.reconstruction(None).unwrap();
    let cam1 = &reconstruction.points2d[&1];
    assert!(cam1.iter().all(|row| row[0] == cam1[0][0]));
    assert_ne!(cam1[0][1], cam1[1][1]);
    let pts = reconstruction.points3d.as_ref().unwrap();
    assert!(pts.iter().all(|row| row[0] == pts[0][0]));
    assert!(pts[0][0].is_some());
    assert_eq!(reconstruction.calibration.cameras.len(), 3);

    assert_eq!(network.points3d(), &points3d);
    assert_eq!(network.camera(1).unwrap().points2d, original);
}

#[test]
fn test_reconstruction_pins_mirrors_together() {
    let rig = SyntheticRig::new(3, 6, 4, 21);
    let mut skeleton = rig.default_skeleton();
    skeleton.joint_classes = vec![JointClass::BodyCoxa, JointClass::Stripe, JointClass::BodyCoxa, JointClass::Stripe];
    skeleton.mirror_classes = vec![JointClass::Stripe];
    skeleton.pinned_classes = vec![JointClass::BodyCoxa, JointClass::Stripe];
    let mut network = rig.to_network(skeleton, NetworkConfig::default(), 0.0, 0).unwrap();

    let reconstruction = network.reconstruction(None).unwrap();
    let pts = reconstruction.points3d.as_ref().unwrap();
    for row in pts {
        assert!(row[1].is_some());
        assert_eq!(row[1], row[3], "mirrored stripes share one pinned point");
        assert_eq!(row[0], pts[0][0]);
        assert_eq!(row[2], pts[0][2]);
    }
    assert_ne!(pts[0][0], pts[0][2], "unmirrored joints keep their own median");
}

#[test]
fn test_reconstruction_without_calibration() {
    let rig = SyntheticRig::new(2, 3, 2, 0);
    let mut network = uncalibrated(&rig, &CameraOrder::identity(2));
    let reconstruction = network.reconstruction(None).unwrap();
    assert!(reconstruction.points3d.is_none());
    assert!(reconstruction.calibration.cameras.is_empty());
    assert_eq!(reconstruction.points2d.len(), 2);
}

#[test]
fn test_bootstrap_pair_chains_poses() {
    let rig = SyntheticRig::new(3, 20, 5, 31);
    let mut network = uncalibrated(&rig, &CameraOrder::identity(3));
    let gt = |i: usize| rig.geometries[i].pose.rotation_matrix();

    let pose = network.bootstrap_pair(0, 1).unwrap();
    assert_eq!(pose.inlier_ratio(), 1.0);
    let cam0 = network.camera(0).unwrap().geometry().unwrap();
    assert_eq!(cam0.pose.rvec, na::Vector3::zeros());
    assert_eq!(cam0.intrinsics, rig.geometries[0].intrinsics);
    let cam1 = network.camera(1).unwrap().geometry().unwrap();
    assert!((cam1.pose.rotation_matrix() - gt(1) * gt(0).transpose()).norm() < 1e-6);
    assert!((cam1.pose.tvec.norm() - 1.0).abs() < 1e-9);

    network.bootstrap_pair(1, 2).unwrap();
    assert!(network.has_calibration());
    let cam2 = network.camera(2).unwrap().geometry().unwrap();
    assert!((cam2.pose.rotation_matrix() - gt(2) * gt(0).transpose()).norm() < 1e-6);

    assert!(matches!(
        network.bootstrap_pair(0, 9),
        Err(NetworkError::UnknownCamera(9))
    ));
}

#[test]
fn test_save_and_reload_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calib.json");
    let rig = SyntheticRig::new(2, 2, 2, 0);
    let network = rig
        .to_network(rig.default_skeleton(), NetworkConfig::default(), 0.0, 0)
        .unwrap();
    network
        .save_calibration(&path, Some(serde_json::json!({ "fly": 1 })))
        .unwrap();

    let mut other = uncalibrated(&rig, &CameraOrder::identity(2));
    let meta = other.load_calibration_file(&path).unwrap();
    assert_eq!(meta["fly"], 1);
    assert!(other.has_calibration());
    let a = network.camera(1).unwrap().geometry().unwrap();
    let b = other.camera(1).unwrap().geometry().unwrap();
    assert!((a.pose.tvec - b.pose.tvec).norm() < 1e-12);
    assert_eq!(a.intrinsics, b.intrinsics);
}
