use std::fs;

use camera_network_calibration::NetworkError;
use camera_network_calibration::config::NetworkConfig;
use camera_network_calibration::data_loader::{
    find_latest_file, load_camera_order, load_corrections, load_detections, load_skeleton,
};
use camera_network_calibration::io::{
    CalibrationRecord, object_from_json, object_to_json, write_detailed_report, write_outlier_log, write_report,
};
use camera_network_calibration::skeleton::SkeletonConfig;
use camera_network_calibration::synthetic::SyntheticRig;
use camera_network_calibration::triangulation::OutlierRecord;

#[test]
fn test_save_merged_keeps_other_cameras() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calibration.json");
    let full = SyntheticRig::new(3, 1, 1, 0).calibration_record();
    full.save_merged(&path).unwrap();

    // a partial update replaces camera 1 and keeps the stored metadata
    let mut update = CalibrationRecord::default();
    let mut moved = full.cameras[&1].clone();
    moved.translation[0] += 1.0;
    update.cameras.insert(1, moved.clone());
    let merged = update.save_merged(&path).unwrap();
    assert_eq!(merged.cameras.len(), 3);
    assert_eq!(merged.cameras[&1], moved);
    assert_eq!(merged.cameras[&0], full.cameras[&0]);
    assert_eq!(merged.meta, full.meta);

    let reloaded = CalibrationRecord::load(&path).unwrap();
    assert_eq!(reloaded, merged);

    update.meta = serde_json::json!({ "run": 2 });
    let merged = update.save_merged(&path).unwrap();
    assert_eq!(merged.meta["run"], 2);
}

#[test]
fn test_config_from_json_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{ "triangulation": { "outlier_threshold": 10.0 }, "bundle_adjust": { "excluded_cameras": [3] } }"#,
    )
    .unwrap();
    let config = NetworkConfig::from_json(path.to_str().unwrap()).unwrap();
    assert_eq!(config.triangulation.outlier_threshold, 10.0);
    assert!(!config.triangulation.outlier_rejection);
    assert_eq!(config.bundle_adjust.excluded_cameras, vec![3]);
    assert_eq!(config.bundle_adjust.max_nfev, 1000);
    assert_eq!(config.image_shape.width(), 960);

    let missing = NetworkConfig::from_json(dir.path().join("nope.json").to_str().unwrap());
    assert!(matches!(missing, Err(NetworkError::Io(_))));
}

#[test]
fn test_loaders() {
    let dir = tempfile::tempdir().unwrap();

    let order_path = dir.path().join("order.json");
    fs::write(&order_path, "[1, 2, 0]").unwrap();
    let order = load_camera_order(&order_path).unwrap();
    assert_eq!(order.cid2cidread, vec![2, 0, 1]);
    fs::write(&order_path, "[1, 1, 0]").unwrap();
    assert!(matches!(
        load_camera_order(&order_path),
        Err(NetworkError::ShapeMismatch(_))
    ));

    let detections_path = dir.path().join("pred.json");
    let detections = SyntheticRig::new(2, 3, 4, 0).detections(0.0, 0);
    object_to_json(&detections_path, &detections).unwrap();
    let loaded = load_detections(&detections_path).unwrap();
    assert_eq!(loaded.n_views(), 2);
    assert_eq!(loaded.n_frames(), 3);
    assert_eq!(loaded.n_joints(), 4);
    fs::write(
        &detections_path,
        r#"{ "points": [[[[1.0, 1.0], [2.0, 2.0]]], [[[1.0, 1.0]]]] }"#,
    )
    .unwrap();
    assert!(matches!(
        load_detections(&detections_path),
        Err(NetworkError::ShapeMismatch(_))
    ));

    let corrections_path = dir.path().join("corrections.json");
    fs::write(&corrections_path, r#"{ "2": { "15": [[1.0, 2.0], [3.0, 4.0]] } }"#).unwrap();
    let corrections = load_corrections(&corrections_path).unwrap();
    assert_eq!(corrections[&2][&15], vec![[1.0, 2.0], [3.0, 4.0]]);

    let skeleton_path = dir.path().join("skeleton.json");
    let skeleton = SkeletonConfig::all_visible(3, &[0, 1]);
    object_to_json(&skeleton_path, &skeleton).unwrap();
    assert_eq!(load_skeleton(&skeleton_path).unwrap(), skeleton);
    let mut broken = skeleton.clone();
    broken.correction_joints.push(5);
    object_to_json(&skeleton_path, &broken).unwrap();
    assert!(load_skeleton(&skeleton_path).is_err());

    let bad_json = dir.path().join("bad.json");
    fs::write(&bad_json, "{ not json").unwrap();
    let result: Result<Vec<usize>, _> = object_from_json(&bad_json);
    assert!(matches!(result, Err(NetworkError::Json(_))));
}

#[test]
fn test_find_latest_file() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(find_latest_file(dir.path(), "pred*.json"), None);

    let older = dir.path().join("pred_a.json");
    let newer = dir.path().join("pred_b.json");
    fs::write(&older, "[]").unwrap();
    fs::write(dir.path().join("other.json"), "[]").unwrap();
    let file = fs::File::create(&newer).unwrap();
    let later = fs::metadata(&older).unwrap().modified().unwrap() + std::time::Duration::from_secs(10);
    file.set_modified(later).unwrap();

    assert_eq!(find_latest_file(dir.path(), "pred*.json"), Some(newer));
}

#[test]
fn test_reports() {
    let dir = tempfile::tempdir().unwrap();
    let stats = vec![(0, 1.5, 1.25, 10), (1, 0.5, 0.5, 30)];

    let text = dir.path().join("report.txt");
    write_report(&text, true, &stats).unwrap();
    let contents = fs::read_to_string(&text).unwrap();
    assert!(contents.starts_with("Calibrated: true"));
    assert!(contents.contains("cam1 (30 observations):"));
    assert!(contents.contains("average reprojection error: 1.50000 px"));

    let json = dir.path().join("report.json");
    let record = SyntheticRig::new(2, 1, 1, 0).calibration_record();
    write_detailed_report(&json, &record, &stats).unwrap();
    let value: serde_json::Value = object_from_json(&json).unwrap();
    assert_eq!(value["total_points"], 40);
    assert!((value["overall_mean_error"].as_f64().unwrap() - 0.75).abs() < 1e-12);
    assert_eq!(value["cameras"][1]["id"], 1);
    assert!(value["cameras"][0]["calibration"].is_object());
    assert!(value["timestamp"].as_i64().unwrap() > 0);
}

#[test]
fn test_outlier_log_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outliers.txt");
    let records = vec![OutlierRecord {
        frame: 7,
        joint: 3,
        cam_ids: vec![0, 1, 2],
        distances: vec![1.0, 2.0, 90.0],
        mean_error: 31.0,
        kept_cam_ids: [1, 0],
        dropped_cam_id: 2,
    }];
    write_outlier_log(&path, &records, 25.0).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "reprojection error for frame:0007, joint:03, cameras:[0,1,2], was 31.00 > threshold:25, dropped camera:2\n"
    );
}
