use camera_network_calibration::detected_points::{Points2d, Points3d};
use camera_network_calibration::postprocess::{pin_points2d_to_median, pin_points3d_to_median};
use camera_network_calibration::util::{mean, median, reprojection_stats};
use nalgebra as na;

#[test]
fn test_mean_and_median() {
    assert_eq!(mean(&[]), None);
    assert_eq!(median(&[]), None);
    assert_eq!(mean(&[1.0, 2.0, 6.0]), Some(3.0));
    assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
    // even length averages the two middle values
    assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
}

#[test]
fn test_reprojection_stats() {
    let residuals = vec![
        na::Vector2::new(3.0, 4.0),
        na::Vector2::new(0.0, 1.0),
        na::Vector2::new(0.0, 0.0),
    ];
    let (avg, med) = reprojection_stats(&residuals);
    assert!((avg - 2.0).abs() < 1e-12);
    assert!((med - 1.0).abs() < 1e-12);

    assert_eq!(reprojection_stats(&[]), (0.0, 0.0));
}

#[test]
fn test_pin_points2d_ignores_missing() {
    let mut table = Points2d::zeros(4, 2);
    table.set(0, 1, na::Vector2::new(10.0, 20.0));
    table.set(1, 1, na::Vector2::new(30.0, 40.0));
    table.set(2, 1, na::Vector2::new(20.0, 30.0));
    // frame 3 missing

    pin_points2d_to_median(&mut table, 1);
    for f in 0..4 {
        assert_eq!(table.get(f, 1), na::Vector2::new(20.0, 30.0), "frame {}", f);
    }
    // never observed joint stays missing
    pin_points2d_to_median(&mut table, 0);
    assert_eq!(table.observed(0, 0), None);
}

#[test]
fn test_pin_points3d_keeps_unset() {
    let mut points = Points3d::zeros(3, 1);
    points.set(0, 0, na::Vector3::new(1.0, 1.0, 1.0));
    points.set(2, 0, na::Vector3::new(3.0, 5.0, 7.0));

    pin_points3d_to_median(&mut points, &[0]);
    assert_eq!(points.get(0, 0), Some(na::Vector3::new(2.0, 3.0, 4.0)));
    assert_eq!(points.get(1, 0), None);
    assert_eq!(points.get(2, 0), Some(na::Vector3::new(2.0, 3.0, 4.0)));
}

#[test]
fn test_pin_points3d_pools_joints() {
    let mut points = Points3d::zeros(2, 3);
    points.set(0, 0, na::Vector3::new(0.0, 0.0, 0.0));
    points.set(1, 0, na::Vector3::new(2.0, 2.0, 2.0));
    points.set(0, 2, na::Vector3::new(4.0, 4.0, 4.0));
    points.set(0, 1, na::Vector3::new(9.0, 9.0, 9.0));

    pin_points3d_to_median(&mut points, &[0, 2]);
    let shared = Some(na::Vector3::new(2.0, 2.0, 2.0));
    assert_eq!(points.get(0, 0), shared);
    assert_eq!(points.get(1, 0), shared);
    assert_eq!(points.get(0, 2), shared);
    assert_eq!(points.get(1, 2), None);
    assert_eq!(points.get(0, 1), Some(na::Vector3::new(9.0, 9.0, 9.0)));
}
