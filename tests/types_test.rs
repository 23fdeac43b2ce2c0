use camera_network_calibration::types::{Intrinsics, RvecTvec, ToRvecTvec};
use nalgebra as na;

#[test]
fn test_rvec_tvec_conversion() {
    let rvec_in = na::Vector3::new(0.1, 0.2, 0.3);
    let tvec_in = na::Vector3::new(1.0, 2.0, 3.0);

    let rt = RvecTvec::new(rvec_in, tvec_in);
    let iso = rt.to_na_isometry3();
    let rt_back = iso.to_rvec_tvec();

    assert!((rt_back.rvec - rvec_in).norm() < 1e-9);
    assert!((rt_back.tvec - tvec_in).norm() < 1e-9);
}

#[test]
fn test_rotation_matrix_is_orthonormal() {
    let rt = RvecTvec::new(na::Vector3::new(-0.4, 1.2, 0.7), na::Vector3::zeros());
    let r = rt.rotation_matrix();
    assert!((r * r.transpose() - na::Matrix3::identity()).norm() < 1e-12);
    assert!((r.determinant() - 1.0).abs() < 1e-12);
}

#[test]
fn test_intrinsics_k_matrix() {
    let intr = Intrinsics::centered(800.0, 960, 480);
    assert_eq!(intr.cx, 480.0);
    assert_eq!(intr.cy, 240.0);

    let k = intr.k_matrix();
    assert_eq!(k[(0, 0)], 800.0);
    assert_eq!(k[(1, 2)], 240.0);
    assert_eq!(k[(2, 2)], 1.0);
    assert_eq!(Intrinsics::from_k_matrix(&k), intr);
    assert_eq!(intr.mean_focal(), 800.0);
}
