use nalgebra as na;

/// Linear (DLT) triangulation from two or more views.
///
/// Each view adds the rows `u * P[2] - P[0]` and `v * P[2] - P[1]`; the point is
/// the right singular vector of the smallest singular value, dehomogenized.
/// Near-parallel rays are not rejected: whatever the solve returns is passed on.
pub fn triangulate_linear(
    projections: &[na::Matrix3x4<f64>],
    points2d: &[na::Vector2<f64>],
) -> na::Vector3<f64> {
    debug_assert_eq!(projections.len(), points2d.len());
    let n = projections.len();
    // pad to at least 4 rows so SVD yields a full 4x4 V^T
    let mut a = na::DMatrix::<f64>::zeros((2 * n).max(4), 4);
    for (i, (p, uv)) in projections.iter().zip(points2d).enumerate() {
        a.row_mut(2 * i)
            .copy_from(&(p.row(2) * uv.x - p.row(0)));
        a.row_mut(2 * i + 1)
            .copy_from(&(p.row(2) * uv.y - p.row(1)));
    }
    let svd = a.svd(false, true);
    let Some(v_t) = svd.v_t else {
        return na::Vector3::zeros();
    };
    let smallest = svd.singular_values.argmin().0;
    let x = v_t.row(smallest);
    na::Vector3::new(x[0] / x[3], x[1] / x[3], x[2] / x[3])
}
