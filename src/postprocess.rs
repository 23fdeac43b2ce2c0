use nalgebra as na;

use crate::detected_points::{Points2d, Points3d};
use crate::util::median;

/// Sets every frame of `joint` to the per-coordinate median of its observed
/// frames. Joints never observed are left untouched.
pub fn pin_points2d_to_median(points2d: &mut Points2d, joint: usize) {
    let observed: Vec<na::Vector2<f64>> = (0..points2d.n_frames())
        .filter_map(|f| points2d.observed(f, joint))
        .collect();
    let xs: Vec<f64> = observed.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = observed.iter().map(|p| p.y).collect();
    if let (Some(x), Some(y)) = (median(&xs), median(&ys)) {
        for f in 0..points2d.n_frames() {
            points2d.set(f, joint, na::Vector2::new(x, y));
        }
    }
}

/// Sets every triangulated frame of `joints` to one per-coordinate median,
/// pooled over all their frames. Unset frames stay unset.
///
/// Pass a single joint to pin it on its own, or a joint with its mirror so
/// both land on the same point.
pub fn pin_points3d_to_median(points3d: &mut Points3d, joints: &[usize]) {
    let set: Vec<na::Vector3<f64>> = joints
        .iter()
        .flat_map(|&j| (0..points3d.n_frames()).map(move |f| (f, j)))
        .filter_map(|(f, j)| points3d.get(f, j))
        .collect();
    let coord = |k: usize| median(&set.iter().map(|p| p[k]).collect::<Vec<_>>());
    if let (Some(x), Some(y), Some(z)) = (coord(0), coord(1), coord(2)) {
        let pinned = na::Vector3::new(x, y, z);
        for &j in joints {
            for f in 0..points3d.n_frames() {
                if points3d.is_set(f, j) {
                    points3d.set(f, j, pinned);
                }
            }
        }
    }
}
