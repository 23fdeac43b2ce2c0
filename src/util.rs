use nalgebra as na;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median with the upper and lower middle averaged for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Average and median reprojection distance per camera, from signed residuals.
pub fn reprojection_stats(residuals: &[na::Vector2<f64>]) -> (f64, f64) {
    let norms: Vec<f64> = residuals.iter().map(|r| r.norm()).collect();
    (mean(&norms).unwrap_or(0.0), median(&norms).unwrap_or(0.0))
}
