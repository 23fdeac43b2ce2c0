use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use nalgebra as na;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::camera_model::Camera;
use crate::error::Result;
use crate::triangulation::OutlierRecord;
use crate::types::Intrinsics;

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize>(output_path: impl AsRef<Path>, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}
/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Calibration of one camera as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    /// Axis-angle rotation.
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
    /// Row-major camera matrix `K`.
    pub intrinsics: [[f64; 3]; 3],
    pub distortion: [f64; 5],
}

impl CameraCalibration {
    pub fn from_camera(cam: &Camera) -> Option<CameraCalibration> {
        let g = cam.geometry()?;
        let k = g.intrinsics.k_matrix();
        Some(CameraCalibration {
            rotation: g.pose.rvec.into(),
            translation: g.pose.tvec.into(),
            intrinsics: [
                [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
                [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
                [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
            ],
            distortion: g.distortion,
        })
    }

    pub fn apply_to(&self, cam: &mut Camera) {
        let k = na::Matrix3::from_fn(|r, c| self.intrinsics[r][c]);
        cam.set_rotation(na::Vector3::from(self.rotation));
        cam.set_translation(na::Vector3::from(self.translation));
        cam.set_intrinsics(Intrinsics::from_k_matrix(&k));
        cam.set_distortion(self.distortion);
    }
}

/// Per-camera calibration snapshot keyed by camera id, plus free-form metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationRecord {
    pub cameras: BTreeMap<usize, CameraCalibration>,
    pub meta: serde_json::Value,
}

impl CalibrationRecord {
    pub fn load(path: impl AsRef<Path>) -> Result<CalibrationRecord> {
        object_from_json(path)
    }

    /// Writes `self` into `path`, keeping camera entries and metadata already
    /// stored there that `self` does not replace.
    pub fn save_merged(&self, path: impl AsRef<Path>) -> Result<CalibrationRecord> {
        let path = path.as_ref();
        let mut merged = if path.exists() {
            CalibrationRecord::load(path)?
        } else {
            CalibrationRecord::default()
        };
        for (cam_id, calib) in &self.cameras {
            merged.cameras.insert(*cam_id, calib.clone());
        }
        if !self.meta.is_null() {
            merged.meta = self.meta.clone();
        }
        object_to_json(path, &merged)?;
        Ok(merged)
    }
}

/// Everything a run produces: calibration, corrected 2D and triangulated 3D.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconstruction {
    pub calibration: CalibrationRecord,
    /// Camera id to `[frame][joint][xy]`.
    pub points2d: BTreeMap<usize, Vec<Vec<[f64; 2]>>>,
    /// `[frame][joint]`, `None` where nothing was triangulated. Absent without calibration.
    pub points3d: Option<Vec<Vec<Option<[f64; 3]>>>>,
}

fn unix_timestamp() -> i64 {
    time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .unix_timestamp()
}

#[derive(Serialize)]
struct CalibrationReport {
    timestamp: i64,
    cameras: Vec<CameraReport>,
    overall_mean_error: f64,
    total_points: usize,
}

#[derive(Serialize)]
struct CameraReport {
    id: usize,
    calibration: Option<CameraCalibration>,
    mean_error: f64,
    median_error: f64,
    point_count: usize,
}

/// Per-camera reprojection statistics: `(cam_id, mean, median, count)`.
pub type CameraStats = (usize, f64, f64, usize);

/// Writes a JSON report with per-camera calibration and reprojection statistics.
pub fn write_detailed_report(
    output_path: impl AsRef<Path>,
    record: &CalibrationRecord,
    stats: &[CameraStats],
) -> Result<()> {
    let cameras = stats
        .iter()
        .map(|&(id, mean_error, median_error, point_count)| CameraReport {
            id,
            calibration: record.cameras.get(&id).cloned(),
            mean_error,
            median_error,
            point_count,
        })
        .collect();
    let total_points = stats.iter().map(|s| s.3).sum();
    let overall_mean_error = if total_points > 0 {
        stats.iter().map(|s| s.1 * s.3 as f64).sum::<f64>() / total_points as f64
    } else {
        0.0
    };
    let report = CalibrationReport {
        timestamp: unix_timestamp(),
        cameras,
        overall_mean_error,
        total_points,
    };
    object_to_json(output_path, &report)
}

/// Writes a text report with average and median reprojection error per camera.
pub fn write_report(output_path: impl AsRef<Path>, calibrated: bool, stats: &[CameraStats]) -> Result<()> {
    let mut s = String::new();
    s += format!("Calibrated: {}\n\n", calibrated).as_str();
    for &(cam_id, avg_rep, med_rep, count) in stats {
        s += format!("cam{} ({} observations):\n", cam_id, count).as_str();
        s += format!("    average reprojection error: {:.5} px\n", avg_rep).as_str();
        s += format!("    median  reprojection error: {:.5} px\n\n", med_rep).as_str();
    }
    std::fs::write(output_path, s)?;
    Ok(())
}

/// One line per corrected (frame, joint).
pub fn write_outlier_log(output_path: impl AsRef<Path>, records: &[OutlierRecord], threshold: f64) -> Result<()> {
    let mut file = std::fs::File::create(output_path)?;
    for r in records {
        let cams: Vec<String> = r.cam_ids.iter().map(|c| c.to_string()).collect();
        writeln!(
            file,
            "reprojection error for frame:{:04}, joint:{:02}, cameras:[{}], was {:.2} > threshold:{}, dropped camera:{}",
            r.frame,
            r.joint,
            cams.join(","),
            r.mean_error,
            threshold,
            r.dropped_cam_id
        )?;
    }
    Ok(())
}
