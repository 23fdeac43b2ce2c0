use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// A 2D observation is missing when either coordinate is exactly zero.
pub fn is_missing(p: &na::Vector2<f64>) -> bool {
    p.x == 0.0 || p.y == 0.0
}

/// Dense `[frame][joint] -> (x, y)` observation table of one camera.
///
/// `(0, 0)` marks "no observation", not a detection at the image corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Points2d {
    n_frames: usize,
    n_joints: usize,
    data: Vec<na::Vector2<f64>>,
}

impl Points2d {
    pub fn zeros(n_frames: usize, n_joints: usize) -> Points2d {
        Points2d {
            n_frames,
            n_joints,
            data: vec![na::Vector2::zeros(); n_frames * n_joints],
        }
    }

    pub fn from_nested(rows: &[Vec<[f64; 2]>]) -> Result<Points2d> {
        let n_frames = rows.len();
        let n_joints = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut out = Points2d::zeros(n_frames, n_joints);
        for (frame, row) in rows.iter().enumerate() {
            if row.len() != n_joints {
                return Err(NetworkError::ShapeMismatch(format!(
                    "frame {} has {} joints, expected {}",
                    frame,
                    row.len(),
                    n_joints
                )));
            }
            for (joint, p) in row.iter().enumerate() {
                out.set(frame, joint, na::Vector2::new(p[0], p[1]));
            }
        }
        Ok(out)
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }
    pub fn n_joints(&self) -> usize {
        self.n_joints
    }

    /// Raw value, including the `(0, 0)` sentinel.
    pub fn get(&self, frame: usize, joint: usize) -> na::Vector2<f64> {
        self.data[frame * self.n_joints + joint]
    }

    pub fn observed(&self, frame: usize, joint: usize) -> Option<na::Vector2<f64>> {
        let p = self.get(frame, joint);
        if is_missing(&p) { None } else { Some(p) }
    }

    pub fn set(&mut self, frame: usize, joint: usize, p: na::Vector2<f64>) {
        self.data[frame * self.n_joints + joint] = p;
    }

    pub fn frame(&self, frame: usize) -> &[na::Vector2<f64>] {
        let start = frame * self.n_joints;
        &self.data[start..start + self.n_joints]
    }

    /// Overwrites a whole frame row, as manual corrections do.
    pub fn set_frame(&mut self, frame: usize, row: &[na::Vector2<f64>]) -> Result<()> {
        if row.len() != self.n_joints {
            return Err(NetworkError::ShapeMismatch(format!(
                "correction row has {} joints, expected {}",
                row.len(),
                self.n_joints
            )));
        }
        let start = frame * self.n_joints;
        self.data[start..start + self.n_joints].copy_from_slice(row);
        Ok(())
    }

    /// Frames `[start, end)` as a new table.
    pub fn slice_frames(&self, start: usize, end: usize) -> Points2d {
        let end = end.min(self.n_frames);
        let start = start.min(end);
        Points2d {
            n_frames: end - start,
            n_joints: self.n_joints,
            data: self.data[start * self.n_joints..end * self.n_joints].to_vec(),
        }
    }

    pub fn to_nested(&self) -> Vec<Vec<[f64; 2]>> {
        (0..self.n_frames)
            .map(|f| self.frame(f).iter().map(|p| [p.x, p.y]).collect())
            .collect()
    }
}

/// Dense `[frame][joint] -> (x, y, z)` tensor with an explicit triangulated mask.
///
/// Unset cells hold zeros so the raw layout matches the 2D tables, but `get`
/// keeps "never triangulated" apart from "triangulated to the origin".
#[derive(Debug, Clone, PartialEq)]
pub struct Points3d {
    n_frames: usize,
    n_joints: usize,
    data: Vec<na::Vector3<f64>>,
    valid: Vec<bool>,
}

impl Points3d {
    pub fn zeros(n_frames: usize, n_joints: usize) -> Points3d {
        Points3d {
            n_frames,
            n_joints,
            data: vec![na::Vector3::zeros(); n_frames * n_joints],
            valid: vec![false; n_frames * n_joints],
        }
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }
    pub fn n_joints(&self) -> usize {
        self.n_joints
    }

    pub fn get(&self, frame: usize, joint: usize) -> Option<na::Vector3<f64>> {
        let idx = frame * self.n_joints + joint;
        if self.valid[idx] { Some(self.data[idx]) } else { None }
    }

    pub fn raw(&self, frame: usize, joint: usize) -> na::Vector3<f64> {
        self.data[frame * self.n_joints + joint]
    }

    pub fn is_set(&self, frame: usize, joint: usize) -> bool {
        self.valid[frame * self.n_joints + joint]
    }

    pub fn set(&mut self, frame: usize, joint: usize, p: na::Vector3<f64>) {
        let idx = frame * self.n_joints + joint;
        self.data[idx] = p;
        self.valid[idx] = true;
    }

    pub fn clear(&mut self, frame: usize, joint: usize) {
        let idx = frame * self.n_joints + joint;
        self.data[idx] = na::Vector3::zeros();
        self.valid[idx] = false;
    }

    pub fn count_set(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Replaces one frame from a per-joint result row.
    pub fn write_frame(&mut self, frame: usize, row: &[Option<na::Vector3<f64>>]) {
        for (joint, p) in row.iter().enumerate() {
            match p {
                Some(p) => self.set(frame, joint, *p),
                None => self.clear(frame, joint),
            }
        }
    }

    pub fn to_nested(&self) -> Vec<Vec<Option<[f64; 3]>>> {
        (0..self.n_frames)
            .map(|f| {
                (0..self.n_joints)
                    .map(|j| self.get(f, j).map(|p| [p.x, p.y, p.z]))
                    .collect()
            })
            .collect()
    }
}

/// Detector output, indexed `[camera_read][frame][joint][xy]`.
///
/// A detector may emit only half a skeleton per view; see
/// [`crate::skeleton::SkeletonConfig::detection_half`] for where those rows land.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detections {
    pub points: Vec<Vec<Vec<[f64; 2]>>>,
    /// Coordinates are in `[0, 1]` and get scaled by the image shape on ingestion.
    #[serde(default)]
    pub normalized: bool,
}

impl Detections {
    pub fn n_views(&self) -> usize {
        self.points.len()
    }

    pub fn n_frames(&self) -> usize {
        self.points.first().map(|v| v.len()).unwrap_or(0)
    }

    pub fn n_joints(&self) -> usize {
        self.points
            .first()
            .and_then(|v| v.first())
            .map(|f| f.len())
            .unwrap_or(0)
    }

    /// Observation table of one physical view, scaled to pixels.
    ///
    /// Missing entries stay `(0, 0)` after scaling.
    pub fn view(&self, cam_id_read: usize, image_shape: [u32; 2]) -> Result<Points2d> {
        let rows = self
            .points
            .get(cam_id_read)
            .ok_or(NetworkError::UnknownCamera(cam_id_read))?;
        let mut table = Points2d::from_nested(rows)?;
        if self.normalized {
            let scale = na::Vector2::new(image_shape[0] as f64, image_shape[1] as f64);
            for f in 0..table.n_frames() {
                for j in 0..table.n_joints() {
                    let p = table.get(f, j);
                    table.set(f, j, p.component_mul(&scale));
                }
            }
        }
        Ok(table)
    }
}
