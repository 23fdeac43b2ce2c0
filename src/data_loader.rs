use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::glob;
use serde::{Deserialize, Serialize};

use crate::detected_points::Detections;
use crate::error::{NetworkError, Result};
use crate::io::object_from_json;
use crate::skeleton::SkeletonConfig;

/// Manual 2D overrides: camera id to frame to a full joint row of `[x, y]`.
pub type ManualCorrections = BTreeMap<usize, BTreeMap<usize, Vec<[f64; 2]>>>;

/// Mapping between logical camera ids and the index their data is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraOrder {
    /// `cidread2cid[cam_id_read] = cam_id`.
    pub cidread2cid: Vec<usize>,
    /// `cid2cidread[cam_id] = cam_id_read`.
    pub cid2cidread: Vec<usize>,
}

impl CameraOrder {
    pub fn identity(n: usize) -> CameraOrder {
        CameraOrder {
            cidread2cid: (0..n).collect(),
            cid2cidread: (0..n).collect(),
        }
    }

    /// Inverts a `cidread2cid` permutation.
    pub fn from_cidread2cid(cidread2cid: Vec<usize>) -> Result<CameraOrder> {
        let n = cidread2cid.len();
        let mut cid2cidread = vec![usize::MAX; n];
        for (read, &cid) in cidread2cid.iter().enumerate() {
            if cid >= n || cid2cidread[cid] != usize::MAX {
                return Err(NetworkError::ShapeMismatch(format!(
                    "camera order {:?} is not a permutation",
                    cidread2cid
                )));
            }
            cid2cidread[cid] = read;
        }
        Ok(CameraOrder {
            cidread2cid,
            cid2cidread,
        })
    }

    pub fn len(&self) -> usize {
        self.cid2cidread.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cid2cidread.is_empty()
    }
}

/// Loads a JSON list `cidread2cid`.
pub fn load_camera_order(path: impl AsRef<Path>) -> Result<CameraOrder> {
    let cidread2cid: Vec<usize> = object_from_json(path)?;
    CameraOrder::from_cidread2cid(cidread2cid)
}

pub fn load_detections(path: impl AsRef<Path>) -> Result<Detections> {
    let path = path.as_ref();
    log::debug!("loading detections from {}", path.display());
    let detections: Detections = object_from_json(path)?;
    let (n_frames, n_joints) = (detections.n_frames(), detections.n_joints());
    for (view, frames) in detections.points.iter().enumerate() {
        if frames.len() != n_frames || frames.iter().any(|f| f.len() != n_joints) {
            return Err(NetworkError::ShapeMismatch(format!(
                "view {} does not match {} frames x {} joints",
                view, n_frames, n_joints
            )));
        }
    }
    Ok(detections)
}

pub fn load_corrections(path: impl AsRef<Path>) -> Result<ManualCorrections> {
    object_from_json(path)
}

pub fn load_skeleton(path: impl AsRef<Path>) -> Result<SkeletonConfig> {
    let skeleton: SkeletonConfig = object_from_json(path)?;
    skeleton.validate()?;
    Ok(skeleton)
}

/// Most recently modified file matching `pattern` (e.g. `pred*.json`) in `folder`.
pub fn find_latest_file(folder: impl AsRef<Path>, pattern: &str) -> Option<PathBuf> {
    let query = folder.as_ref().join(pattern);
    let paths = glob(query.to_str()?).ok()?;
    let mut dated: Vec<(std::time::SystemTime, PathBuf)> = paths
        .filter_map(|p| p.ok())
        .filter_map(|p| {
            let modified = std::fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .collect();
    dated.sort();
    dated.pop().map(|(_, p)| p)
}
