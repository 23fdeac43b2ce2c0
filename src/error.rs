use thiserror::Error;

/// Errors surfaced by the camera network.
///
/// Geometry itself never fails: insufficient observations leave a point unset
/// and degenerate rays are passed through. These variants cover the
/// boundaries around it.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A camera taking part in a geometric operation has no pose or intrinsics.
    #[error("camera {cam_id} is not calibrated")]
    MissingCalibration { cam_id: usize },
    #[error("unknown camera id {0}")]
    UnknownCamera(usize),
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Pose bootstrap needs at least eight shared observations.
    #[error("need at least {needed} shared observations, got {got}")]
    InsufficientCorrespondences { needed: usize, got: usize },
    #[error("essential matrix estimation failed: {0}")]
    EssentialEstimation(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;
