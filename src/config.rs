use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::object_from_json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Run the three-camera outlier rejection pass. Off unless asked for.
    pub outlier_rejection: bool,
    /// Mean per-camera reprojection distance (px) that triggers rejection.
    pub outlier_threshold: f64,
    pub show_progress: bool,
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            outlier_rejection: false,
            outlier_threshold: 25.0,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleAdjustConfig {
    /// Stop once a step lowers the cost by less than `ftol * cost`.
    pub ftol: f64,
    /// Stop once a step moves the parameters by less than `xtol * (xtol + |x|)`.
    pub xtol: f64,
    /// Cap on solver iterations, one trial evaluation each.
    pub max_nfev: usize,
    /// Frames beyond this count are subsampled at random.
    pub max_num_images: usize,
    pub seed: u64,
    /// Let focal lengths and distortion move. Off, they stay at their loaded values.
    pub refine_intrinsics: bool,
    /// Share one 3D point between mirrored joints of the same frame.
    pub merge_mirrored: bool,
    /// Cameras that never contribute observations.
    pub excluded_cameras: Vec<usize>,
}

impl Default for BundleAdjustConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-4,
            xtol: 1e-8,
            max_nfev: 1000,
            max_num_images: 1000,
            seed: 0,
            refine_intrinsics: false,
            merge_mirrored: true,
            excluded_cameras: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Inlier threshold in pixels, turned into an angle with the mean focal length.
    pub ransac_threshold: f64,
    /// Triangulated points farther than this are not counted by the cheirality check.
    pub distance_threshold: f64,
    /// Focal length (px) assumed for cameras without intrinsics.
    pub assumed_focal: f64,
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            ransac_threshold: 5.0,
            distance_threshold: 100.0,
            assumed_focal: 1000.0,
            seed: 0,
        }
    }
}

/// Immutable run configuration handed to the triangulator and bundle adjuster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub image_shape: ImageShape,
    pub triangulation: TriangulationConfig,
    pub bundle_adjust: BundleAdjustConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape(pub [u32; 2]);

impl Default for ImageShape {
    fn default() -> Self {
        ImageShape([960, 480])
    }
}

impl ImageShape {
    pub fn width(&self) -> u32 {
        self.0[0]
    }
    pub fn height(&self) -> u32 {
        self.0[1]
    }
}

impl NetworkConfig {
    pub fn from_json(path: &str) -> Result<NetworkConfig> {
        object_from_json(path)
    }
}
