pub mod camera_model;
pub mod config;
pub mod data_loader;
pub mod detected_points;
pub mod error;
pub mod io;
pub mod network;
pub mod optimization;
pub mod postprocess;
pub mod skeleton;
pub mod synthetic;
pub mod triangulation;
pub mod types;
pub mod util;

pub use error::{NetworkError, Result};
pub use network::CameraNetwork;
