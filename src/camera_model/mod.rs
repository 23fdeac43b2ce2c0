pub mod camera;
pub mod generic;
pub mod opencv5;

pub use camera::{CAMERA_PARAMS, Camera, CameraGeometry, project_params};
pub use generic::{CameraModel, rotate_axis_angle};
pub use opencv5::OpenCVModel5;
