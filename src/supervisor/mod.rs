mod manager;
mod persist;

pub use manager::{CameraSupervisor, MAX_CAMERA_SLOTS};
pub use persist::{load_camera_configs, save_camera_configs, CameraSlotConfig, SourceKind};
