#![allow(dead_code)]

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub detector: DetectorConfig,
    pub motion: MotionConfig,
    pub snapshots: SnapshotConfig,
    pub cameras: CamerasConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// IP address to bind to
    #[serde(default = "default_http_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Enable periodic object detection on capture pipelines
    #[serde(default = "default_detector_enabled")]
    pub enabled: bool,

    /// Path to the ONNX model file
    #[serde(default = "default_model_path")]
    pub model_path: String,

    /// Minimum detection confidence; a hard floor of 0.4 applies regardless
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// IoU threshold for non-maximum suppression
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f64,

    /// Square model input side in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Enable background-subtraction motion scoring
    #[serde(default = "default_motion_enabled")]
    pub enabled: bool,

    /// Motion sensitivity in [0, 100]; higher fires on less motion
    #[serde(default = "default_motion_sensitivity")]
    pub sensitivity: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SnapshotConfig {
    /// Attach a frame snapshot to frame-wide motion alerts
    #[serde(default = "default_auto_snapshot")]
    pub on_motion: bool,

    /// Attach a frame snapshot to ROI motion and loitering alerts
    #[serde(default = "default_auto_snapshot")]
    pub on_roi: bool,

    /// Attach a frame snapshot to tripwire alerts
    #[serde(default = "default_auto_snapshot")]
    pub on_tripwire: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CamerasConfig {
    /// Path to the persisted camera slot configuration
    #[serde(default = "default_cameras_path")]
    pub config_path: String,
}

impl AppConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("argus.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("http.ip", default_http_ip())?
            .set_default("http.port", default_http_port() as i64)?
            .set_default("detector.enabled", default_detector_enabled())?
            .set_default("detector.model_path", default_model_path())?
            .set_default(
                "detector.confidence_threshold",
                default_confidence_threshold(),
            )?
            .set_default("detector.nms_threshold", default_nms_threshold())?
            .set_default("detector.input_size", default_input_size() as i64)?
            .set_default("motion.enabled", default_motion_enabled())?
            .set_default("motion.sensitivity", default_motion_sensitivity())?
            .set_default("snapshots.on_motion", default_auto_snapshot())?
            .set_default("snapshots.on_roi", default_auto_snapshot())?
            .set_default("snapshots.on_tripwire", default_auto_snapshot())?
            .set_default("cameras.config_path", default_cameras_path())?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("ARGUS").separator("_"))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Message(
                "HTTP port must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.motion.sensitivity) {
            return Err(ConfigError::Message(
                "Motion sensitivity must be in [0, 100]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(ConfigError::Message(
                "Detector confidence threshold must be in [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.nms_threshold) {
            return Err(ConfigError::Message(
                "Detector NMS threshold must be in [0, 1]".to_string(),
            ));
        }

        if self.detector.input_size == 0 {
            return Err(ConfigError::Message(
                "Detector input size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                ip: default_http_ip(),
                port: default_http_port(),
            },
            detector: DetectorConfig {
                enabled: default_detector_enabled(),
                model_path: default_model_path(),
                confidence_threshold: default_confidence_threshold(),
                nms_threshold: default_nms_threshold(),
                input_size: default_input_size(),
            },
            motion: MotionConfig {
                enabled: default_motion_enabled(),
                sensitivity: default_motion_sensitivity(),
            },
            snapshots: SnapshotConfig {
                on_motion: default_auto_snapshot(),
                on_roi: default_auto_snapshot(),
                on_tripwire: default_auto_snapshot(),
            },
            cameras: CamerasConfig {
                config_path: default_cameras_path(),
            },
        }
    }
}

// Default value functions
fn default_http_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}

fn default_detector_enabled() -> bool {
    true
}
fn default_model_path() -> String {
    "assets/models/yolov8n.onnx".to_string()
}
fn default_confidence_threshold() -> f64 {
    0.5
}
fn default_nms_threshold() -> f64 {
    0.45
}
fn default_input_size() -> u32 {
    640
}

fn default_motion_enabled() -> bool {
    true
}
fn default_motion_sensitivity() -> f64 {
    50.0
}

fn default_auto_snapshot() -> bool {
    false
}

fn default_cameras_path() -> String {
    "cameras.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.detector.input_size, 640);
        assert_eq!(config.motion.sensitivity, 50.0);
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = AppConfig::default();

        config.motion.sensitivity = 150.0;
        assert!(config.validate().is_err());
        config.motion.sensitivity = 50.0;

        config.detector.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
        config.detector.confidence_threshold = 0.5;

        config.http.port = 0;
        assert!(config.validate().is_err());
        config.http.port = 8080;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.http.ip, "0.0.0.0");
        assert_eq!(config.detector.nms_threshold, 0.45);
    }
}
