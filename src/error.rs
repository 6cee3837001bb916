#![allow(dead_code)]

use thiserror::Error;

/// Main error type for the argus engine
#[derive(Error, Debug)]
pub enum ArgusError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Motion analysis error: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("Object detection error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Alert log error: {0}")]
    Alert(#[from] AlertError),

    #[error("Query server error: {0}")]
    Server(#[from] ServerError),

    #[error("Frame processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Capture pipeline error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open camera device {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Failed to open stream URL {url}: {details}")]
    UrlOpen { url: String, details: String },

    #[error("Failed to capture frame")]
    FrameGrab,

    #[error("Capture stream error: {details}")]
    Stream { details: String },

    #[error("Capture backend not available (gstreamer feature disabled)")]
    BackendUnavailable,
}

/// Motion analyzer error types
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },
}

/// Object detection error types
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Failed to load model from {path}: {details}")]
    ModelLoad { path: String, details: String },

    #[error("Inference failed: {details}")]
    Inference { details: String },

    #[error("Unexpected model output: {details}")]
    OutputShape { details: String },
}

/// Alert log error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alert index {index} out of range")]
    IndexOutOfRange { index: usize },

    #[error("Alert at index {index} has no snapshot image")]
    NoSnapshotImage { index: usize },

    #[error("No valid alerts selected for export")]
    EmptySelection,

    #[error("Snapshot encoding failed: {details}")]
    SnapshotEncode { details: String },

    #[error("Export write failed for {path}: {source}")]
    ExportWrite {
        path: String,
        source: std::io::Error,
    },
}

/// HTTP query server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("Server error: {details}")]
    Serve { details: String },
}

/// Frame processing error types
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Frame conversion failed: {details}")]
    Conversion { details: String },

    #[error("JPEG encoding failed: {details}")]
    JpegEncoding { details: String },
}

impl ArgusError {
    /// Create a system error with a message
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Get the component name associated with this error
    pub fn component_name(&self) -> &'static str {
        match self {
            ArgusError::Capture(_) => "capture",
            ArgusError::Analyzer(_) => "analyzer",
            ArgusError::Detector(_) => "detector",
            ArgusError::Alert(_) => "alerts",
            ArgusError::Server(_) => "server",
            ArgusError::Processing(_) => "processing",
            ArgusError::Config(_) => "config",
            _ => "system",
        }
    }

    /// True for failures scoped to a single camera pipeline.
    ///
    /// These never propagate to sibling cameras or the HTTP surface.
    pub fn is_camera_local(&self) -> bool {
        matches!(
            self,
            ArgusError::Capture(_) | ArgusError::Analyzer(_) | ArgusError::Detector(_)
        )
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, ArgusError>;
