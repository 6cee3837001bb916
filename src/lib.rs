pub mod alerts;
pub mod analyzer;
pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod http;
pub mod supervisor;
pub mod tracker;

pub use alerts::{Alert, AlertKind, AlertLog, AlertWriter, SharedAlertLog};
pub use analyzer::{MotionAnalysis, MotionAnalyzer};
pub use capture::{
    AnalyticsGeometry, AnalyticsSettings, CameraPipeline, PipelineCore, PipelineState, VideoTarget,
};
pub use config::AppConfig;
pub use detector::{Detection, DetectionAdapter, DetectorBackend};
pub use error::{ArgusError, Result};
pub use events::{event_channel, CameraEvent, CrossingDirection, EventKind};
pub use frame::{FrameData, FrameFormat};
pub use geometry::{iou, point_in_polygon, side_of_line, Letterbox, NormPoint, PixelBox};
pub use http::QueryServer;
pub use supervisor::{CameraSupervisor, CameraSlotConfig, SourceKind};
pub use tracker::{CentroidTracker, TrackEvent, TrackState};
