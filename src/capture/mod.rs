mod pipeline;
mod source;

pub use pipeline::{
    AnalyticsGeometry, AnalyticsSettings, CameraPipeline, PipelineCore, PipelineState,
    AI_PROCESS_INTERVAL, FRAME_INTERVAL_MS, MOTION_DEBOUNCE_MS, MOTION_TRIPWIRE_DEBOUNCE_MS,
    ROI_MOTION_DEBOUNCE_MS,
};
pub use source::{open_video_source, VideoSource, VideoTarget};
