use crate::error::CaptureError;
use crate::frame::FrameData;
use std::fmt;

/// Where a pipeline reads its frames from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoTarget {
    /// Local capture device by index (/dev/video{N})
    Device(u32),
    /// RTSP or HTTP stream URL
    Url(String),
}

impl fmt::Display for VideoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoTarget::Device(index) => write!(f, "device {}", index),
            VideoTarget::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Blocking frame source owned by exactly one capture thread.
pub trait VideoSource: Send {
    /// Read the next frame. Blocks up to roughly one frame period.
    fn read_frame(&mut self) -> Result<FrameData, CaptureError>;
}

/// Open a video source for the given target.
///
/// Requires the `gstreamer` feature; without it every open fails soft so
/// that the rest of the engine keeps running.
#[cfg(feature = "gstreamer")]
pub fn open_video_source(target: &VideoTarget) -> Result<Box<dyn VideoSource>, CaptureError> {
    Ok(Box::new(gst::GstVideoSource::open(target)?))
}

#[cfg(not(feature = "gstreamer"))]
pub fn open_video_source(_target: &VideoTarget) -> Result<Box<dyn VideoSource>, CaptureError> {
    Err(CaptureError::BackendUnavailable)
}

#[cfg(feature = "gstreamer")]
mod gst {
    use super::{VideoSource, VideoTarget};
    use crate::error::CaptureError;
    use crate::frame::{FrameData, FrameFormat};
    use gstreamer::prelude::*;
    use gstreamer_app::AppSink;
    use tracing::{debug, info, warn};

    /// GStreamer-backed source producing BGR frames through an appsink.
    pub struct GstVideoSource {
        pipeline: gstreamer::Pipeline,
        appsink: AppSink,
        target: VideoTarget,
    }

    impl GstVideoSource {
        pub fn open(target: &VideoTarget) -> Result<Self, CaptureError> {
            if let Err(e) = gstreamer::init() {
                return Err(open_error(target, format!("GStreamer init failed: {}", e)));
            }

            let description = match target {
                VideoTarget::Device(index) => format!(
                    "v4l2src device=/dev/video{} ! videoconvert ! \
                     video/x-raw,format=BGR,width=640,height=480 ! \
                     appsink name=sink sync=false max-buffers=1 drop=true",
                    index
                ),
                VideoTarget::Url(url) => format!(
                    "rtspsrc location={} latency=100 ! decodebin ! videoconvert ! \
                     video/x-raw,format=BGR ! \
                     appsink name=sink sync=false max-buffers=1 drop=true",
                    url
                ),
            };

            debug!("Creating capture pipeline: {}", description);

            let pipeline = gstreamer::parse::launch(&description)
                .map_err(|e| open_error(target, e.to_string()))?
                .downcast::<gstreamer::Pipeline>()
                .map_err(|_| open_error(target, "failed to downcast to Pipeline".to_string()))?;

            let appsink = pipeline
                .by_name("sink")
                .ok_or_else(|| open_error(target, "failed to get appsink element".to_string()))?
                .downcast::<AppSink>()
                .map_err(|_| open_error(target, "failed to downcast to AppSink".to_string()))?;

            pipeline
                .set_state(gstreamer::State::Playing)
                .map_err(|e| open_error(target, e.to_string()))?;

            info!("Capture pipeline started for {}", target);

            Ok(Self {
                pipeline,
                appsink,
                target: target.clone(),
            })
        }
    }

    impl VideoSource for GstVideoSource {
        fn read_frame(&mut self) -> Result<FrameData, CaptureError> {
            let timeout = gstreamer::ClockTime::from_seconds(1);
            let sample = self
                .appsink
                .try_pull_sample(timeout)
                .ok_or(CaptureError::FrameGrab)?;

            let caps = sample.caps().ok_or_else(|| CaptureError::Stream {
                details: "sample without caps".to_string(),
            })?;
            let structure = caps.structure(0).ok_or_else(|| CaptureError::Stream {
                details: "caps without structure".to_string(),
            })?;

            let width: i32 = structure.get("width").map_err(|e| CaptureError::Stream {
                details: format!("missing width: {}", e),
            })?;
            let height: i32 = structure.get("height").map_err(|e| CaptureError::Stream {
                details: format!("missing height: {}", e),
            })?;

            let buffer = sample.buffer().ok_or_else(|| CaptureError::Stream {
                details: "sample without buffer".to_string(),
            })?;
            let map = buffer.map_readable().map_err(|e| CaptureError::Stream {
                details: format!("failed to map buffer: {}", e),
            })?;

            let frame = FrameData::new(
                width as u32,
                height as u32,
                map.as_slice().to_vec(),
                FrameFormat::Bgr24,
            );

            if !frame.validate_size() {
                return Err(CaptureError::Stream {
                    details: format!(
                        "unexpected buffer size {} for {}x{}",
                        frame.data.len(),
                        width,
                        height
                    ),
                });
            }

            Ok(frame)
        }
    }

    impl Drop for GstVideoSource {
        fn drop(&mut self) {
            if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop capture pipeline for {}: {}", self.target, e);
            }
        }
    }

    fn open_error(target: &VideoTarget, details: String) -> CaptureError {
        match target {
            VideoTarget::Device(index) => CaptureError::DeviceOpen {
                device: index.to_string(),
                details,
            },
            VideoTarget::Url(url) => CaptureError::UrlOpen {
                url: url.clone(),
                details,
            },
        }
    }
}
