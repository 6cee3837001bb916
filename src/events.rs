use crate::frame::FrameData;
use std::fmt;
use tokio::sync::mpsc;

/// Direction of a tripwire crossing relative to the directed line a -> b.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDirection {
    LeftToRight,
    RightToLeft,
}

impl fmt::Display for CrossingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossingDirection::LeftToRight => write!(f, "left to right"),
            CrossingDirection::RightToLeft => write!(f, "right to left"),
        }
    }
}

impl CrossingDirection {
    /// Short label used by motion-level tripwire alerts.
    pub fn motion_label(&self) -> &'static str {
        match self {
            CrossingDirection::LeftToRight => "forward",
            CrossingDirection::RightToLeft => "backward",
        }
    }
}

/// Analytics event payloads emitted by capture pipelines.
#[derive(Debug, Clone)]
pub enum EventKind {
    /// Frame-wide motion score exceeded the sensitivity threshold
    MotionScored { score: f64 },
    /// Motion score inside the ROI exceeded the sensitivity threshold
    RoiScored { score: f64 },
    /// The motion centroid crossed the tripwire
    MotionTripwire { direction: CrossingDirection },
    /// A tracked object crossed the tripwire
    TrackTripwire {
        track_id: u64,
        label: String,
        direction: CrossingDirection,
    },
    /// A tracked object stayed inside the ROI past the loitering threshold
    Loitering {
        track_id: u64,
        label: String,
        duration_ms: i64,
    },
    /// A frame copy captured alongside an alerting event
    SnapshotReady { frame: FrameData },
    /// A pipeline-local failure, surfaced but never alerted
    Error { message: String },
}

/// A tagged event from one capture pipeline, delivered in order to the
/// single alert writer.
#[derive(Debug, Clone)]
pub struct CameraEvent {
    pub camera_name: String,
    pub timestamp_ms: i64,
    pub kind: EventKind,
}

impl CameraEvent {
    pub fn new(camera_name: impl Into<String>, timestamp_ms: i64, kind: EventKind) -> Self {
        Self {
            camera_name: camera_name.into(),
            timestamp_ms,
            kind,
        }
    }

    /// Get the event type as a string for filtering and logging
    pub fn event_type(&self) -> &'static str {
        match &self.kind {
            EventKind::MotionScored { .. } => "motion",
            EventKind::RoiScored { .. } => "motion_roi",
            EventKind::MotionTripwire { .. } => "motion_tripwire",
            EventKind::TrackTripwire { .. } => "track_tripwire",
            EventKind::Loitering { .. } => "loitering",
            EventKind::SnapshotReady { .. } => "snapshot",
            EventKind::Error { .. } => "error",
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match &self.kind {
            EventKind::MotionScored { score } => {
                format!("Motion on {} (score {:.1})", self.camera_name, score)
            }
            EventKind::RoiScored { score } => {
                format!("ROI motion on {} (score {:.1})", self.camera_name, score)
            }
            EventKind::MotionTripwire { direction } => {
                format!("Tripwire crossed on {} ({})", self.camera_name, direction)
            }
            EventKind::TrackTripwire {
                track_id,
                label,
                direction,
            } => format!(
                "Track {} ({}) crossed tripwire on {} ({})",
                track_id, label, self.camera_name, direction
            ),
            EventKind::Loitering {
                track_id,
                label,
                duration_ms,
            } => format!(
                "Track {} ({}) loitering on {} for {}ms",
                track_id, label, self.camera_name, duration_ms
            ),
            EventKind::SnapshotReady { .. } => {
                format!("Snapshot captured on {}", self.camera_name)
            }
            EventKind::Error { message } => {
                format!("Error on {}: {}", self.camera_name, message)
            }
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<CameraEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CameraEvent>;

/// Create the multi-producer, single-consumer event channel shared by all
/// capture pipelines and drained by the alert writer.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
