mod centroid;
mod track;

pub use centroid::{
    CentroidTracker, TrackEvent, LINE_EPSILON, LOITERING_THRESHOLD_MS, MAX_TRACK_DISTANCE,
    TRACKED_LABELS, TRACK_TIMEOUT_MS, TRIPWIRE_ALERT_DEBOUNCE_MS,
};
pub use track::TrackState;
