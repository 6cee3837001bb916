use crate::geometry::NormPoint;

/// Identity-preserving state of one tracked object.
#[derive(Debug, Clone)]
pub struct TrackState {
    /// Monotonically increasing id, starting at 1.
    pub id: u64,
    /// Class name of the underlying detections.
    pub label: String,
    /// Normalized centroid from the latest assignment.
    pub centroid: NormPoint,
    /// Centroid from the previous assignment. Equal to `centroid` until the
    /// track has been updated at least once.
    pub prev_centroid: NormPoint,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
    /// Whether the centroid was inside the ROI at the last tick.
    pub inside_roi: bool,
    /// Entry timestamp of the current ROI visit; 0 while outside.
    pub entered_roi_ms: i64,
    /// One loitering alert per visit; cleared on ROI exit.
    pub loiter_alert_sent: bool,
    pub last_tripwire_alert_ms: i64,
}

impl TrackState {
    pub fn new(id: u64, label: String, centroid: NormPoint, now_ms: i64) -> Self {
        Self {
            id,
            label,
            centroid,
            prev_centroid: centroid,
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            inside_roi: false,
            entered_roi_ms: 0,
            loiter_alert_sent: false,
            last_tripwire_alert_ms: 0,
        }
    }

    pub fn age_ms(&self) -> i64 {
        self.last_seen_ms - self.first_seen_ms
    }
}
