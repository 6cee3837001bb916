use chrono::{DateTime, Local};
use image::RgbImage;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Alert log shared between the single writer task and HTTP readers.
pub type SharedAlertLog = Arc<RwLock<AlertLog>>;

/// Category of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Snapshot,
    Motion,
    MotionRoi,
    Tripwire,
    Loitering,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Snapshot => "snapshot",
            AlertKind::Motion => "motion",
            AlertKind::MotionRoi => "motion_roi",
            AlertKind::Tripwire => "tripwire",
            AlertKind::Loitering => "loitering",
        }
    }
}

/// One entry in the alert log.
#[derive(Debug, Clone)]
pub struct Alert {
    /// Sortable id: millisecond timestamp plus a session-unique sequence.
    pub id: String,
    pub timestamp: DateTime<Local>,
    pub camera_name: String,
    pub kind: AlertKind,
    pub message: String,
    /// Path of the exported snapshot; empty until exported.
    pub snapshot_path: String,
    /// In-memory snapshot, present only for snapshot alerts.
    pub snapshot_image: Option<RgbImage>,
}

impl Alert {
    pub fn has_image(&self) -> bool {
        self.snapshot_image.is_some()
    }
}

/// Insertion-ordered alert store.
///
/// All mutation happens on the single writer; readers work on clones taken
/// under the shared lock. Indices are session-local and shift on removal.
pub struct AlertLog {
    alerts: Vec<Alert>,
    id_sequence: u64,
}

impl AlertLog {
    pub fn new() -> Self {
        Self {
            alerts: Vec::new(),
            id_sequence: 0,
        }
    }

    pub fn shared() -> SharedAlertLog {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Alert> {
        self.alerts.get(index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Alert> {
        self.alerts.get_mut(index)
    }

    /// Millisecond timestamp with a monotonic sequence suffix, so bursts
    /// within one millisecond still get unique, sortable ids.
    fn generate_id(&mut self, timestamp: DateTime<Local>) -> String {
        self.id_sequence += 1;
        format!(
            "{}{:04}",
            timestamp.format("%Y%m%d%H%M%S%3f"),
            self.id_sequence
        )
    }

    fn add(
        &mut self,
        kind: AlertKind,
        camera_name: &str,
        message: String,
        snapshot_path: String,
        snapshot_image: Option<RgbImage>,
    ) {
        let timestamp = Local::now();
        let alert = Alert {
            id: self.generate_id(timestamp),
            timestamp,
            camera_name: camera_name.to_string(),
            kind,
            message,
            snapshot_path,
            snapshot_image,
        };

        debug!(
            "Alert added: {} {} {}",
            alert.kind.as_str(),
            alert.camera_name,
            alert.message
        );
        self.alerts.push(alert);
    }

    /// Snapshot alert holding the frame in memory until exported.
    pub fn add_snapshot_alert(&mut self, camera_name: &str, image: RgbImage) {
        self.add(
            AlertKind::Snapshot,
            camera_name,
            "Snapshot captured (unsaved)".to_string(),
            String::new(),
            Some(image),
        );
    }

    pub fn add_motion_alert(&mut self, camera_name: &str, message: &str) {
        let message = if message.is_empty() {
            "Motion detected".to_string()
        } else {
            message.to_string()
        };
        self.add(AlertKind::Motion, camera_name, message, String::new(), None);
    }

    pub fn add_roi_motion_alert(&mut self, camera_name: &str, message: &str) {
        let message = if message.is_empty() {
            "Motion in ROI".to_string()
        } else {
            message.to_string()
        };
        self.add(
            AlertKind::MotionRoi,
            camera_name,
            message,
            String::new(),
            None,
        );
    }

    pub fn add_tripwire_alert(&mut self, camera_name: &str, message: &str) {
        let message = if message.is_empty() {
            "Tripwire crossed".to_string()
        } else {
            message.to_string()
        };
        self.add(
            AlertKind::Tripwire,
            camera_name,
            message,
            String::new(),
            None,
        );
    }

    pub fn add_loitering_alert(&mut self, camera_name: &str, message: &str) {
        let message = if message.is_empty() {
            "Loitering detected".to_string()
        } else {
            message.to_string()
        };
        self.add(
            AlertKind::Loitering,
            camera_name,
            message,
            String::new(),
            None,
        );
    }

    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.alerts.len() {
            return false;
        }
        self.alerts.remove(index);
        debug!("Alert removed at index {}", index);
        true
    }

    /// Remove several alerts at once. Out-of-range and duplicate indices
    /// are silently dropped; removal runs highest-first so the remaining
    /// indices stay valid. Returns the number of alerts removed.
    pub fn remove_many(&mut self, indices: &[usize]) -> usize {
        let mut sanitized: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.alerts.len())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sanitized.sort_unstable_by(|a, b| b.cmp(a));

        for &index in &sanitized {
            self.alerts.remove(index);
        }

        debug!("Removed {} alerts", sanitized.len());
        sanitized.len()
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    /// Keep the order of the given indices, dropping anything out of range.
    pub(crate) fn select(&self, indices: &[usize]) -> Vec<&Alert> {
        indices
            .iter()
            .filter_map(|&i| self.alerts.get(i))
            .collect()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log(n: usize) -> AlertLog {
        let mut log = AlertLog::new();
        for i in 0..n {
            log.add_motion_alert("Front Door", &format!("Motion detected (score: {}.0)", i));
        }
        log
    }

    #[test]
    fn test_count_matches_insertions() {
        let log = sample_log(5);
        assert_eq!(log.len(), 5);
        assert_eq!(log.iter().count(), 5);
        for i in 0..5 {
            assert!(log.get(i).is_some());
        }
        assert!(log.get(5).is_none());
    }

    #[test]
    fn test_ids_are_unique_and_monotonic() {
        let mut log = AlertLog::new();
        for _ in 0..50 {
            log.add_motion_alert("Cam", "");
        }

        let ids: Vec<&String> = log.iter().map(|a| &a.id).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_default_messages() {
        let mut log = AlertLog::new();
        log.add_motion_alert("Cam", "");
        log.add_roi_motion_alert("Cam", "");
        log.add_tripwire_alert("Cam", "");
        log.add_loitering_alert("Cam", "");

        let messages: Vec<&str> = log.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Motion detected",
                "Motion in ROI",
                "Tripwire crossed",
                "Loitering detected"
            ]
        );
    }

    #[test]
    fn test_snapshot_alert_has_image() {
        let mut log = AlertLog::new();
        log.add_snapshot_alert("Cam", RgbImage::new(4, 4));
        log.add_motion_alert("Cam", "");

        assert!(log.get(0).unwrap().has_image());
        assert_eq!(log.get(0).unwrap().kind, AlertKind::Snapshot);
        assert!(!log.get(1).unwrap().has_image());
    }

    #[test]
    fn test_remove_at() {
        let mut log = sample_log(3);

        assert!(log.remove_at(1));
        assert_eq!(log.len(), 2);
        assert!(log.get(0).unwrap().message.contains("0.0"));
        assert!(log.get(1).unwrap().message.contains("2.0"));

        assert!(!log.remove_at(5));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_remove_many_preserves_survivor_order() {
        let mut log = sample_log(6);

        let removed = log.remove_many(&[4, 1, 3]);
        assert_eq!(removed, 3);
        assert_eq!(log.len(), 3);

        let surviving: Vec<&str> = log.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            surviving,
            vec![
                "Motion detected (score: 0.0)",
                "Motion detected (score: 2.0)",
                "Motion detected (score: 5.0)"
            ]
        );
    }

    #[test]
    fn test_remove_many_sanitizes_input() {
        let mut log = sample_log(4);

        // Duplicates and out-of-range entries are dropped silently
        let removed = log.remove_many(&[2, 2, 99, 0]);
        assert_eq!(removed, 2);
        assert_eq!(log.len(), 2);

        assert_eq!(log.remove_many(&[]), 0);
        assert_eq!(log.remove_many(&[100, 200]), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut log = sample_log(3);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_find_by_id() {
        let log = sample_log(3);
        let id = log.get(1).unwrap().id.clone();

        assert!(log.find_by_id(&id).is_some());
        assert!(log.find_by_id("20000101000000000").is_none());
    }

    #[test]
    fn test_select_keeps_given_order() {
        let log = sample_log(4);
        let selected = log.select(&[3, 0, 99]);

        assert_eq!(selected.len(), 2);
        assert!(selected[0].message.contains("3.0"));
        assert!(selected[1].message.contains("0.0"));
    }
}
