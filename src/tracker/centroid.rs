use crate::detector::Detection;
use crate::events::CrossingDirection;
use crate::geometry::{point_in_polygon, side_of_line, NormPoint};
use crate::tracker::track::TrackState;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Maximum normalized centroid distance for associating a detection to an
/// existing track.
pub const MAX_TRACK_DISTANCE: f64 = 0.10;

/// Tracks unseen for longer than this are evicted.
pub const TRACK_TIMEOUT_MS: i64 = 2000;

/// Minimum spacing between tripwire alerts for the same track.
pub const TRIPWIRE_ALERT_DEBOUNCE_MS: i64 = 2000;

/// Continuous ROI presence required before a loitering alert.
pub const LOITERING_THRESHOLD_MS: i64 = 8000;

/// Side values this close to the line count as colinear.
pub const LINE_EPSILON: f64 = 1e-4;

/// Only these classes are tracked; everything else is dropped before
/// association.
pub const TRACKED_LABELS: &[&str] = &["person", "car", "bicycle", "dog", "cat"];

/// Track-level events derived during an update tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    CrossedTripwire {
        track_id: u64,
        label: String,
        direction: CrossingDirection,
    },
    Loitering {
        track_id: u64,
        label: String,
        duration_ms: i64,
    },
}

/// Greedy nearest-centroid tracker.
///
/// Runs once per detector tick. Associates detections to tracks by
/// normalized Euclidean distance, maintains per-track ROI state and
/// loitering timers, and detects per-track tripwire crossings.
pub struct CentroidTracker {
    tracks: BTreeMap<u64, TrackState>,
    next_track_id: u64,
}

impl CentroidTracker {
    pub fn new() -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_track_id: 1,
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackState> {
        self.tracks.values()
    }

    /// Process one detector tick.
    ///
    /// `roi` with fewer than three vertices means no ROI; `tripwire` of None
    /// disables crossing checks. Returns the events raised by this tick.
    pub fn update(
        &mut self,
        detections: &[Detection],
        frame_width: u32,
        frame_height: u32,
        roi: &[NormPoint],
        tripwire: Option<(NormPoint, NormPoint)>,
        now_ms: i64,
    ) -> Vec<TrackEvent> {
        let mut updated_ids = BTreeSet::new();

        for det in detections {
            let label = det.label();
            if !TRACKED_LABELS.contains(&label) {
                continue;
            }

            let (cx, cy) = det.bbox.center();
            let centroid = NormPoint::new(cx / frame_width as f64, cy / frame_height as f64);

            // Nearest existing track within range; ascending id order makes
            // the first track win ties.
            let mut best_track_id = None;
            let mut best_distance = MAX_TRACK_DISTANCE;
            for (id, track) in &self.tracks {
                let dist = track.centroid.distance_to(&centroid);
                if dist < best_distance {
                    best_distance = dist;
                    best_track_id = Some(*id);
                }
            }

            match best_track_id {
                Some(id) => {
                    let track = self.tracks.get_mut(&id).unwrap();
                    track.prev_centroid = track.centroid;
                    track.centroid = centroid;
                    track.last_seen_ms = now_ms;
                    updated_ids.insert(id);
                }
                None => {
                    let id = self.next_track_id;
                    self.next_track_id += 1;
                    self.tracks
                        .insert(id, TrackState::new(id, label.to_string(), centroid, now_ms));
                    updated_ids.insert(id);
                }
            }
        }

        let mut events = Vec::new();

        for id in &updated_ids {
            if let Some(track) = self.tracks.get_mut(id) {
                update_roi_status(track, roi, now_ms);
                if let Some(event) = check_loitering(track, now_ms) {
                    events.push(event);
                }
            }
        }

        if let Some((a, b)) = tripwire {
            for id in &updated_ids {
                if let Some(track) = self.tracks.get_mut(id) {
                    if let Some(event) = check_line_crossing(track, &a, &b, now_ms) {
                        events.push(event);
                    }
                }
            }
        }

        self.evict_stale(now_ms);

        if !self.tracks.is_empty() {
            self.log_tracks();
        }

        events
    }

    fn evict_stale(&mut self, now_ms: i64) {
        self.tracks
            .retain(|_, track| now_ms - track.last_seen_ms <= TRACK_TIMEOUT_MS);
    }

    fn log_tracks(&self) {
        let summary: Vec<String> = self
            .tracks
            .values()
            .map(|t| {
                format!(
                    "Track {}: {} @ ({:.3}, {:.3}) age={}ms roi={}",
                    t.id,
                    t.label,
                    t.centroid.x,
                    t.centroid.y,
                    t.age_ms(),
                    if t.inside_roi { "yes" } else { "no" }
                )
            })
            .collect();
        debug!("[Tracking] {}", summary.join(" | "));
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn update_roi_status(track: &mut TrackState, roi: &[NormPoint], now_ms: i64) {
    let now_inside = point_in_polygon(&track.centroid, roi);

    if now_inside {
        if !track.inside_roi {
            track.entered_roi_ms = now_ms;
            debug!("[ROI Entry] Track {} entered ROI at {}", track.id, now_ms);
        }
    } else if track.inside_roi {
        debug!("[ROI Exit] Track {} exited ROI", track.id);
        track.entered_roi_ms = 0;
        track.loiter_alert_sent = false;
    }

    track.inside_roi = now_inside;
}

fn check_loitering(track: &mut TrackState, now_ms: i64) -> Option<TrackEvent> {
    if !track.inside_roi || track.loiter_alert_sent {
        return None;
    }

    let duration_ms = now_ms - track.entered_roi_ms;
    if duration_ms < LOITERING_THRESHOLD_MS {
        return None;
    }

    debug!(
        "[Loitering] Track {} ({}) stayed {}ms",
        track.id, track.label, duration_ms
    );
    track.loiter_alert_sent = true;

    Some(TrackEvent::Loitering {
        track_id: track.id,
        label: track.label.clone(),
        duration_ms,
    })
}

fn check_line_crossing(
    track: &mut TrackState,
    a: &NormPoint,
    b: &NormPoint,
    now_ms: i64,
) -> Option<TrackEvent> {
    // First assignment leaves prev == current; nothing to cross yet
    if track.centroid == track.prev_centroid {
        return None;
    }

    if now_ms - track.last_tripwire_alert_ms < TRIPWIRE_ALERT_DEBOUNCE_MS {
        return None;
    }

    let prev_side = side_of_line(&track.prev_centroid, a, b);
    let curr_side = side_of_line(&track.centroid, a, b);

    if prev_side.abs() <= LINE_EPSILON
        || curr_side.abs() <= LINE_EPSILON
        || prev_side * curr_side >= 0.0
    {
        return None;
    }

    let direction = if prev_side < 0.0 && curr_side > 0.0 {
        CrossingDirection::LeftToRight
    } else {
        CrossingDirection::RightToLeft
    };

    debug!(
        "[Line Crossing] Track {} ({}) crossed tripwire: {} | prev {:.6} curr {:.6}",
        track.id, track.label, direction, prev_side, curr_side
    );
    track.last_tripwire_alert_ms = now_ms;

    Some(TrackEvent::CrossedTripwire {
        track_id: track.id,
        label: track.label.clone(),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PixelBox;

    const FRAME_W: u32 = 640;
    const FRAME_H: u32 = 480;

    /// Detection whose bbox centers on the given normalized point.
    fn detection_at(class_id: usize, x: f64, y: f64) -> Detection {
        let cx = x * FRAME_W as f64;
        let cy = y * FRAME_H as f64;
        Detection {
            class_id,
            score: 0.9,
            bbox: PixelBox::new(cx as i32 - 20, cy as i32 - 20, 40, 40),
        }
    }

    fn person_at(x: f64, y: f64) -> Detection {
        detection_at(0, x, y)
    }

    fn centered_roi() -> Vec<NormPoint> {
        vec![
            NormPoint::new(0.25, 0.25),
            NormPoint::new(0.75, 0.25),
            NormPoint::new(0.75, 0.75),
            NormPoint::new(0.25, 0.75),
        ]
    }

    fn vertical_tripwire() -> Option<(NormPoint, NormPoint)> {
        Some((NormPoint::new(0.5, 0.0), NormPoint::new(0.5, 1.0)))
    }

    #[test]
    fn test_untracked_classes_are_dropped() {
        let mut tracker = CentroidTracker::new();
        // class 39 is "bottle"
        let events = tracker.update(
            &[detection_at(39, 0.5, 0.5)],
            FRAME_W,
            FRAME_H,
            &[],
            None,
            1000,
        );

        assert!(events.is_empty());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_track_creation_and_association() {
        let mut tracker = CentroidTracker::new();

        tracker.update(&[person_at(0.3, 0.3)], FRAME_W, FRAME_H, &[], None, 1000);
        assert_eq!(tracker.track_count(), 1);
        let first_id = tracker.tracks().next().unwrap().id;
        assert_eq!(first_id, 1);

        // Nearby detection updates the same track
        tracker.update(&[person_at(0.33, 0.3)], FRAME_W, FRAME_H, &[], None, 1100);
        assert_eq!(tracker.track_count(), 1);
        let track = tracker.tracks().next().unwrap();
        assert_eq!(track.id, 1);
        assert!((track.centroid.x - 0.33).abs() < 0.01);
        assert!((track.prev_centroid.x - 0.3).abs() < 0.01);

        // Distant detection spawns a new track with the next id
        tracker.update(&[person_at(0.8, 0.8)], FRAME_W, FRAME_H, &[], None, 1200);
        assert_eq!(tracker.track_count(), 2);
        assert!(tracker.tracks().any(|t| t.id == 2));
    }

    #[test]
    fn test_stale_tracks_evicted() {
        let mut tracker = CentroidTracker::new();

        tracker.update(&[person_at(0.3, 0.3)], FRAME_W, FRAME_H, &[], None, 1000);
        assert_eq!(tracker.track_count(), 1);

        // Within the timeout the track survives an empty tick
        tracker.update(&[], FRAME_W, FRAME_H, &[], None, 2500);
        assert_eq!(tracker.track_count(), 1);

        tracker.update(&[], FRAME_W, FRAME_H, &[], None, 3001);
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_roi_state_matches_containment_after_tick() {
        let mut tracker = CentroidTracker::new();
        let roi = centered_roi();

        tracker.update(&[person_at(0.5, 0.5)], FRAME_W, FRAME_H, &roi, None, 1000);
        let track = tracker.tracks().next().unwrap();
        assert_eq!(
            track.inside_roi,
            point_in_polygon(&track.centroid, &roi)
        );
        assert!(track.inside_roi);
        assert_eq!(track.entered_roi_ms, 1000);

        tracker.update(&[person_at(0.45, 0.5)], FRAME_W, FRAME_H, &roi, None, 1100);
        let track = tracker.tracks().next().unwrap();
        assert!(track.inside_roi);
        // Entry timestamp is preserved while inside
        assert_eq!(track.entered_roi_ms, 1000);

        // Walk out of the ROI in association-sized steps
        for (step, y) in [0.42, 0.34, 0.26, 0.18].iter().enumerate() {
            tracker.update(
                &[person_at(0.45, *y)],
                FRAME_W,
                FRAME_H,
                &roi,
                None,
                1200 + step as i64 * 100,
            );
        }

        assert_eq!(tracker.track_count(), 1);
        let track = tracker.tracks().next().unwrap();
        assert_eq!(
            track.inside_roi,
            point_in_polygon(&track.centroid, &roi)
        );
        assert!(!track.inside_roi);
        assert_eq!(track.entered_roi_ms, 0);
    }

    #[test]
    fn test_loitering_fires_once_per_visit() {
        let mut tracker = CentroidTracker::new();
        let roi = centered_roi();

        // Held in place across ticks spanning the loitering threshold
        let mut loiter_events = 0;
        let mut duration_seen = 0;
        for step in 0..12 {
            let now = 1000 + step * 1000;
            let events = tracker.update(
                &[person_at(0.5, 0.5)],
                FRAME_W,
                FRAME_H,
                &roi,
                None,
                now,
            );
            for event in events {
                if let TrackEvent::Loitering { duration_ms, .. } = event {
                    loiter_events += 1;
                    duration_seen = duration_ms;
                }
            }
        }

        assert_eq!(loiter_events, 1);
        assert!(duration_seen >= LOITERING_THRESHOLD_MS);
    }

    #[test]
    fn test_loitering_rearms_after_roi_exit() {
        let mut tracker = CentroidTracker::new();
        let roi = centered_roi();

        let mut now = 1000;
        for _ in 0..10 {
            tracker.update(&[person_at(0.5, 0.5)], FRAME_W, FRAME_H, &roi, None, now);
            now += 1000;
        }
        let track = tracker.tracks().next().unwrap();
        assert!(track.loiter_alert_sent);

        // Step outside in association-sized moves, then back in; the timer
        // and alert flag reset
        for y in [0.42, 0.34, 0.26, 0.18] {
            tracker.update(&[person_at(0.5, y)], FRAME_W, FRAME_H, &roi, None, now);
            now += 200;
        }
        tracker.update(&[person_at(0.5, 0.26)], FRAME_W, FRAME_H, &roi, None, now);

        let track = tracker.tracks().next().unwrap();
        assert_eq!(tracker.track_count(), 1);
        assert!(track.inside_roi);
        assert!(!track.loiter_alert_sent);
        assert_eq!(track.entered_roi_ms, now);

        let mut second_visit_events = 0;
        for _ in 0..10 {
            now += 1000;
            let events =
                tracker.update(&[person_at(0.5, 0.3)], FRAME_W, FRAME_H, &roi, None, now);
            second_visit_events += events
                .iter()
                .filter(|e| matches!(e, TrackEvent::Loitering { .. }))
                .count();
        }
        assert_eq!(second_visit_events, 1);
    }

    #[test]
    fn test_tripwire_crossing_direction_and_debounce() {
        let mut tracker = CentroidTracker::new();
        let wire = vertical_tripwire();

        // First tick establishes the track left of the wire
        let events = tracker.update(&[person_at(0.45, 0.5)], FRAME_W, FRAME_H, &[], wire, 1000);
        assert!(events.is_empty());

        // Crossing left to right
        let events = tracker.update(&[person_at(0.54, 0.5)], FRAME_W, FRAME_H, &[], wire, 1200);
        assert_eq!(events.len(), 1);
        match &events[0] {
            TrackEvent::CrossedTripwire {
                track_id,
                label,
                direction,
            } => {
                assert_eq!(*track_id, 1);
                assert_eq!(label, "person");
                assert_eq!(*direction, CrossingDirection::LeftToRight);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        // Crossing back within the debounce window stays silent
        let events = tracker.update(&[person_at(0.45, 0.5)], FRAME_W, FRAME_H, &[], wire, 1500);
        assert!(events.is_empty());

        // Keep the track alive until the debounce expires, then cross again
        let events = tracker.update(&[person_at(0.46, 0.5)], FRAME_W, FRAME_H, &[], wire, 2400);
        assert!(events.is_empty());
        let events = tracker.update(&[person_at(0.54, 0.5)], FRAME_W, FRAME_H, &[], wire, 3300);
        assert_eq!(events.len(), 1);
        match &events[0] {
            TrackEvent::CrossedTripwire { direction, .. } => {
                assert_eq!(*direction, CrossingDirection::LeftToRight);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_reverse_crossing_direction() {
        let mut tracker = CentroidTracker::new();
        let wire = vertical_tripwire();

        tracker.update(&[person_at(0.54, 0.5)], FRAME_W, FRAME_H, &[], wire, 1000);
        let events = tracker.update(&[person_at(0.46, 0.5)], FRAME_W, FRAME_H, &[], wire, 1200);

        assert_eq!(events.len(), 1);
        match &events[0] {
            TrackEvent::CrossedTripwire { direction, .. } => {
                assert_eq!(*direction, CrossingDirection::RightToLeft);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_consecutive_crossings_respect_debounce_spacing() {
        let mut tracker = CentroidTracker::new();
        let wire = vertical_tripwire();

        let mut crossing_times = Vec::new();
        let mut now = 1000;
        let mut left = true;
        for _ in 0..20 {
            let x = if left { 0.46 } else { 0.54 };
            left = !left;
            let events = tracker.update(&[person_at(x, 0.5)], FRAME_W, FRAME_H, &[], wire, now);
            if events
                .iter()
                .any(|e| matches!(e, TrackEvent::CrossedTripwire { .. }))
            {
                crossing_times.push(now);
            }
            now += 500;
        }

        assert!(crossing_times.len() >= 2);
        for pair in crossing_times.windows(2) {
            assert!(pair[1] - pair[0] >= TRIPWIRE_ALERT_DEBOUNCE_MS);
        }
    }

    #[test]
    fn test_stationary_track_never_crosses() {
        let mut tracker = CentroidTracker::new();
        let wire = vertical_tripwire();

        for step in 0..5 {
            let events = tracker.update(
                &[person_at(0.5, 0.5)],
                FRAME_W,
                FRAME_H,
                &[],
                wire,
                1000 + step * 200,
            );
            assert!(events.is_empty());
        }
    }
}
