use crate::alerts::log::SharedAlertLog;
use crate::events::{CameraEvent, EventKind, EventReceiver};
use tracing::{debug, warn};

/// The single consumer of the camera event channel.
///
/// Every mutation of the alert log funnels through this task, so alerts
/// keep the per-camera causal order of their source events.
pub struct AlertWriter {
    log: SharedAlertLog,
    events: EventReceiver,
}

impl AlertWriter {
    pub fn new(log: SharedAlertLog, events: EventReceiver) -> Self {
        Self { log, events }
    }

    /// Drain events until every sender is gone.
    pub async fn run(mut self) {
        debug!("Alert writer started");
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
        debug!("Alert writer stopped; event channel closed");
    }

    fn handle(&self, event: CameraEvent) {
        let camera = event.camera_name.as_str();
        let mut log = match self.log.write() {
            Ok(log) => log,
            Err(e) => {
                warn!("Alert log lock poisoned: {}", e);
                return;
            }
        };

        match event.kind {
            EventKind::MotionScored { score } => {
                log.add_motion_alert(camera, &format!("Motion detected (score: {:.1})", score));
            }
            EventKind::RoiScored { score } => {
                log.add_roi_motion_alert(camera, &format!("Motion in ROI (score: {:.1})", score));
            }
            EventKind::MotionTripwire { direction } => {
                log.add_tripwire_alert(
                    camera,
                    &format!("Tripwire crossed ({})", direction.motion_label()),
                );
            }
            EventKind::TrackTripwire {
                track_id,
                label,
                direction,
            } => {
                log.add_tripwire_alert(
                    camera,
                    &format!(
                        "Track {} ({}) crossed tripwire ({})",
                        track_id, label, direction
                    ),
                );
            }
            EventKind::Loitering {
                track_id,
                label,
                duration_ms,
            } => {
                log.add_loitering_alert(
                    camera,
                    &format!(
                        "Track {} ({}) loitering: stayed in ROI for {:.1} seconds",
                        track_id,
                        label,
                        duration_ms as f64 / 1000.0
                    ),
                );
            }
            EventKind::SnapshotReady { frame } => match frame.to_rgb_image() {
                Ok(image) => log.add_snapshot_alert(camera, image),
                Err(e) => warn!("Dropping snapshot from {}: {}", camera, e),
            },
            EventKind::Error { message } => {
                // Surfaced to the operator, never stored as an alert
                warn!("Camera {}: {}", camera, message);
            }
        }
    }
}
