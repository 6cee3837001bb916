use crate::capture::{AnalyticsGeometry, AnalyticsSettings, CameraPipeline, VideoTarget};
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::geometry::NormPoint;
use crate::supervisor::persist::{
    load_camera_configs, save_camera_configs, CameraSlotConfig, SourceKind,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Fixed number of camera slots.
pub const MAX_CAMERA_SLOTS: usize = 4;

/// Owns the four camera slots and their pipelines.
///
/// Holds the canonical normalized ROI/tripwire state, persists it on every
/// change and pushes it into the live pipelines. Slot accessors are
/// 1-based, matching how slots are presented to operators.
pub struct CameraSupervisor {
    config_path: PathBuf,
    configs: Mutex<Vec<CameraSlotConfig>>,
    pipelines: Vec<Option<Arc<CameraPipeline>>>,
}

impl CameraSupervisor {
    /// Load cameras.json (or fall back to a single default camera) and
    /// create a pipeline for each enabled slot.
    pub fn new(app: &AppConfig, events: EventSender) -> Arc<Self> {
        let config_path = PathBuf::from(&app.cameras.config_path);

        let configs = match load_camera_configs(&config_path) {
            Ok(configs) if !configs.is_empty() => configs,
            Ok(_) => {
                warn!("Camera configuration is empty, using defaults");
                vec![default_camera()]
            }
            Err(e) => {
                warn!("Failed to load camera configuration ({}), using defaults", e);
                vec![default_camera()]
            }
        };

        Self::from_configs(configs, config_path, app, events)
    }

    /// Build a supervisor from explicit slot configs.
    pub fn from_configs(
        configs: Vec<CameraSlotConfig>,
        config_path: PathBuf,
        app: &AppConfig,
        events: EventSender,
    ) -> Arc<Self> {
        let mut pipelines: Vec<Option<Arc<CameraPipeline>>> = Vec::with_capacity(MAX_CAMERA_SLOTS);

        for slot in 0..MAX_CAMERA_SLOTS {
            let pipeline = configs.get(slot).filter(|c| c.enabled).map(|config| {
                let settings = AnalyticsSettings {
                    motion_enabled: app.motion.enabled,
                    motion_sensitivity: app.motion.sensitivity,
                    ai_enabled: app.detector.enabled,
                    ai_confidence_threshold: app.detector.confidence_threshold,
                    auto_snapshot_on_motion: app.snapshots.on_motion,
                    auto_snapshot_on_roi: app.snapshots.on_roi,
                    auto_snapshot_on_tripwire: app.snapshots.on_tripwire,
                };
                let geometry = AnalyticsGeometry {
                    roi: config.roi_points.clone(),
                    tripwire: config.tripwire,
                };

                CameraPipeline::new(
                    config.id.clone(),
                    config.name.clone(),
                    video_target(config),
                    settings,
                    geometry,
                    app.detector.clone(),
                    events.clone(),
                )
            });

            if pipeline.is_some() {
                info!(
                    "Slot {}: {} enabled",
                    slot + 1,
                    configs[slot].name
                );
            }
            pipelines.push(pipeline);
        }

        Arc::new(Self {
            config_path,
            configs: Mutex::new(configs),
            pipelines,
        })
    }

    /// Start every enabled pipeline.
    pub fn start_all(&self) {
        for pipeline in self.pipelines.iter().flatten() {
            pipeline.start();
        }
    }

    /// Stop every pipeline and wait for the capture threads to exit.
    pub fn stop_all(&self) {
        for pipeline in self.pipelines.iter().flatten() {
            pipeline.stop();
        }
    }

    /// Pipeline for a 1-based slot index.
    pub fn pipeline(&self, index: usize) -> Option<Arc<CameraPipeline>> {
        if index == 0 {
            return None;
        }
        self.pipelines.get(index - 1).and_then(|p| p.clone())
    }

    pub fn camera_available(&self, index: usize) -> bool {
        self.pipeline(index).is_some()
    }

    pub fn camera_name(&self, index: usize) -> String {
        self.with_config(index, |c| c.name.clone())
            .unwrap_or_else(|| format!("Camera {}", index))
    }

    pub fn camera_kind(&self, index: usize) -> String {
        self.with_config(index, |c| c.kind.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn camera_source(&self, index: usize) -> String {
        self.with_config(index, |c| c.source.clone())
            .unwrap_or_default()
    }

    pub fn roi_points(&self, index: usize) -> Vec<NormPoint> {
        self.with_config(index, |c| c.roi_points.clone())
            .unwrap_or_default()
    }

    pub fn has_roi(&self, index: usize) -> bool {
        self.with_config(index, |c| c.has_roi()).unwrap_or(false)
    }

    pub fn tripwire(&self, index: usize) -> Option<(NormPoint, NormPoint)> {
        self.with_config(index, |c| c.tripwire).flatten()
    }

    pub fn has_tripwire(&self, index: usize) -> bool {
        self.tripwire(index).is_some()
    }

    /// Set the ROI polygon for a slot, persist and propagate.
    pub fn set_roi(&self, index: usize, points: Vec<NormPoint>) {
        let snapshot = {
            let mut configs = self.configs.lock().unwrap();
            let Some(config) = slot_mut(&mut configs, index) else {
                return;
            };
            config.roi_points = points.clone();
            configs.clone()
        };

        if let Some(pipeline) = self.pipeline(index) {
            pipeline.set_roi(points);
        }

        info!(
            "ROI set for camera {} with {} points",
            index,
            self.roi_points(index).len()
        );
        self.persist(&snapshot);
    }

    pub fn clear_roi(&self, index: usize) {
        let snapshot = {
            let mut configs = self.configs.lock().unwrap();
            let Some(config) = slot_mut(&mut configs, index) else {
                return;
            };
            config.roi_points.clear();
            configs.clone()
        };

        if let Some(pipeline) = self.pipeline(index) {
            pipeline.clear_roi();
        }

        info!("ROI cleared for camera {}", index);
        self.persist(&snapshot);
    }

    /// Set the tripwire for a slot, persist and propagate.
    pub fn set_tripwire(&self, index: usize, start: NormPoint, end: NormPoint) {
        let snapshot = {
            let mut configs = self.configs.lock().unwrap();
            let Some(config) = slot_mut(&mut configs, index) else {
                return;
            };
            config.tripwire = Some((start, end));
            configs.clone()
        };

        if let Some(pipeline) = self.pipeline(index) {
            pipeline.set_tripwire(start, end);
        }

        info!(
            "Tripwire set for camera {} from ({:.3}, {:.3}) to ({:.3}, {:.3})",
            index, start.x, start.y, end.x, end.y
        );
        self.persist(&snapshot);
    }

    pub fn clear_tripwire(&self, index: usize) {
        let snapshot = {
            let mut configs = self.configs.lock().unwrap();
            let Some(config) = slot_mut(&mut configs, index) else {
                return;
            };
            config.tripwire = None;
            configs.clone()
        };

        if let Some(pipeline) = self.pipeline(index) {
            pipeline.clear_tripwire();
        }

        info!("Tripwire cleared for camera {}", index);
        self.persist(&snapshot);
    }

    fn with_config<T>(&self, index: usize, read: impl FnOnce(&CameraSlotConfig) -> T) -> Option<T> {
        if index == 0 {
            return None;
        }
        self.configs.lock().unwrap().get(index - 1).map(read)
    }

    /// Persistence failures are logged; in-memory state stays authoritative
    /// and the next successful write heals the file.
    fn persist(&self, configs: &[CameraSlotConfig]) {
        if let Err(e) = save_camera_configs(&self.config_path, configs) {
            warn!(
                "Failed to persist camera configuration to {}: {}",
                self.config_path.display(),
                e
            );
        }
    }
}

fn default_camera() -> CameraSlotConfig {
    CameraSlotConfig {
        id: "cam1".to_string(),
        name: "Default Camera".to_string(),
        kind: SourceKind::Usb,
        source: "0".to_string(),
        enabled: true,
        roi_points: Vec::new(),
        tripwire: None,
    }
}

fn video_target(config: &CameraSlotConfig) -> VideoTarget {
    match config.kind {
        SourceKind::Usb => VideoTarget::Device(config.source.parse().unwrap_or(0)),
        SourceKind::Rtsp | SourceKind::Ip => VideoTarget::Url(config.source.clone()),
    }
}

fn slot_mut(configs: &mut [CameraSlotConfig], index: usize) -> Option<&mut CameraSlotConfig> {
    if index == 0 {
        return None;
    }
    configs.get_mut(index - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use tempfile::TempDir;

    fn test_app_config() -> AppConfig {
        let mut app = AppConfig::default();
        app.detector.enabled = false;
        app
    }

    fn two_camera_configs() -> Vec<CameraSlotConfig> {
        vec![
            CameraSlotConfig {
                id: "cam1".to_string(),
                name: "Front Door".to_string(),
                kind: SourceKind::Usb,
                source: "0".to_string(),
                enabled: true,
                roi_points: Vec::new(),
                tripwire: None,
            },
            CameraSlotConfig {
                id: "cam2".to_string(),
                name: "Back Yard".to_string(),
                kind: SourceKind::Rtsp,
                source: "rtsp://10.0.0.5/stream".to_string(),
                enabled: true,
                roi_points: Vec::new(),
                tripwire: None,
            },
        ]
    }

    fn supervisor_with(
        dir: &TempDir,
        configs: Vec<CameraSlotConfig>,
    ) -> Arc<CameraSupervisor> {
        let (events, _rx) = event_channel();
        CameraSupervisor::from_configs(
            configs,
            dir.path().join("cameras.json"),
            &test_app_config(),
            events,
        )
    }

    #[test]
    fn test_slot_accessors_one_based() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_with(&dir, two_camera_configs());

        assert!(supervisor.camera_available(1));
        assert!(supervisor.camera_available(2));
        assert!(!supervisor.camera_available(3));
        assert!(!supervisor.camera_available(0));

        assert_eq!(supervisor.camera_name(1), "Front Door");
        assert_eq!(supervisor.camera_kind(2), "rtsp");
        assert_eq!(supervisor.camera_source(2), "rtsp://10.0.0.5/stream");

        // Fallbacks for unknown slots
        assert_eq!(supervisor.camera_name(4), "Camera 4");
        assert_eq!(supervisor.camera_kind(4), "unknown");
        assert_eq!(supervisor.camera_source(4), "");
    }

    #[test]
    fn test_disabled_slot_has_no_pipeline() {
        let dir = TempDir::new().unwrap();
        let mut configs = two_camera_configs();
        configs[1].enabled = false;

        let supervisor = supervisor_with(&dir, configs);

        assert!(supervisor.camera_available(1));
        assert!(!supervisor.camera_available(2));
        // The config itself stays addressable for the disabled slot
        assert_eq!(supervisor.camera_name(2), "Back Yard");
    }

    #[test]
    fn test_set_roi_persists_and_propagates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cameras.json");
        let supervisor = supervisor_with(&dir, two_camera_configs());

        let points = vec![
            NormPoint::new(0.2, 0.2),
            NormPoint::new(0.8, 0.2),
            NormPoint::new(0.5, 0.8),
        ];
        supervisor.set_roi(1, points.clone());

        assert!(supervisor.has_roi(1));
        assert_eq!(supervisor.roi_points(1), points);

        let reloaded = load_camera_configs(&path).unwrap();
        assert_eq!(reloaded[0].roi_points, points);
        assert!(reloaded[1].roi_points.is_empty());

        supervisor.clear_roi(1);
        assert!(!supervisor.has_roi(1));
        let reloaded = load_camera_configs(&path).unwrap();
        assert!(reloaded[0].roi_points.is_empty());
    }

    #[test]
    fn test_set_tripwire_persists_and_clears() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cameras.json");
        let supervisor = supervisor_with(&dir, two_camera_configs());

        let start = NormPoint::new(0.5, 0.0);
        let end = NormPoint::new(0.5, 1.0);
        supervisor.set_tripwire(2, start, end);

        assert!(supervisor.has_tripwire(2));
        assert_eq!(supervisor.tripwire(2), Some((start, end)));

        let reloaded = load_camera_configs(&path).unwrap();
        assert_eq!(reloaded[1].tripwire, Some((start, end)));

        supervisor.clear_tripwire(2);
        assert!(!supervisor.has_tripwire(2));
        let reloaded = load_camera_configs(&path).unwrap();
        assert!(reloaded[1].tripwire.is_none());
    }

    #[test]
    fn test_geometry_edits_on_invalid_slot_are_ignored() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor_with(&dir, two_camera_configs());

        supervisor.set_roi(0, vec![NormPoint::new(0.1, 0.1)]);
        supervisor.set_tripwire(9, NormPoint::new(0.0, 0.0), NormPoint::new(1.0, 1.0));

        assert!(!supervisor.has_roi(1));
        assert!(!supervisor.has_tripwire(1));
        // Nothing was persisted
        assert!(!dir.path().join("cameras.json").exists());
    }
}
