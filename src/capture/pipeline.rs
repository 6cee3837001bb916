use crate::analyzer::{sensitivity_threshold, MotionAnalyzer};
use crate::capture::source::{open_video_source, VideoTarget};
use crate::config::DetectorConfig;
use crate::detector::{Detection, DetectionAdapter};
use crate::events::{CameraEvent, CrossingDirection, EventKind, EventSender};
use crate::frame::FrameData;
use crate::geometry::NormPoint;
use crate::tracker::{CentroidTracker, TrackEvent};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Target frame period of the capture loop (roughly 30 Hz).
pub const FRAME_INTERVAL_MS: u64 = 33;

/// The detector runs on every Nth frame.
pub const AI_PROCESS_INTERVAL: u64 = 5;

/// Minimum spacing between frame-wide motion events.
pub const MOTION_DEBOUNCE_MS: i64 = 2000;

/// Minimum spacing between ROI motion events.
pub const ROI_MOTION_DEBOUNCE_MS: i64 = 3000;

/// Minimum spacing between motion-level tripwire events.
pub const MOTION_TRIPWIRE_DEBOUNCE_MS: i64 = 2000;

/// A motion centroid farther than this from the line does not count as a
/// crossing.
const MOTION_TRIPWIRE_MAX_DISTANCE_PX: f64 = 50.0;

/// FPS is recomputed from the wall clock every this many frames.
const FPS_WINDOW_FRAMES: u64 = 10;

/// Lifecycle of a camera pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Error,
}

/// Per-camera analytics switches, adjustable while the pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsSettings {
    pub motion_enabled: bool,
    /// Sensitivity in [0, 100]; values outside are clamped.
    pub motion_sensitivity: f64,
    pub ai_enabled: bool,
    pub ai_confidence_threshold: f64,
    pub auto_snapshot_on_motion: bool,
    pub auto_snapshot_on_roi: bool,
    pub auto_snapshot_on_tripwire: bool,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            motion_enabled: true,
            motion_sensitivity: 50.0,
            ai_enabled: false,
            ai_confidence_threshold: 0.5,
            auto_snapshot_on_motion: false,
            auto_snapshot_on_roi: false,
            auto_snapshot_on_tripwire: false,
        }
    }
}

/// Normalized ROI polygon and tripwire segment for one camera.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyticsGeometry {
    pub roi: Vec<NormPoint>,
    pub tripwire: Option<(NormPoint, NormPoint)>,
}

/// The deterministic per-frame step of a capture pipeline.
///
/// Owns the motion analyzer, the tracker and the detector handle. Holds all
/// debounce state. The surrounding thread supplies frames and wall-clock
/// timestamps, which keeps this testable without any capture hardware.
pub struct PipelineCore {
    analyzer: MotionAnalyzer,
    tracker: CentroidTracker,
    adapter: Option<DetectionAdapter>,
    settings: AnalyticsSettings,
    geometry: AnalyticsGeometry,
    ai_frame_counter: u64,
    last_motion_ms: i64,
    last_roi_alert_ms: i64,
    last_motion_tripwire_ms: i64,
    prev_motion_side: Option<f64>,
    last_detections: Vec<Detection>,
}

impl PipelineCore {
    pub fn new(
        settings: AnalyticsSettings,
        geometry: AnalyticsGeometry,
        adapter: Option<DetectionAdapter>,
    ) -> Self {
        let mut core = Self {
            analyzer: MotionAnalyzer::new(),
            tracker: CentroidTracker::new(),
            adapter,
            settings: AnalyticsSettings::default(),
            geometry,
            ai_frame_counter: 0,
            last_motion_ms: 0,
            last_roi_alert_ms: 0,
            last_motion_tripwire_ms: 0,
            prev_motion_side: None,
            last_detections: Vec::new(),
        };
        core.set_settings(settings);
        core
    }

    /// Last detector output, refreshed on every detector tick.
    pub fn detections(&self) -> &[Detection] {
        &self.last_detections
    }

    /// Apply updated switches. Toggling AI resets the tick counter and
    /// clears stale detections.
    pub fn set_settings(&mut self, mut settings: AnalyticsSettings) {
        settings.motion_sensitivity = settings.motion_sensitivity.clamp(0.0, 100.0);

        if settings.ai_enabled != self.settings.ai_enabled {
            self.ai_frame_counter = 0;
            if !settings.ai_enabled {
                self.last_detections.clear();
            }
        }

        if let Some(adapter) = self.adapter.as_mut() {
            adapter.set_confidence_threshold(settings.ai_confidence_threshold as f32);
        }

        self.settings = settings;
    }

    /// Apply updated geometry. A changed ROI or tripwire re-arms the
    /// corresponding debounce so edits take effect immediately.
    pub fn set_geometry(&mut self, geometry: AnalyticsGeometry) {
        if geometry.roi != self.geometry.roi {
            self.last_roi_alert_ms = 0;
        }
        if geometry.tripwire != self.geometry.tripwire {
            self.last_motion_tripwire_ms = 0;
            self.prev_motion_side = None;
        }
        self.geometry = geometry;
    }

    /// Run the full analytics sequence on one captured frame.
    ///
    /// Returns the RGB frame to publish and the events this frame raised.
    pub fn process_frame(&mut self, frame: &FrameData, now_ms: i64) -> (FrameData, Vec<EventKind>) {
        let mut events = Vec::new();

        let rgb = match frame.to_rgb() {
            Ok(rgb) => rgb,
            Err(e) => {
                events.push(EventKind::Error {
                    message: format!("Frame conversion failed: {}", e),
                });
                return (frame.clone(), events);
            }
        };

        if self.settings.motion_enabled {
            self.process_motion(frame, &rgb, now_ms, &mut events);
        }

        if self.settings.ai_enabled && self.adapter.is_some() {
            self.ai_frame_counter += 1;
            if self.ai_frame_counter >= AI_PROCESS_INTERVAL {
                self.ai_frame_counter = 0;
                self.process_detections(frame, &rgb, now_ms, &mut events);
            }
        }

        (rgb, events)
    }

    fn process_motion(
        &mut self,
        frame: &FrameData,
        rgb: &FrameData,
        now_ms: i64,
        events: &mut Vec<EventKind>,
    ) {
        let analysis = match self.analyzer.analyze(frame, &self.geometry.roi) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Motion analysis failed: {}", e);
                return;
            }
        };

        let threshold = sensitivity_threshold(self.settings.motion_sensitivity);

        if analysis.score_global > threshold && now_ms - self.last_motion_ms > MOTION_DEBOUNCE_MS {
            self.last_motion_ms = now_ms;
            events.push(EventKind::MotionScored {
                score: analysis.score_global,
            });
            if self.settings.auto_snapshot_on_motion {
                events.push(EventKind::SnapshotReady { frame: rgb.clone() });
            }
        }

        if let Some(score_roi) = analysis.score_roi {
            if score_roi > threshold && now_ms - self.last_roi_alert_ms > ROI_MOTION_DEBOUNCE_MS {
                self.last_roi_alert_ms = now_ms;
                events.push(EventKind::RoiScored { score: score_roi });
                if self.settings.auto_snapshot_on_roi {
                    events.push(EventKind::SnapshotReady { frame: rgb.clone() });
                }
            }
        }

        if self.geometry.tripwire.is_some() {
            self.process_motion_tripwire(frame, rgb, analysis.centroid, now_ms, events);
        }
    }

    /// Tripwire detection from the motion-mask centroid, independent of the
    /// tracker. Sides are evaluated in pixel space; a crossing only counts
    /// when the centroid passes close to the line.
    fn process_motion_tripwire(
        &mut self,
        frame: &FrameData,
        rgb: &FrameData,
        centroid: Option<(f64, f64)>,
        now_ms: i64,
        events: &mut Vec<EventKind>,
    ) {
        let (cx, cy) = match centroid {
            Some(c) => c,
            None => {
                // Too little motion to follow
                self.prev_motion_side = None;
                return;
            }
        };

        let (a, b) = self.geometry.tripwire.expect("tripwire checked by caller");
        let (x1, y1) = a.to_pixels(frame.width, frame.height);
        let (x2, y2) = b.to_pixels(frame.width, frame.height);

        let cur_side = (cx - x1) * (y2 - y1) - (cy - y1) * (x2 - x1);

        if let Some(prev_side) = self.prev_motion_side {
            if cur_side * prev_side < 0.0 {
                let line_length = ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt();
                if line_length > 0.0 {
                    let distance = cur_side.abs() / line_length;
                    if distance < MOTION_TRIPWIRE_MAX_DISTANCE_PX
                        && now_ms - self.last_motion_tripwire_ms > MOTION_TRIPWIRE_DEBOUNCE_MS
                    {
                        self.last_motion_tripwire_ms = now_ms;
                        let direction = if cur_side > 0.0 && prev_side < 0.0 {
                            CrossingDirection::LeftToRight
                        } else {
                            CrossingDirection::RightToLeft
                        };
                        events.push(EventKind::MotionTripwire { direction });
                        if self.settings.auto_snapshot_on_tripwire {
                            events.push(EventKind::SnapshotReady { frame: rgb.clone() });
                        }
                    }
                }
            }
        }

        self.prev_motion_side = Some(cur_side);
    }

    fn process_detections(
        &mut self,
        frame: &FrameData,
        rgb: &FrameData,
        now_ms: i64,
        events: &mut Vec<EventKind>,
    ) {
        let adapter = self.adapter.as_mut().expect("adapter checked by caller");
        let detections = adapter.infer(frame);

        let track_events = self.tracker.update(
            &detections,
            frame.width,
            frame.height,
            &self.geometry.roi,
            self.geometry.tripwire,
            now_ms,
        );
        self.last_detections = detections;

        for event in track_events {
            match event {
                TrackEvent::CrossedTripwire {
                    track_id,
                    label,
                    direction,
                } => {
                    events.push(EventKind::TrackTripwire {
                        track_id,
                        label,
                        direction,
                    });
                    if self.settings.auto_snapshot_on_tripwire {
                        events.push(EventKind::SnapshotReady { frame: rgb.clone() });
                    }
                }
                TrackEvent::Loitering {
                    track_id,
                    label,
                    duration_ms,
                } => {
                    events.push(EventKind::Loitering {
                        track_id,
                        label,
                        duration_ms,
                    });
                    if self.settings.auto_snapshot_on_roi {
                        events.push(EventKind::SnapshotReady { frame: rgb.clone() });
                    }
                }
            }
        }
    }
}

struct SharedControls {
    settings: AnalyticsSettings,
    geometry: AnalyticsGeometry,
}

/// One camera's capture pipeline: a dedicated thread owning the video
/// source and a [`PipelineCore`], publishing the current frame and
/// detections under short locks and posting events to the alert channel.
pub struct CameraPipeline {
    camera_id: String,
    camera_name: String,
    target: VideoTarget,
    detector_config: DetectorConfig,
    events: EventSender,
    controls: Arc<Mutex<SharedControls>>,
    state: Arc<Mutex<PipelineState>>,
    stop_flag: Arc<AtomicBool>,
    current_frame: Arc<Mutex<Option<FrameData>>>,
    current_detections: Arc<Mutex<Vec<Detection>>>,
    fps_bits: Arc<AtomicU64>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CameraPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera_id: impl Into<String>,
        camera_name: impl Into<String>,
        target: VideoTarget,
        settings: AnalyticsSettings,
        geometry: AnalyticsGeometry,
        detector_config: DetectorConfig,
        events: EventSender,
    ) -> Arc<Self> {
        Arc::new(Self {
            camera_id: camera_id.into(),
            camera_name: camera_name.into(),
            target,
            detector_config,
            events,
            controls: Arc::new(Mutex::new(SharedControls { settings, geometry })),
            state: Arc::new(Mutex::new(PipelineState::Stopped)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            current_frame: Arc::new(Mutex::new(None)),
            current_detections: Arc::new(Mutex::new(Vec::new())),
            fps_bits: Arc::new(AtomicU64::new(0)),
            thread: Mutex::new(None),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn camera_name(&self) -> &str {
        &self.camera_name
    }

    pub fn target(&self) -> &VideoTarget {
        &self.target
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap()
    }

    pub fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    /// Clone of the most recently published frame.
    pub fn current_frame(&self) -> Option<FrameData> {
        self.current_frame.lock().unwrap().clone()
    }

    /// Clone of the most recent detector output.
    pub fn current_detections(&self) -> Vec<Detection> {
        self.current_detections.lock().unwrap().clone()
    }

    pub fn set_roi(&self, points: Vec<NormPoint>) {
        self.controls.lock().unwrap().geometry.roi = points;
    }

    pub fn clear_roi(&self) {
        self.controls.lock().unwrap().geometry.roi.clear();
    }

    pub fn set_tripwire(&self, start: NormPoint, end: NormPoint) {
        self.controls.lock().unwrap().geometry.tripwire = Some((start, end));
    }

    pub fn clear_tripwire(&self) {
        self.controls.lock().unwrap().geometry.tripwire = None;
    }

    pub fn update_settings(&self, apply: impl FnOnce(&mut AnalyticsSettings)) {
        apply(&mut self.controls.lock().unwrap().settings);
    }

    /// Start the capture thread. A no-op unless the pipeline is stopped.
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != PipelineState::Stopped {
                warn!("Pipeline for {} is already running", self.camera_name);
                return;
            }
            *state = PipelineState::Starting;
        }

        self.stop_flag.store(false, Ordering::Relaxed);

        let pipeline = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("capture-{}", self.camera_id))
            .spawn(move || pipeline.run_capture_loop())
            .expect("failed to spawn capture thread");

        *self.thread.lock().unwrap() = Some(handle);
    }

    /// Signal the capture loop to stop and wait for it to exit. Idempotent.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);

        let handle = self.thread.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.join() {
                warn!("Capture thread for {} panicked: {:?}", self.camera_name, e);
            }
        }
    }

    fn emit(&self, now_ms: i64, kind: EventKind) {
        let event = CameraEvent::new(self.camera_name.clone(), now_ms, kind);
        if self.events.send(event).is_err() {
            debug!("Event channel closed; dropping event from {}", self.camera_name);
        }
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap() = state;
    }

    fn run_capture_loop(self: Arc<Self>) {
        let mut source = match open_video_source(&self.target) {
            Ok(source) => source,
            Err(e) => {
                warn!("Failed to open {}: {}", self.target, e);
                self.set_state(PipelineState::Error);
                self.emit(
                    Utc::now().timestamp_millis(),
                    EventKind::Error {
                        message: format!("Failed to open camera: {}", self.target),
                    },
                );
                self.set_state(PipelineState::Stopped);
                return;
            }
        };

        let adapter = build_adapter(&self.detector_config);
        let mut core = {
            let controls = self.controls.lock().unwrap();
            PipelineCore::new(controls.settings.clone(), controls.geometry.clone(), adapter)
        };

        self.set_state(PipelineState::Running);
        info!("Capture started for {} ({})", self.camera_name, self.target);

        let frame_interval = Duration::from_millis(FRAME_INTERVAL_MS);
        let mut frames_in_window = 0u64;
        let mut window_start = Instant::now();

        while !self.stop_flag.load(Ordering::Relaxed) {
            let deadline = Instant::now() + frame_interval;

            match source.read_frame() {
                Ok(frame) => {
                    {
                        let controls = self.controls.lock().unwrap();
                        core.set_settings(controls.settings.clone());
                        core.set_geometry(controls.geometry.clone());
                    }

                    let now_ms = Utc::now().timestamp_millis();
                    let (rgb, events) = core.process_frame(&frame, now_ms);

                    *self.current_frame.lock().unwrap() = Some(rgb);
                    *self.current_detections.lock().unwrap() = core.detections().to_vec();

                    for kind in events {
                        self.emit(now_ms, kind);
                    }

                    frames_in_window += 1;
                    if frames_in_window >= FPS_WINDOW_FRAMES {
                        let elapsed = window_start.elapsed().as_secs_f64();
                        if elapsed > 0.0 {
                            self.fps_bits.store(
                                (frames_in_window as f64 / elapsed).to_bits(),
                                Ordering::Relaxed,
                            );
                        }
                        frames_in_window = 0;
                        window_start = Instant::now();
                    }
                }
                Err(e) => {
                    warn!("Frame grab failed for {}: {}", self.camera_name, e);
                    self.set_state(PipelineState::Error);
                    self.emit(
                        Utc::now().timestamp_millis(),
                        EventKind::Error {
                            message: "Failed to capture frame".to_string(),
                        },
                    );
                    break;
                }
            }

            let now = Instant::now();
            if now < deadline {
                std::thread::sleep(deadline - now);
            }
        }

        drop(source);
        self.fps_bits.store(0f64.to_bits(), Ordering::Relaxed);
        self.set_state(PipelineState::Stopped);
        info!("Capture stopped for {}", self.camera_name);
    }
}

/// Build the detection adapter for a pipeline, if a backend is available.
#[cfg(feature = "onnx")]
fn build_adapter(config: &DetectorConfig) -> Option<DetectionAdapter> {
    use crate::detector::{AdapterSettings, OnnxBackend};

    if !config.enabled {
        return None;
    }

    match OnnxBackend::load(&config.model_path, config.input_size) {
        Ok(backend) => Some(DetectionAdapter::new(
            Box::new(backend),
            AdapterSettings {
                confidence_threshold: config.confidence_threshold as f32,
                nms_threshold: config.nms_threshold as f32,
                input_size: config.input_size,
            },
        )),
        Err(e) => {
            warn!("Object detection unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn build_adapter(config: &DetectorConfig) -> Option<DetectionAdapter> {
    if config.enabled {
        debug!("onnx feature disabled; object detection unavailable");
    }
    None
}
