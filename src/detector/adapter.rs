use crate::error::DetectorError;
use crate::frame::FrameData;
use crate::geometry::{iou, letterbox_image, PixelBox};
use image::RgbImage;
use tracing::{debug, warn};

/// Hard floor applied to any configured confidence threshold.
pub const CONFIDENCE_FLOOR: f32 = 0.4;

/// Fraction removed from each side of a surviving box.
const BOX_TIGHTEN_RATIO: f64 = 0.22;

/// Boxes smaller than this on either side after tightening are dropped.
const MIN_BOX_SIDE: i32 = 10;

/// COCO class names (80 classes), index = class id.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Resolve a class id to its COCO name.
pub fn class_name(class_id: usize) -> &'static str {
    COCO_CLASSES.get(class_id).copied().unwrap_or("unknown")
}

/// A finished detection in original-frame pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub score: f32,
    pub bbox: PixelBox,
}

impl Detection {
    pub fn label(&self) -> &'static str {
        class_name(self.class_id)
    }
}

/// A raw candidate from a detection backend, in letterboxed input
/// coordinates with a center-format box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub score: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

/// Inference backend seam. Implementations run a frozen model on a
/// letterboxed square input and return per-candidate class/score/box.
pub trait DetectorBackend: Send {
    fn infer(&mut self, input: &RgbImage) -> Result<Vec<RawDetection>, DetectorError>;
}

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub input_size: u32,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Wraps a detection backend and turns raw model output into clean,
/// deduplicated detections in original-frame pixels.
///
/// Synchronous and owned by a single capture pipeline. Fails soft: any
/// backend error yields an empty result.
pub struct DetectionAdapter {
    backend: Box<dyn DetectorBackend>,
    settings: AdapterSettings,
}

impl DetectionAdapter {
    pub fn new(backend: Box<dyn DetectorBackend>, settings: AdapterSettings) -> Self {
        Self { backend, settings }
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.settings.confidence_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Run the detector on a frame and return detections in original-frame
    /// pixel coordinates.
    pub fn infer(&mut self, frame: &FrameData) -> Vec<Detection> {
        let img = match frame.to_rgb_image() {
            Ok(img) => img,
            Err(e) => {
                warn!("Detector input conversion failed: {}", e);
                return Vec::new();
            }
        };

        let (canvas, lb) = letterbox_image(&img, self.settings.input_size);

        let raw = match self.backend.infer(&canvas) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Inference failed: {}", e);
                return Vec::new();
            }
        };

        let threshold = self.settings.confidence_threshold.max(CONFIDENCE_FLOOR);
        let orig_w = frame.width as i32;
        let orig_h = frame.height as i32;

        let mut boxes: Vec<Detection> = Vec::new();
        for det in raw {
            if det.score < threshold || det.w <= 0.0 || det.h <= 0.0 {
                continue;
            }

            // Corner in input space, then back through the letterbox
            let (ox, oy) = lb.to_original(
                (det.cx - det.w / 2.0) as f64,
                (det.cy - det.h / 2.0) as f64,
            );
            let mut x = ox as i32;
            let mut y = oy as i32;
            let mut width = (det.w as f64 / lb.scale) as i32;
            let mut height = (det.h as f64 / lb.scale) as i32;

            x = x.clamp(0, orig_w - 1);
            y = y.clamp(0, orig_h - 1);
            width = width.min(orig_w - x);
            height = height.min(orig_h - y);

            if width > 20 && height > 20 && width < orig_w && height < orig_h {
                boxes.push(Detection {
                    class_id: det.class_id,
                    score: det.score,
                    bbox: PixelBox::new(x, y, width, height),
                });
            }
        }

        let kept = self.non_maximum_suppression(boxes);

        let mut detections = Vec::with_capacity(kept.len());
        for mut det in kept {
            if let Some(bbox) = tighten_box(det.bbox, orig_w, orig_h) {
                det.bbox = bbox;
                detections.push(det);
            }
        }

        debug!("Detector produced {} detections", detections.len());
        detections
    }

    /// Greedy NMS over all classes, highest score first.
    fn non_maximum_suppression(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        if detections.is_empty() {
            return detections;
        }

        detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

        let mut keep = Vec::new();
        let mut suppressed = vec![false; detections.len()];

        for i in 0..detections.len() {
            if suppressed[i] {
                continue;
            }
            keep.push(detections[i].clone());

            for j in (i + 1)..detections.len() {
                if suppressed[j] {
                    continue;
                }
                if iou(&detections[i].bbox, &detections[j].bbox)
                    > self.settings.nms_threshold as f64
                {
                    suppressed[j] = true;
                }
            }
        }

        keep
    }
}

/// Contract a box by the tighten ratio on each side and clamp to frame
/// bounds. Returns None when either side falls below the minimum.
fn tighten_box(bbox: PixelBox, orig_w: i32, orig_h: i32) -> Option<PixelBox> {
    let shrink_x = (bbox.width as f64 * BOX_TIGHTEN_RATIO) as i32;
    let shrink_y = (bbox.height as f64 * BOX_TIGHTEN_RATIO) as i32;

    let mut x = bbox.x + shrink_x;
    let mut y = bbox.y + shrink_y;
    let mut width = bbox.width - shrink_x * 2;
    let mut height = bbox.height - shrink_y * 2;

    x = x.clamp(0, orig_w - 1);
    y = y.clamp(0, orig_h - 1);
    width = width.min(orig_w - x);
    height = height.min(orig_h - y);

    if width < MIN_BOX_SIDE || height < MIN_BOX_SIDE {
        return None;
    }

    Some(PixelBox::new(x, y, width, height))
}
