use crate::error::Result;
use crate::frame::FrameData;
use crate::geometry::NormPoint;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::drawing::draw_polygon_mut;
use imageproc::morphology::{close, open};
use imageproc::point::Point;
use tracing::debug;

/// Frames of history the background model averages over.
const HISTORY: u64 = 500;

/// Squared-difference multiplier for the foreground decision.
const VAR_THRESHOLD: f32 = 16.0;

/// Variance assigned to a freshly observed pixel.
const VAR_INITIAL: f32 = 15.0;

// A single-Gaussian model needs headroom above the initial variance, or a
// vacated foreground region keeps firing while its mean converges back.
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 2000.0;

/// Morphology radius; a disc of radius 2 spans 5x5 pixels.
const KERNEL_RADIUS: u8 = 2;

/// Motion-mask mass below this has no usable centroid.
const MIN_CENTROID_MASS: u64 = 100;

/// Map a sensitivity in [0, 100] to a motion-score threshold.
///
/// Higher sensitivity lowers the threshold: 0 -> 10.0, 100 -> 0.5.
pub fn sensitivity_threshold(sensitivity: f64) -> f64 {
    10.0 - (sensitivity / 100.0) * 9.5
}

/// Result of analyzing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionAnalysis {
    /// Foreground percentage over the whole frame, in [0, 100].
    pub score_global: f64,
    /// Foreground percentage inside the ROI, relative to the ROI area.
    /// None when no usable ROI was supplied.
    pub score_roi: Option<f64>,
    /// Motion centroid in pixel coordinates, when enough mask mass exists.
    pub centroid: Option<(f64, f64)>,
}

/// Per-pixel running mean/variance background model.
///
/// Classification happens against the model state before the update, so the
/// first frame reports everything as foreground while the model seeds.
struct BackgroundModel {
    mean: Vec<f32>,
    variance: Vec<f32>,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl BackgroundModel {
    fn new() -> Self {
        Self {
            mean: Vec::new(),
            variance: Vec::new(),
            width: 0,
            height: 0,
            frame_count: 0,
        }
    }

    fn reset(&mut self, width: u32, height: u32) {
        let len = width as usize * height as usize;
        self.mean = vec![0.0; len];
        self.variance = vec![VAR_INITIAL; len];
        self.width = width;
        self.height = height;
        self.frame_count = 0;
    }

    /// Classify the frame against the model, then fold it in.
    fn apply(&mut self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width != self.width || height != self.height {
            debug!(
                "Background model resized from {}x{} to {}x{}",
                self.width, self.height, width, height
            );
            self.reset(width, height);
        }

        let mut mask = GrayImage::new(width, height);

        if self.frame_count == 0 {
            // No model yet. Everything is foreground and seeds the model.
            for (i, px) in gray.as_raw().iter().enumerate() {
                self.mean[i] = *px as f32;
            }
            for px in mask.pixels_mut() {
                px.0[0] = 255;
            }
            self.frame_count = 1;
            return mask;
        }

        let alpha = (1.0 / (self.frame_count + 1) as f32).max(1.0 / HISTORY as f32);

        let raw = gray.as_raw();
        for (i, out) in mask.iter_mut().enumerate() {
            let value = raw[i] as f32;
            let delta = value - self.mean[i];
            let sq = delta * delta;

            if sq > VAR_THRESHOLD * self.variance[i] {
                *out = 255;
            }

            self.mean[i] += alpha * delta;
            self.variance[i] =
                ((1.0 - alpha) * self.variance[i] + alpha * sq).clamp(VAR_MIN, VAR_MAX);
        }

        self.frame_count += 1;
        mask
    }
}

/// Background-subtraction motion analyzer with morphological cleanup and
/// ROI-masked scoring.
pub struct MotionAnalyzer {
    model: BackgroundModel,
}

impl MotionAnalyzer {
    pub fn new() -> Self {
        Self {
            model: BackgroundModel::new(),
        }
    }

    /// Drop the learned background. The next frame reseeds it.
    pub fn reset(&mut self) {
        self.model = BackgroundModel::new();
    }

    /// Analyze one frame. `roi` is a normalized polygon; fewer than three
    /// vertices disables ROI scoring.
    pub fn analyze(&mut self, frame: &FrameData, roi: &[NormPoint]) -> Result<MotionAnalysis> {
        let gray = frame
            .to_gray()
            .map_err(|e| crate::error::AnalyzerError::FrameProcessing {
                details: e.to_string(),
            })?;

        let raw_mask = self.model.apply(&gray);
        let mask = close(&open(&raw_mask, Norm::L2, KERNEL_RADIUS), Norm::L2, KERNEL_RADIUS);

        let total_pixels = (mask.width() * mask.height()) as u64;
        let motion_pixels = count_nonzero(&mask);
        let score_global = motion_pixels as f64 * 100.0 / total_pixels as f64;

        let score_roi = roi_score(&mask, roi);
        let centroid = mask_centroid(&mask);

        Ok(MotionAnalysis {
            score_global,
            score_roi,
            centroid,
        })
    }
}

impl Default for MotionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn count_nonzero(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().filter(|&&px| px != 0).count() as u64
}

/// Rasterize the normalized ROI polygon and score the masked motion
/// relative to the ROI area.
fn roi_score(mask: &GrayImage, roi: &[NormPoint]) -> Option<f64> {
    if roi.len() < 3 {
        return None;
    }

    let (width, height) = mask.dimensions();
    let vertices: Vec<Point<i32>> = roi
        .iter()
        .map(|p| {
            let (x, y) = p.to_pixels(width, height);
            Point::new(x as i32, y as i32)
        })
        .collect();

    // draw_polygon_mut requires an open polygon
    if vertices.first() == vertices.last() && vertices.len() > 1 {
        return None;
    }

    let mut roi_mask = GrayImage::new(width, height);
    draw_polygon_mut(&mut roi_mask, &vertices, Luma([255u8]));

    let mut roi_area = 0u64;
    let mut roi_motion = 0u64;
    for (m, r) in mask.as_raw().iter().zip(roi_mask.as_raw().iter()) {
        if *r != 0 {
            roi_area += 1;
            if *m != 0 {
                roi_motion += 1;
            }
        }
    }

    if roi_area == 0 {
        return None;
    }

    Some(roi_motion as f64 * 100.0 / roi_area as f64)
}

/// First-order image moments of the mask. None when the mass is too small
/// to give a stable centroid.
fn mask_centroid(mask: &GrayImage) -> Option<(f64, f64)> {
    let mut m00 = 0u64;
    let mut m10 = 0u64;
    let mut m01 = 0u64;

    for (x, y, px) in mask.enumerate_pixels() {
        if px.0[0] != 0 {
            m00 += 1;
            m10 += x as u64;
            m01 += y as u64;
        }
    }

    if m00 < MIN_CENTROID_MASS {
        return None;
    }

    Some((m10 as f64 / m00 as f64, m01 as f64 / m00 as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;

    fn black_frame(width: u32, height: u32) -> FrameData {
        FrameData::new(
            width,
            height,
            vec![0u8; (width * height * 3) as usize],
            FrameFormat::Bgr24,
        )
    }

    /// Black frame with a bright square at (x, y) of the given side.
    fn frame_with_square(width: u32, height: u32, x0: u32, y0: u32, side: u32) -> FrameData {
        let mut data = vec![0u8; (width * height * 3) as usize];
        for y in y0..(y0 + side).min(height) {
            for x in x0..(x0 + side).min(width) {
                let idx = ((y * width + x) * 3) as usize;
                data[idx] = 255;
                data[idx + 1] = 255;
                data[idx + 2] = 255;
            }
        }
        FrameData::new(width, height, data, FrameFormat::Bgr24)
    }

    #[test]
    fn test_sensitivity_threshold_mapping() {
        assert!((sensitivity_threshold(0.0) - 10.0).abs() < 1e-9);
        assert!((sensitivity_threshold(50.0) - 5.25).abs() < 1e-9);
        assert!((sensitivity_threshold(100.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_first_frame_is_all_foreground() {
        let mut analyzer = MotionAnalyzer::new();
        let analysis = analyzer.analyze(&black_frame(64, 64), &[]).unwrap();

        assert!(analysis.score_global > 99.0);
        assert!(analysis.score_roi.is_none());
    }

    #[test]
    fn test_static_scene_settles_to_no_motion() {
        let mut analyzer = MotionAnalyzer::new();
        let frame = black_frame(64, 64);

        analyzer.analyze(&frame, &[]).unwrap();
        let analysis = analyzer.analyze(&frame, &[]).unwrap();

        assert_eq!(analysis.score_global, 0.0);
        assert!(analysis.centroid.is_none());
    }

    #[test]
    fn test_bright_region_scores_and_centers() {
        let mut analyzer = MotionAnalyzer::new();

        // Seed the model with a black scene
        analyzer.analyze(&black_frame(80, 60), &[]).unwrap();

        let analysis = analyzer
            .analyze(&frame_with_square(80, 60, 20, 20, 20), &[])
            .unwrap();

        // 400 of 4800 pixels, eroded slightly by the open operation
        assert!(analysis.score_global > 5.0, "score {}", analysis.score_global);
        assert!(analysis.score_global < 12.0, "score {}", analysis.score_global);

        let (cx, cy) = analysis.centroid.expect("centroid for 400 px mass");
        assert!((cx - 29.5).abs() < 2.0, "cx {}", cx);
        assert!((cy - 29.5).abs() < 2.0, "cy {}", cy);
    }

    #[test]
    fn test_tiny_mass_has_no_centroid() {
        let mut analyzer = MotionAnalyzer::new();
        analyzer.analyze(&black_frame(64, 64), &[]).unwrap();

        // 8x8 = 64 px, below the centroid mass requirement after cleanup
        let analysis = analyzer
            .analyze(&frame_with_square(64, 64, 10, 10, 8), &[])
            .unwrap();
        assert!(analysis.centroid.is_none());
    }

    #[test]
    fn test_roi_score_relative_to_roi_area() {
        let mut analyzer = MotionAnalyzer::new();
        let roi = vec![
            NormPoint::new(0.25, 0.25),
            NormPoint::new(0.75, 0.25),
            NormPoint::new(0.75, 0.75),
            NormPoint::new(0.25, 0.75),
        ];

        analyzer.analyze(&black_frame(100, 100), &roi).unwrap();

        // 20x20 square fully inside the 50x50 ROI
        let analysis = analyzer
            .analyze(&frame_with_square(100, 100, 40, 40, 20), &roi)
            .unwrap();

        let roi_score = analysis.score_roi.expect("roi score");
        // Roughly 400/2500 of the ROI, modulo morphology erosion
        assert!(roi_score > 9.0, "roi score {}", roi_score);
        assert!(roi_score < 20.0, "roi score {}", roi_score);

        // Global score is diluted over the whole frame
        assert!(analysis.score_global < roi_score);
    }

    #[test]
    fn test_motion_outside_roi_does_not_raise_roi_score() {
        let mut analyzer = MotionAnalyzer::new();
        let roi = vec![
            NormPoint::new(0.5, 0.5),
            NormPoint::new(0.9, 0.5),
            NormPoint::new(0.9, 0.9),
            NormPoint::new(0.5, 0.9),
        ];

        analyzer.analyze(&black_frame(100, 100), &roi).unwrap();

        let analysis = analyzer
            .analyze(&frame_with_square(100, 100, 5, 5, 20), &roi)
            .unwrap();

        assert!(analysis.score_global > 1.0);
        assert_eq!(analysis.score_roi, Some(0.0));
    }

    #[test]
    fn test_degenerate_roi_disables_roi_scoring() {
        let mut analyzer = MotionAnalyzer::new();
        let roi = vec![NormPoint::new(0.1, 0.1), NormPoint::new(0.9, 0.9)];

        let analysis = analyzer.analyze(&black_frame(64, 64), &roi).unwrap();
        assert!(analysis.score_roi.is_none());
    }

    #[test]
    fn test_reset_reseeds_model() {
        let mut analyzer = MotionAnalyzer::new();
        let frame = black_frame(32, 32);

        analyzer.analyze(&frame, &[]).unwrap();
        analyzer.reset();

        let analysis = analyzer.analyze(&frame, &[]).unwrap();
        assert!(analysis.score_global > 99.0);
    }
}
