use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A point in normalized coordinates, relative to frame width/height.
///
/// All persisted and cross-component geometry uses the [0, 1] range;
/// conversion to pixels happens only at the edges (masks, detector input).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormPoint {
    pub x: f64,
    pub y: f64,
}

impl NormPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &NormPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Fuzzy test against the origin, used to detect unset endpoints.
    pub fn is_near_origin(&self) -> bool {
        self.x.abs() < 1e-9 && self.y.abs() < 1e-9
    }

    /// Scale into pixel space for the given frame dimensions.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f64, f64) {
        (self.x * width as f64, self.y * height as f64)
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Center of the box in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// Ray-casting point-in-polygon test (even-odd rule).
///
/// Returns false for degenerate polygons with fewer than 3 vertices.
pub fn point_in_polygon(point: &NormPoint, polygon: &[NormPoint]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i].x, polygon[i].y);
        let (xj, yj) = (polygon[j].x, polygon[j].y);

        if ((yi > point.y) != (yj > point.y))
            && (point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Signed side of the directed line a -> b that `point` lies on.
///
/// Positive and negative values are opposite half-planes; zero is colinear.
pub fn side_of_line(point: &NormPoint, a: &NormPoint, b: &NormPoint) -> f64 {
    (point.x - a.x) * (b.y - a.y) - (point.y - a.y) * (b.x - a.x)
}

/// Intersection-over-union of two pixel rectangles.
///
/// Returns 0.0 when the union area is zero.
pub fn iou(a: &PixelBox, b: &PixelBox) -> f64 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_w = (x2 - x1).max(0) as i64;
    let inter_h = (y2 - y1).max(0) as i64;
    let intersection = inter_w * inter_h;

    let union = a.area() + b.area() - intersection;
    if union <= 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}

/// Scale and padding applied when fitting a frame into a square detector input.
///
/// Forward mapping places the frame centered in the square; the inverse
/// recovers original pixel coordinates: `orig = (input - pad) / scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: f64,
    pub pad_y: f64,
}

impl Letterbox {
    /// Compute the letterbox transform for a `src_w x src_h` frame into a
    /// `target x target` square.
    pub fn compute(src_w: u32, src_h: u32, target: u32) -> Self {
        let scale = (target as f64 / src_w as f64).min(target as f64 / src_h as f64);
        let new_w = src_w as f64 * scale;
        let new_h = src_h as f64 * scale;
        Self {
            scale,
            pad_x: (target as f64 - new_w) / 2.0,
            pad_y: (target as f64 - new_h) / 2.0,
        }
    }

    /// Map original-frame pixel coordinates into detector-input coordinates.
    pub fn to_input(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
    }

    /// Map detector-input coordinates back to original-frame pixels.
    pub fn to_original(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Letterbox an RGB image into a `target x target` square canvas.
///
/// The image keeps its aspect ratio and is centered; the remainder is black.
pub fn letterbox_image(src: &RgbImage, target: u32) -> (RgbImage, Letterbox) {
    let lb = Letterbox::compute(src.width(), src.height(), target);
    let new_w = ((src.width() as f64 * lb.scale).round() as u32).max(1);
    let new_h = ((src.height() as f64 * lb.scale).round() as u32).max(1);

    let resized = image::imageops::resize(src, new_w, new_h, image::imageops::FilterType::Triangle);

    let mut canvas = RgbImage::new(target, target);
    image::imageops::replace(&mut canvas, &resized, lb.pad_x as i64, lb.pad_y as i64);

    (canvas, lb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<NormPoint> {
        vec![
            NormPoint::new(0.25, 0.25),
            NormPoint::new(0.75, 0.25),
            NormPoint::new(0.75, 0.75),
            NormPoint::new(0.25, 0.75),
        ]
    }

    #[test]
    fn test_point_in_polygon_basic() {
        let square = unit_square();

        assert!(point_in_polygon(&NormPoint::new(0.5, 0.5), &square));
        assert!(!point_in_polygon(&NormPoint::new(0.1, 0.1), &square));
        assert!(!point_in_polygon(&NormPoint::new(0.9, 0.5), &square));
    }

    #[test]
    fn test_point_in_polygon_degenerate() {
        let two_points = vec![NormPoint::new(0.0, 0.0), NormPoint::new(1.0, 1.0)];
        assert!(!point_in_polygon(&NormPoint::new(0.5, 0.5), &two_points));
        assert!(!point_in_polygon(&NormPoint::new(0.5, 0.5), &[]));
    }

    #[test]
    fn test_point_in_concave_polygon() {
        // L-shaped polygon
        let poly = vec![
            NormPoint::new(0.0, 0.0),
            NormPoint::new(1.0, 0.0),
            NormPoint::new(1.0, 0.5),
            NormPoint::new(0.5, 0.5),
            NormPoint::new(0.5, 1.0),
            NormPoint::new(0.0, 1.0),
        ];

        assert!(point_in_polygon(&NormPoint::new(0.25, 0.75), &poly));
        assert!(!point_in_polygon(&NormPoint::new(0.75, 0.75), &poly));
    }

    #[test]
    fn test_side_of_line_signs() {
        // Vertical line from top to bottom at x = 0.5
        let a = NormPoint::new(0.5, 0.0);
        let b = NormPoint::new(0.5, 1.0);

        let left = side_of_line(&NormPoint::new(0.4, 0.5), &a, &b);
        let right = side_of_line(&NormPoint::new(0.6, 0.5), &a, &b);
        let on = side_of_line(&NormPoint::new(0.5, 0.3), &a, &b);

        assert!(left < 0.0);
        assert!(right > 0.0);
        assert_eq!(on, 0.0);
        assert!(left * right < 0.0);
    }

    #[test]
    fn test_iou_overlap() {
        let a = PixelBox::new(0, 0, 100, 100);
        let b = PixelBox::new(50, 50, 100, 100);

        let result = iou(&a, &b);
        // 50x50 intersection over (2*10000 - 2500) union
        assert!((result - 2500.0 / 17500.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_disjoint_and_identical() {
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(100, 100, 10, 10);
        assert_eq!(iou(&a, &b), 0.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_zero_union() {
        let a = PixelBox::new(0, 0, 0, 0);
        let b = PixelBox::new(0, 0, 0, 0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_letterbox_round_trip_within_one_pixel() {
        for &(w, h) in &[(640u32, 480u32), (1920, 1080), (480, 640), (100, 900)] {
            let lb = Letterbox::compute(w, h, 640);

            for &(x, y) in &[(0.0, 0.0), (w as f64 / 2.0, h as f64 / 2.0), (w as f64, h as f64)] {
                let (ix, iy) = lb.to_input(x, y);
                let (ox, oy) = lb.to_original(ix, iy);
                assert!((ox - x).abs() < 1.0, "{}x{}: x {} -> {}", w, h, x, ox);
                assert!((oy - y).abs() < 1.0, "{}x{}: y {} -> {}", w, h, y, oy);
            }
        }
    }

    #[test]
    fn test_letterbox_pads_shorter_axis() {
        let lb = Letterbox::compute(640, 480, 640);
        assert!((lb.scale - 1.0).abs() < 1e-9);
        assert_eq!(lb.pad_x, 0.0);
        assert!((lb.pad_y - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_letterbox_image_dimensions() {
        let src = RgbImage::from_pixel(320, 240, image::Rgb([200, 10, 10]));
        let (canvas, lb) = letterbox_image(&src, 640);

        assert_eq!(canvas.dimensions(), (640, 640));
        assert!((lb.scale - 2.0).abs() < 1e-9);
        // Content centered vertically: rows above pad_y stay black
        assert_eq!(canvas.get_pixel(320, 0), &image::Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(320, 320), &image::Rgb([200, 10, 10]));
    }

    #[test]
    fn test_norm_point_distance() {
        let a = NormPoint::new(0.0, 0.0);
        let b = NormPoint::new(0.3, 0.4);
        assert!((a.distance_to(&b) - 0.5).abs() < 1e-12);
    }
}
