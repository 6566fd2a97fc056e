//! OCR (Optical Character Recognition) result types

use serde::{Deserialize, Serialize};

/// Single recognized text region with an oriented bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Box center, x
    #[serde(rename = "centerX")]
    pub center_x: f32,
    /// Box center, y
    #[serde(rename = "centerY")]
    pub center_y: f32,
    /// Box width before rotation
    pub width: f32,
    /// Box height before rotation
    pub height: f32,
    /// Rotation of the box from axis-aligned, in degrees
    #[serde(rename = "angle")]
    pub angle_degrees: f32,
}

impl OcrResult {
    /// Corner points of the rotated box.
    ///
    /// Order before rotation is top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [(f32, f32); 4] {
        let (sin, cos) = self.angle_degrees.to_radians().sin_cos();
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;

        [
            (-half_w, -half_h),
            (half_w, -half_h),
            (half_w, half_h),
            (-half_w, half_h),
        ]
        .map(|(dx, dy)| {
            (
                self.center_x + dx * cos - dy * sin,
                self.center_y + dx * sin + dy * cos,
            )
        })
    }

    /// Axis-aligned rectangle (x, y, width, height) enclosing the rotated box
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        polygon_to_bounds(&self.corners())
    }
}

/// Convert polygon points to bounding box
fn polygon_to_bounds(polygon: &[(f32, f32)]) -> (f32, f32, f32, f32) {
    if polygon.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = polygon.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = polygon.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    (min_x, min_y, max_x - min_x, max_y - min_y)
}
