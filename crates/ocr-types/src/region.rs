//! Detected text regions and their recognized content

use crate::geometry::{BBox, Polygon};
use serde::{Deserialize, Serialize};

/// A region of an image the detector asserts contains text.
///
/// `bbox` is always the AABB of `polygon` in whichever frame this value is
/// currently expressed in (working frame pre-assembly, original frame in a
/// finished [`crate::ImageResult`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bbox: BBox,
    pub polygon: Polygon,
    /// Detection confidence, in [0, 1]
    pub confidence: f32,
}

impl Region {
    #[must_use]
    pub fn new(polygon: Polygon, confidence: f32) -> Self {
        let bbox = polygon.aabb();
        Self {
            bbox,
            polygon,
            confidence,
        }
    }
}

/// Per-character recognition confidence, per-region recognized text, and the
/// timing/flags the recognizer attaches to one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOutput {
    pub text: String,
    /// Recognition confidence, in [0, 1]
    pub confidence: f32,
    /// Present only when the recognizer reports per-glyph confidence; when
    /// present its length equals the glyph count of `text`.
    pub char_confidences: Option<Vec<f32>>,
    /// True when this region was recognized from a rotated crop (line
    /// orientation correction applied).
    pub rotated: bool,
    pub language: Option<String>,
    pub recognition_nanos: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn region_bbox_matches_polygon_aabb() {
        let polygon = Polygon(vec![
            Point { x: 1.0, y: 1.0 },
            Point { x: 5.0, y: 1.0 },
            Point { x: 5.0, y: 4.0 },
            Point { x: 1.0, y: 4.0 },
        ]);
        let region = Region::new(polygon.clone(), 0.9);
        assert_eq!(region.bbox, polygon.aabb());
    }
}
