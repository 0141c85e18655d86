//! Per-image, per-page, and per-document result trees

use crate::geometry::RotationAngle;
use crate::region::{RecognitionOutput, Region};
use serde::{Deserialize, Serialize};

/// A single detected+recognized text region, in the original image frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResult {
    pub region: Region,
    pub recognition: RecognitionOutput,
}

/// The orientation classifier's verdict for one image, recorded regardless
/// of which branch (rotate vs. pass-through) was actually taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationRecord {
    #[serde(with = "angle_as_degrees")]
    pub angle: RotationAngle,
    pub confidence: f32,
    /// Whether the rotation was actually applied to the working image
    /// (false when the classifier was disabled/absent or predicted 0°).
    pub applied: bool,
}

mod angle_as_degrees {
    use super::RotationAngle;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(angle: &RotationAngle, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u16(angle.degrees())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RotationAngle, D::Error> {
        let degrees = i64::deserialize(d)?;
        Ok(RotationAngle::from_degrees(degrees))
    }
}

/// A barcode decoded alongside the OCR pass, when the barcode collaborator
/// is configured and present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarcodeResult {
    pub kind: String,
    pub value: String,
    pub confidence: f32,
}

/// Nanosecond timing counters recorded for one image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageTiming {
    pub detection_nanos: u64,
    pub recognition_nanos: u64,
    pub total_nanos: u64,
}

/// The result of running the single-image engine on one input image.
///
/// `width`/`height` are always the dimensions of the **original** input
/// image, never the rotated working image, and region coordinates are
/// always expressed in the original frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    pub width: u32,
    pub height: u32,
    pub texts: Vec<TextResult>,
    pub avg_detection_confidence: f32,
    pub orientation: OrientationRecord,
    pub barcodes: Vec<BarcodeResult>,
    pub timing: ImageTiming,
}

impl ImageResult {
    /// Arithmetic mean of per-region detection confidence, or 0 when empty.
    #[must_use]
    pub fn compute_avg_detection_confidence(texts: &[TextResult]) -> f32 {
        if texts.is_empty() {
            return 0.0;
        }
        let sum: f32 = texts.iter().map(|t| t.region.confidence).sum();
        sum / texts.len() as f32
    }
}

/// The result of OCR-ing every image extracted for one PDF page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    /// Index reflects the extractor's image order within this page.
    pub images: Vec<ImageResult>,
    pub total_nanos: u64,
}

impl PageResult {
    /// Builds a page result whose dimensions are the max over its images,
    /// per §3's invariant on `PageResult.width`/`height`.
    #[must_use]
    pub fn from_images(page_number: u32, images: Vec<ImageResult>, total_nanos: u64) -> Self {
        let width = images.iter().map(|i| i.width).max().unwrap_or(0);
        let height = images.iter().map(|i| i.height).max().unwrap_or(0);
        Self {
            page_number,
            width,
            height,
            images,
            total_nanos,
        }
    }
}

/// The OCR result for an entire PDF document, page-ordered ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub filename: String,
    pub total_pages: usize,
    pub pages: Vec<PageResult>,
    pub extraction_nanos: u64,
    pub total_nanos: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Polygon};

    fn sample_text(confidence: f32) -> TextResult {
        TextResult {
            region: Region::new(
                Polygon(vec![
                    Point { x: 0.0, y: 0.0 },
                    Point { x: 1.0, y: 0.0 },
                    Point { x: 1.0, y: 1.0 },
                    Point { x: 0.0, y: 1.0 },
                ]),
                confidence,
            ),
            recognition: RecognitionOutput {
                text: "x".into(),
                confidence,
                char_confidences: None,
                rotated: false,
                language: None,
                recognition_nanos: 0,
            },
        }
    }

    #[test]
    fn avg_detection_confidence_is_zero_when_empty() {
        assert_eq!(ImageResult::compute_avg_detection_confidence(&[]), 0.0);
    }

    #[test]
    fn avg_detection_confidence_is_arithmetic_mean() {
        let texts = vec![sample_text(0.8), sample_text(0.6)];
        let avg = ImageResult::compute_avg_detection_confidence(&texts);
        assert!((avg - 0.7).abs() < 1e-6);
    }

    #[test]
    fn page_result_dimensions_are_max_over_images() {
        let mk = |w, h| ImageResult {
            width: w,
            height: h,
            texts: vec![],
            avg_detection_confidence: 0.0,
            orientation: OrientationRecord {
                angle: RotationAngle::Deg0,
                confidence: 1.0,
                applied: false,
            },
            barcodes: vec![],
            timing: ImageTiming::default(),
        };
        let page = PageResult::from_images(1, vec![mk(100, 50), mk(80, 200)], 0);
        assert_eq!(page.width, 100);
        assert_eq!(page.height, 200);
    }
}
