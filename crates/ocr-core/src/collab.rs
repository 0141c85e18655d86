//! Collaborator contracts consumed by the engines.
//!
//! None of these traits are implemented with real inference here — the
//! detector, recognizer, classifiers, rectifier, text cleanup, PDF
//! extractor, and barcode backend are all out-of-scope collaborators per
//! the specification. Each trait is `Send + Sync` so a single shared
//! instance can serve every worker; each returns `anyhow::Result` since a
//! collaborator's internal failure mode is opaque to the core, which wraps
//! it into a named [`ocr_types::OcrError`] variant at the call site.

use crate::image_view::RasterImage;
use async_trait::async_trait;
use ocr_types::{BarcodeResult, RecognitionOutput, Region, RotationAngle};
use std::collections::BTreeMap;
use std::time::Duration;

/// `detect(image) -> regions`, `warmup(n)`, `close()`.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &RasterImage) -> anyhow::Result<Vec<Region>>;
    async fn warmup(&self, iterations: u32) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A handle the recognizer uses to correct per-line orientation before
/// decoding; installed via [`Recognizer::set_line_orienter`].
#[async_trait]
pub trait LineOrienter: Send + Sync {
    async fn predict(&self, crop: &RasterImage) -> anyhow::Result<RotationAngle>;
}

/// `recognize_batch(image, regions) -> outputs` (same length/order as
/// `regions`), `warmup(n)`, `set_line_orienter(handle)`, `close()`.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize_batch(
        &self,
        image: &RasterImage,
        regions: &[Region],
    ) -> anyhow::Result<Vec<RecognitionOutput>>;

    async fn warmup(&self, iterations: u32) -> anyhow::Result<()>;

    /// Default is a no-op: not every recognizer supports line-orientation
    /// correction.
    fn set_line_orienter(&mut self, _orienter: Box<dyn LineOrienter>) {}

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// `predict(image) -> (angle, confidence)`, `close()`. Failures are
/// recoverable by the caller (fall back to 0°); see §4.3 stage 1.
#[async_trait]
pub trait OrientationClassifier: Send + Sync {
    async fn predict(&self, image: &RasterImage) -> anyhow::Result<(RotationAngle, f32)>;

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// `apply(image) -> image_or_null`, `close()`. Failures are recoverable;
/// see §4.3 stage 2.
#[async_trait]
pub trait Rectifier: Send + Sync {
    async fn apply(&self, image: &RasterImage) -> anyhow::Result<Option<RasterImage>>;

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Text post-processing: normalization and language-tagging.
#[async_trait]
pub trait TextCleanup: Send + Sync {
    async fn clean(&self, text: &str, language_hint: Option<&str>) -> anyhow::Result<String>;
    async fn detect_language(&self, text: &str) -> anyhow::Result<Option<String>>;
}

/// `extract(filename, page_range_selector) -> {page_number: images}`.
/// Malformed input fails the call.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract(
        &self,
        filename: &str,
        page_range_selector: &str,
    ) -> anyhow::Result<BTreeMap<u32, Vec<RasterImage>>>;
}

/// Options forwarded to the barcode collaborator.
#[derive(Debug, Clone, Default)]
pub struct BarcodeOptions {
    pub types: Vec<String>,
    pub try_harder: bool,
    pub multi: bool,
    pub min_size: u32,
}

/// `decode(image, options) -> (barcodes, timing_hint)`. An absent backend
/// means barcodes are disabled at runtime (log and continue) — expressed
/// here as `Option<Arc<dyn BarcodeBackend>>` at the call site, not as a
/// fallible construction of this trait.
#[async_trait]
pub trait BarcodeBackend: Send + Sync {
    async fn decode(
        &self,
        image: &RasterImage,
        options: &BarcodeOptions,
    ) -> anyhow::Result<(Vec<BarcodeResult>, Duration)>;
}

/// Deterministic, model-free collaborator implementations used by the
/// in-workspace tests and the demo CLI. A production caller supplies real
/// ONNX/Tesseract-backed implementations of the traits above instead.
pub mod stub {
    use super::*;

    /// Detects no regions on any image — matches §8 scenario 3's "blank
    /// white" expectation.
    #[derive(Debug, Default)]
    pub struct NoOpDetector;

    #[async_trait]
    impl Detector for NoOpDetector {
        async fn detect(&self, _image: &RasterImage) -> anyhow::Result<Vec<Region>> {
            Ok(Vec::new())
        }

        async fn warmup(&self, _iterations: u32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Recognizes every region as empty text with full confidence.
    #[derive(Debug, Default)]
    pub struct NoOpRecognizer;

    #[async_trait]
    impl Recognizer for NoOpRecognizer {
        async fn recognize_batch(
            &self,
            _image: &RasterImage,
            regions: &[Region],
        ) -> anyhow::Result<Vec<RecognitionOutput>> {
            Ok(regions
                .iter()
                .map(|_| RecognitionOutput {
                    text: String::new(),
                    confidence: 1.0,
                    char_confidences: None,
                    rotated: false,
                    language: None,
                    recognition_nanos: 0,
                })
                .collect())
        }

        async fn warmup(&self, _iterations: u32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Always predicts 0° (upright); exercises the "no rotation" path.
    #[derive(Debug, Default)]
    pub struct NoOpOrientationClassifier;

    #[async_trait]
    impl OrientationClassifier for NoOpOrientationClassifier {
        async fn predict(&self, _image: &RasterImage) -> anyhow::Result<(RotationAngle, f32)> {
            Ok((RotationAngle::Deg0, 1.0))
        }
    }

    /// Passes the working image through unchanged.
    #[derive(Debug, Default)]
    pub struct PassthroughRectifier;

    #[async_trait]
    impl Rectifier for PassthroughRectifier {
        async fn apply(&self, _image: &RasterImage) -> anyhow::Result<Option<RasterImage>> {
            Ok(None)
        }
    }

    /// Returns text unchanged and never guesses a language.
    #[derive(Debug, Default)]
    pub struct IdentityTextCleanup;

    #[async_trait]
    impl TextCleanup for IdentityTextCleanup {
        async fn clean(&self, text: &str, _language_hint: Option<&str>) -> anyhow::Result<String> {
            Ok(text.to_string())
        }

        async fn detect_language(&self, _text: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    /// Finds no barcodes on any image.
    #[derive(Debug, Default)]
    pub struct NoOpBarcodeBackend;

    #[async_trait]
    impl BarcodeBackend for NoOpBarcodeBackend {
        async fn decode(
            &self,
            _image: &RasterImage,
            _options: &BarcodeOptions,
        ) -> anyhow::Result<(Vec<BarcodeResult>, Duration)> {
            Ok((Vec::new(), Duration::ZERO))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::*;
    use super::*;

    #[tokio::test]
    async fn noop_detector_finds_nothing() {
        let detector = NoOpDetector;
        let image = RasterImage::solid(10, 10, [255, 255, 255]);
        assert!(detector.detect(&image).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn noop_orientation_classifier_predicts_upright() {
        let classifier = NoOpOrientationClassifier;
        let image = RasterImage::solid(10, 10, [0, 0, 0]);
        let (angle, confidence) = classifier.predict(&image).await.unwrap();
        assert_eq!(angle, RotationAngle::Deg0);
        assert_eq!(confidence, 1.0);
    }

    #[tokio::test]
    async fn identity_text_cleanup_is_noop() {
        let cleanup = IdentityTextCleanup;
        assert_eq!(cleanup.clean("hello", None).await.unwrap(), "hello");
        assert_eq!(cleanup.detect_language("hello").await.unwrap(), None);
    }
}
