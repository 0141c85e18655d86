//! The single-image engine: orientation -> rectification -> detection ->
//! recognition -> result assembly. See §4.3.

use std::sync::Arc;
use std::time::Instant;

use ocr_types::{
    BarcodeResult, ImageResult, ImageTiming, OcrError, OrientationRecord, Region, RotationAngle,
    TextResult,
};
use tracing::debug;

use crate::cancellation::CancellationToken;
use crate::collab::{
    BarcodeBackend, BarcodeOptions, Detector, OrientationClassifier, Recognizer, Rectifier,
    TextCleanup,
};
use crate::image_view::RasterImage;

/// The collaborator set the single-image engine drives. Every field but
/// `detector` and `recognizer` is optional, mirroring §4.3's "when enabled
/// and the collaborator is present" stage contracts.
pub struct SingleImageEngine {
    detector: Arc<dyn Detector>,
    recognizer: Arc<dyn Recognizer>,
    orientation: Option<Arc<dyn OrientationClassifier>>,
    rectifier: Option<Arc<dyn Rectifier>>,
    text_cleanup: Option<Arc<dyn TextCleanup>>,
    barcode: Option<Arc<dyn BarcodeBackend>>,
    barcode_options: BarcodeOptions,
}

impl SingleImageEngine {
    #[must_use]
    pub fn new(detector: Arc<dyn Detector>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            detector,
            recognizer,
            orientation: None,
            rectifier: None,
            text_cleanup: None,
            barcode: None,
            barcode_options: BarcodeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_orientation(mut self, classifier: Arc<dyn OrientationClassifier>) -> Self {
        self.orientation = Some(classifier);
        self
    }

    #[must_use]
    pub fn with_rectifier(mut self, rectifier: Arc<dyn Rectifier>) -> Self {
        self.rectifier = Some(rectifier);
        self
    }

    #[must_use]
    pub fn with_text_cleanup(mut self, cleanup: Arc<dyn TextCleanup>) -> Self {
        self.text_cleanup = Some(cleanup);
        self
    }

    #[must_use]
    pub fn with_barcode_backend(mut self, backend: Arc<dyn BarcodeBackend>, options: BarcodeOptions) -> Self {
        self.barcode = Some(backend);
        self.barcode_options = options;
        self
    }

    /// Runs the full five-stage pipeline on one image. See §4.3.
    pub async fn process(
        &self,
        image: &RasterImage,
        cancel: &CancellationToken,
    ) -> Result<ImageResult, OcrError> {
        let total_start = Instant::now();
        let orig_w = image.buffer().width();
        let orig_h = image.buffer().height();

        check_cancelled(cancel)?;

        // Stage 1: orientation.
        let (angle, orientation_confidence, applied) = self.predict_and_apply_orientation(image).await;
        let working = match angle {
            RotationAngle::Deg0 => image.clone(),
            RotationAngle::Deg90 => image.rotate_90_ccw(),
            RotationAngle::Deg180 => image.rotate_180(),
            RotationAngle::Deg270 => image.rotate_270_ccw(),
        };

        check_cancelled(cancel)?;

        // Stage 2: rectification. Never fails the pipeline.
        let working = self.apply_rectification(&working).await;

        check_cancelled(cancel)?;

        // Stage 3: detection. Fatal on failure.
        let detect_start = Instant::now();
        let regions = self
            .detector
            .detect(&working)
            .await
            .map_err(|source| OcrError::DetectionFailed { index: 0, source })?;
        let detection_nanos = detect_start.elapsed().as_nanos() as u64;

        check_cancelled(cancel)?;

        // Stage 4: recognition. Skipped (but timed as zero) when there are
        // no regions; fatal on failure otherwise.
        let (texts, recognition_nanos) = if regions.is_empty() {
            (Vec::new(), 0)
        } else {
            let recognize_start = Instant::now();
            let outputs = self
                .recognizer
                .recognize_batch(&working, &regions)
                .await
                .map_err(|source| OcrError::RecognitionFailed { index: 0, source })?;
            let nanos = recognize_start.elapsed().as_nanos() as u64;
            (self.assemble_texts(regions, outputs, angle, orig_w, orig_h).await, nanos)
        };

        check_cancelled(cancel)?;

        let barcodes = self.decode_barcodes(&working).await;

        let avg_detection_confidence = ImageResult::compute_avg_detection_confidence(&texts);
        let timing = ImageTiming {
            detection_nanos,
            recognition_nanos,
            total_nanos: total_start.elapsed().as_nanos() as u64,
        };

        Ok(ImageResult {
            width: orig_w,
            height: orig_h,
            texts,
            avg_detection_confidence,
            orientation: OrientationRecord {
                angle,
                confidence: orientation_confidence,
                applied,
            },
            barcodes,
            timing,
        })
    }

    async fn predict_and_apply_orientation(&self, image: &RasterImage) -> (RotationAngle, f32, bool) {
        let Some(classifier) = &self.orientation else {
            return (RotationAngle::Deg0, 0.0, false);
        };
        match classifier.predict(image).await {
            Ok((angle, confidence)) => {
                let applied = angle != RotationAngle::Deg0;
                (angle, confidence, applied)
            }
            Err(err) => {
                debug!(error = %err, "orientation classifier failed, continuing at 0 degrees");
                (RotationAngle::Deg0, 0.0, false)
            }
        }
    }

    async fn apply_rectification(&self, working: &RasterImage) -> RasterImage {
        let Some(rectifier) = &self.rectifier else {
            return working.clone();
        };
        match rectifier.apply(working).await {
            Ok(Some(rectified)) => rectified,
            Ok(None) => working.clone(),
            Err(err) => {
                debug!(error = %err, "rectifier failed, retaining prior working image");
                working.clone()
            }
        }
    }

    async fn assemble_texts(
        &self,
        regions: Vec<Region>,
        outputs: Vec<ocr_types::RecognitionOutput>,
        angle: RotationAngle,
        orig_w: u32,
        orig_h: u32,
    ) -> Vec<TextResult> {
        let mut texts = Vec::with_capacity(regions.len());
        for (region, mut recognition) in regions.into_iter().zip(outputs) {
            // Per §4.3 stage 5, the reported box is the AABB of the
            // back-transformed *box* corners, not a recomputed AABB of the
            // back-transformed polygon vertices.
            let back_mapped_bbox = region.bbox.back_map(angle, orig_w, orig_h);
            let back_mapped_polygon = region.polygon.back_map(angle, orig_w, orig_h);
            let back_mapped_region = Region {
                bbox: back_mapped_bbox,
                polygon: back_mapped_polygon,
                confidence: region.confidence,
            };
            if let Some(cleanup) = &self.text_cleanup {
                if let Ok(cleaned) = cleanup.clean(&recognition.text, recognition.language.as_deref()).await {
                    recognition.text = cleaned;
                }
                if recognition.language.is_none() {
                    if let Ok(detected) = cleanup.detect_language(&recognition.text).await {
                        recognition.language = detected;
                    }
                }
            }
            texts.push(TextResult {
                region: back_mapped_region,
                recognition,
            });
        }
        texts
    }

    async fn decode_barcodes(&self, working: &RasterImage) -> Vec<BarcodeResult> {
        let Some(backend) = &self.barcode else {
            return Vec::new();
        };
        match backend.decode(working, &self.barcode_options).await {
            Ok((barcodes, _timing)) => barcodes,
            Err(err) => {
                debug!(error = %err, "barcode backend failed, returning no barcodes");
                Vec::new()
            }
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), OcrError> {
    if cancel.is_cancelled() {
        return Err(OcrError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::stub::*;
    use ocr_types::{BBox, Point, Polygon};

    fn white_image(w: u32, h: u32) -> RasterImage {
        RasterImage::solid(w, h, [255, 255, 255])
    }

    #[tokio::test]
    async fn blank_image_produces_no_text_regions() {
        let engine = SingleImageEngine::new(Arc::new(NoOpDetector), Arc::new(NoOpRecognizer));
        let cancel = CancellationToken::new();
        let result = engine.process(&white_image(80, 50), &cancel).await.unwrap();
        assert!(result.texts.is_empty());
        assert_eq!(result.width, 80);
        assert_eq!(result.height, 50);
        assert_eq!(result.avg_detection_confidence, 0.0);
        assert!(!result.orientation.applied);
    }

    struct FixedDetector;
    #[async_trait::async_trait]
    impl Detector for FixedDetector {
        async fn detect(&self, _image: &RasterImage) -> anyhow::Result<Vec<Region>> {
            Ok(vec![Region::new(
                Polygon(vec![
                    Point { x: 10.0, y: 5.0 },
                    Point { x: 30.0, y: 5.0 },
                    Point { x: 30.0, y: 15.0 },
                    Point { x: 10.0, y: 15.0 },
                ]),
                0.9,
            )])
        }
        async fn warmup(&self, _iterations: u32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NinetyClassifier;
    #[async_trait::async_trait]
    impl OrientationClassifier for NinetyClassifier {
        async fn predict(&self, _image: &RasterImage) -> anyhow::Result<(RotationAngle, f32)> {
            Ok((RotationAngle::Deg90, 0.95))
        }
    }

    #[tokio::test]
    async fn detected_region_is_back_mapped_through_rotation() {
        let engine = SingleImageEngine::new(Arc::new(FixedDetector), Arc::new(NoOpRecognizer))
            .with_orientation(Arc::new(NinetyClassifier));
        let cancel = CancellationToken::new();
        let result = engine.process(&white_image(80, 50), &cancel).await.unwrap();
        assert!(result.orientation.applied);
        assert_eq!(result.orientation.angle, RotationAngle::Deg90);
        assert_eq!(result.texts.len(), 1);
        assert_eq!(result.texts[0].region.bbox, BBox { x: 65, y: 10, w: 10, h: 20 });
    }

    #[tokio::test]
    async fn cancellation_before_detection_short_circuits() {
        let engine = SingleImageEngine::new(Arc::new(NoOpDetector), Arc::new(NoOpRecognizer));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.process(&white_image(10, 10), &cancel).await;
        assert!(matches!(result, Err(OcrError::Cancelled)));
    }

    struct FailingDetector;
    #[async_trait::async_trait]
    impl Detector for FailingDetector {
        async fn detect(&self, _image: &RasterImage) -> anyhow::Result<Vec<Region>> {
            Err(anyhow::anyhow!("model crashed"))
        }
        async fn warmup(&self, _iterations: u32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn detector_failure_surfaces_as_detection_failed() {
        let engine = SingleImageEngine::new(Arc::new(FailingDetector), Arc::new(NoOpRecognizer));
        let cancel = CancellationToken::new();
        let result = engine.process(&white_image(10, 10), &cancel).await;
        assert!(matches!(result, Err(OcrError::DetectionFailed { .. })));
    }
}
