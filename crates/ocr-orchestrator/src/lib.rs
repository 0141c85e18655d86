//! The orchestrator façade: a builder that resolves configuration,
//! constructs collaborators, and produces a ready [`Pipeline`]. See §4.6.
//!
//! Grounded on the fluent `with_*` builder methods the host workspace's
//! `DebugExecutor`/`BulkExecutor` use (`with_cache`, `with_output_dir`,
//! `with_timeout`), generalized here to cover the full collaborator and
//! resource configuration surface a real OCR pipeline needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ocr_core::{
    AdaptiveWorkerPool, BarcodeBackend, BatchEngine, CancellationToken, DocumentEngine,
    LineOrienter, Observer, OrientationClassifier, PdfExtractor, Recognizer, Rectifier,
    ResourceGovernor, SingleImageEngine, TextCleanup,
};
use ocr_core::collab::{self, stub};
use ocr_core::Detector;
use ocr_types::{
    BarcodeConfig, ClassifierConfig, Configuration, DetectionConfig, GpuConfig, NmsFlavor,
    OcrError, PolygonMode, RecognitionConfig, ResourceConfig, ResourceStats,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

type DetectorFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Detector>> + Send + Sync>;
type RecognizerFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Recognizer>> + Send + Sync>;
type OrientationFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn OrientationClassifier>> + Send + Sync>;
type RectifierFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Rectifier>> + Send + Sync>;

/// Resolved on-disk model paths for one variant (mobile or server).
#[derive(Debug, Clone, PartialEq)]
struct ModelPaths {
    detector_path: PathBuf,
    recognizer_path: PathBuf,
    dictionary_path: PathBuf,
    rectifier_path: PathBuf,
}

fn resolve_paths(models_dir: &Path, server_variant: bool) -> ModelPaths {
    let variant = if server_variant { "server" } else { "mobile" };
    ModelPaths {
        detector_path: models_dir.join(variant).join("detector.onnx"),
        recognizer_path: models_dir.join(variant).join("recognizer.onnx"),
        dictionary_path: models_dir.join("dictionary.txt"),
        rectifier_path: models_dir.join(variant).join("rectifier.onnx"),
    }
}

/// Collects configuration, validates it, and builds a [`Pipeline`].
///
/// **Ordering quirk, by design:** calling [`Self::models_dir`] regenerates
/// `detector_path`/`recognizer_path`/`dictionary_path`/`rectifier_path` from
/// the variant convention, unconditionally overwriting any explicit path set
/// before it. Callers who need an explicit override must call the path
/// setter **after** `models_dir`, not before. This is documented rather than
/// "fixed" because callers already route around the existing ordering.
pub struct PipelineBuilder {
    config: Configuration,
    detector_factory: Option<DetectorFactory>,
    recognizer_factory: Option<RecognizerFactory>,
    orientation_factory: Option<OrientationFactory>,
    rectifier_factory: Option<RectifierFactory>,
    line_orienter: Option<Box<dyn LineOrienter>>,
    text_cleanup: Option<Arc<dyn TextCleanup>>,
    pdf_extractor: Option<Arc<dyn PdfExtractor>>,
    barcode_backend: Option<Arc<dyn BarcodeBackend>>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
            detector_factory: None,
            recognizer_factory: None,
            orientation_factory: None,
            rectifier_factory: None,
            line_orienter: None,
            text_cleanup: None,
            pdf_extractor: None,
            barcode_backend: None,
        }
    }

    /// Loads field overrides from a TOML-encoded configuration file, to be
    /// layered under subsequent builder calls. See §10.3.
    pub fn from_toml_str(toml_text: &str) -> Result<Self, OcrError> {
        let config: Configuration =
            toml::from_str(toml_text).map_err(|err| OcrError::ValidationFailed(err.to_string()))?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    #[must_use]
    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let paths = resolve_paths(&dir, self.config.server_variant);
        self.config.models_dir = Some(dir);
        self.config.detector_path = Some(paths.detector_path);
        self.config.recognizer_path = Some(paths.recognizer_path);
        self.config.dictionary_path = Some(paths.dictionary_path);
        self.config.rectifier_path = Some(paths.rectifier_path);
        self
    }

    #[must_use]
    pub fn detector_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.detector_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn recognizer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.recognizer_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn dictionary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.dictionary_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn rectifier_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.rectifier_path = Some(path.into());
        self
    }

    /// Replaces the dictionary-paths set and clears the single dictionary
    /// path to remove ambiguity between the two.
    #[must_use]
    pub fn dictionary_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.dictionary_paths = paths;
        self.config.dictionary_path = None;
        self
    }

    /// Switches detector/recognizer to their larger variants and, if a
    /// models directory was already set, regenerates paths for it.
    #[must_use]
    pub fn server_variant(mut self, enabled: bool) -> Self {
        self.config.server_variant = enabled;
        if let Some(dir) = self.config.models_dir.clone() {
            let paths = resolve_paths(&dir, enabled);
            self.config.detector_path = Some(paths.detector_path);
            self.config.recognizer_path = Some(paths.recognizer_path);
            self.config.dictionary_path = Some(paths.dictionary_path);
            self.config.rectifier_path = Some(paths.rectifier_path);
        }
        self
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn detection(mut self, detection: DetectionConfig) -> Self {
        self.config.detection = detection;
        self
    }

    #[must_use]
    pub fn nms_flavor(mut self, nms: NmsFlavor) -> Self {
        self.config.detection.nms = nms;
        self
    }

    #[must_use]
    pub fn polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.config.detection.polygon_mode = mode;
        self
    }

    #[must_use]
    pub fn recognition(mut self, recognition: RecognitionConfig) -> Self {
        self.config.recognition = recognition;
        self
    }

    #[must_use]
    pub fn orientation(mut self, enabled: bool, confidence_threshold: f32) -> Self {
        self.config.orientation = ClassifierConfig { enabled, confidence_threshold };
        self
    }

    #[must_use]
    pub fn text_line_orientation(mut self, enabled: bool, confidence_threshold: f32) -> Self {
        self.config.text_line_orientation = ClassifierConfig { enabled, confidence_threshold };
        self
    }

    #[must_use]
    pub fn rectification(mut self, enabled: bool, confidence_threshold: f32) -> Self {
        self.config.rectification = ClassifierConfig { enabled, confidence_threshold };
        self
    }

    #[must_use]
    pub fn thread_count(mut self, count: usize) -> Self {
        self.config.thread_count = count;
        self
    }

    #[must_use]
    pub fn warmup_iterations(mut self, iterations: u32) -> Self {
        self.config.warmup_iterations = iterations;
        self
    }

    #[must_use]
    pub fn resources(mut self, resources: ResourceConfig) -> Self {
        self.config.resources = resources;
        self
    }

    #[must_use]
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.config.resources.parallel_workers = workers;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.resources.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn memory_cap_bytes(mut self, bytes: u64) -> Self {
        self.config.resources.memory_cap_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_concurrent_work(mut self, max: usize) -> Self {
        self.config.resources.max_concurrent_work = max;
        self
    }

    #[must_use]
    pub fn memory_pressure_threshold(mut self, threshold: f64) -> Self {
        self.config.resources.memory_pressure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn adaptive_scaling(mut self, enabled: bool) -> Self {
        self.config.resources.adaptive_scaling = enabled;
        self
    }

    #[must_use]
    pub fn backpressure(mut self, enabled: bool) -> Self {
        self.config.resources.backpressure = enabled;
        self
    }

    #[must_use]
    pub fn gpu(mut self, gpu: GpuConfig) -> Self {
        self.config.gpu = gpu;
        self
    }

    #[must_use]
    pub fn barcode(mut self, enabled: bool, types: Vec<String>, min_size: u32, try_harder: bool) -> Self {
        self.config.barcode = BarcodeConfig { enabled, types, min_size, try_harder };
        self
    }

    #[must_use]
    pub fn detector_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Detector>> + Send + Sync + 'static,
    {
        self.detector_factory = Some(Box::new(factory));
        self
    }

    #[must_use]
    pub fn recognizer_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Recognizer>> + Send + Sync + 'static,
    {
        self.recognizer_factory = Some(Box::new(factory));
        self
    }

    #[must_use]
    pub fn orientation_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn OrientationClassifier>> + Send + Sync + 'static,
    {
        self.orientation_factory = Some(Box::new(factory));
        self
    }

    #[must_use]
    pub fn rectifier_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Rectifier>> + Send + Sync + 'static,
    {
        self.rectifier_factory = Some(Box::new(factory));
        self
    }

    #[must_use]
    pub fn line_orienter(mut self, orienter: Box<dyn LineOrienter>) -> Self {
        self.line_orienter = Some(orienter);
        self
    }

    #[must_use]
    pub fn text_cleanup(mut self, cleanup: Arc<dyn TextCleanup>) -> Self {
        self.text_cleanup = Some(cleanup);
        self
    }

    #[must_use]
    pub fn pdf_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.pdf_extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn barcode_backend(mut self, backend: Arc<dyn BarcodeBackend>) -> Self {
        self.barcode_backend = Some(backend);
        self
    }

    /// Fails with a descriptive error if a configured model/dictionary path
    /// does not exist on disk, or if recognizer image height is non-positive.
    /// Orientation/rectification are never validated here: their failures
    /// degrade to disabled at build time instead.
    pub fn validate(&self) -> Result<(), OcrError> {
        if self.config.recognition.image_height == 0 {
            return Err(OcrError::ValidationFailed(
                "recognizer image height must be positive".into(),
            ));
        }
        for (label, path) in [
            ("detector", &self.config.detector_path),
            ("recognizer", &self.config.recognizer_path),
        ] {
            if let Some(path) = path {
                if !path.exists() {
                    return Err(OcrError::ValidationFailed(format!(
                        "{label} model not found at {}",
                        path.display()
                    )));
                }
            }
        }
        if let Some(path) = &self.config.dictionary_path {
            if !path.exists() {
                return Err(OcrError::ValidationFailed(format!(
                    "dictionary not found at {}",
                    path.display()
                )));
            }
        }
        for path in &self.config.dictionary_paths {
            if !path.exists() {
                return Err(OcrError::ValidationFailed(format!(
                    "dictionary not found at {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Validates, constructs collaborators in dependency order, optionally
    /// warms them up, and returns a ready [`Pipeline`]. See §4.6.
    pub async fn build(mut self) -> Result<Pipeline, OcrError> {
        self.validate()?;

        if self.config.resources.parallel_workers == ocr_types::UNSET_WORKER_COUNT {
            self.config.resources.parallel_workers = num_cpus::get();
        }

        let detector: Arc<dyn Detector> = match &self.detector_factory {
            Some(factory) => Arc::from(
                factory().map_err(|source| OcrError::DetectionFailed { index: 0, source })?,
            ),
            None => Arc::new(stub::NoOpDetector),
        };

        let mut recognizer_box: Box<dyn Recognizer> = match &self.recognizer_factory {
            Some(factory) => match factory() {
                Ok(recognizer) => recognizer,
                Err(source) => {
                    let _ = detector.close().await;
                    return Err(OcrError::RecognitionFailed { index: 0, source });
                }
            },
            None => Box::new(stub::NoOpRecognizer),
        };
        if let Some(orienter) = self.line_orienter {
            recognizer_box.set_line_orienter(orienter);
        }
        let recognizer: Arc<dyn Recognizer> = Arc::from(recognizer_box);

        let orientation: Option<Arc<dyn OrientationClassifier>> = if self.config.orientation.enabled {
            match &self.orientation_factory {
                Some(factory) => match factory() {
                    Ok(classifier) => Some(Arc::from(classifier)),
                    Err(err) => {
                        warn!(error = %err, "orientation classifier construction failed, disabling");
                        None
                    }
                },
                None => Some(Arc::new(stub::NoOpOrientationClassifier)),
            }
        } else {
            None
        };

        let rectifier: Option<Arc<dyn Rectifier>> = if self.config.rectification.enabled {
            match &self.rectifier_factory {
                Some(factory) => match factory() {
                    Ok(rectifier) => Some(Arc::from(rectifier)),
                    Err(err) => {
                        warn!(error = %err, "rectifier construction failed, disabling");
                        None
                    }
                },
                None => Some(Arc::new(stub::PassthroughRectifier)),
            }
        } else {
            None
        };

        let barcode = if self.config.barcode.enabled {
            match &self.barcode_backend {
                Some(backend) => Some(Arc::clone(backend)),
                None => {
                    warn!("barcode enabled but no backend configured, disabling for this session");
                    None
                }
            }
        } else {
            None
        };

        if self.config.warmup_iterations > 0 {
            detector
                .warmup(self.config.warmup_iterations)
                .await
                .map_err(OcrError::WarmupFailed)?;
            recognizer
                .warmup(self.config.warmup_iterations)
                .await
                .map_err(OcrError::WarmupFailed)?;
        }

        let governor = if self.config.resources.max_concurrent_work > 0
            || self.config.resources.memory_cap_bytes > 0
            || self.config.resources.adaptive_scaling
        {
            let governor = ResourceGovernor::new(
                self.config.resources.max_concurrent_work,
                self.config.resources.memory_cap_bytes,
                self.config.resources.clamped_pressure_threshold(),
                self.config.resources.backpressure,
            );
            if self.config.resources.memory_cap_bytes > 0 {
                let handle = governor.spawn_memory_monitor(std::time::Duration::from_secs(1));
                Some((governor, Some(handle)))
            } else {
                Some((governor, None))
            }
        } else {
            None
        };

        let adaptive_pool = if self.config.resources.adaptive_scaling {
            governor.as_ref().map(|(governor, _)| {
                AdaptiveWorkerPool::new(
                    Arc::clone(governor),
                    1,
                    self.config.effective_worker_count().max(1),
                )
            })
        } else {
            None
        };

        let mut single_image = SingleImageEngine::new(Arc::clone(&detector), Arc::clone(&recognizer));
        if let Some(orientation) = &orientation {
            single_image = single_image.with_orientation(Arc::clone(orientation));
        }
        if let Some(rectifier) = &rectifier {
            single_image = single_image.with_rectifier(Arc::clone(rectifier));
        }
        if let Some(cleanup) = &self.text_cleanup {
            single_image = single_image.with_text_cleanup(Arc::clone(cleanup));
        }
        if let Some(backend) = &barcode {
            single_image = single_image.with_barcode_backend(
                Arc::clone(backend),
                collab::BarcodeOptions {
                    types: self.config.barcode.types.clone(),
                    try_harder: self.config.barcode.try_harder,
                    multi: true,
                    min_size: self.config.barcode.min_size,
                },
            );
        }
        let single_image = Arc::new(single_image);

        Ok(Pipeline {
            config: self.config,
            detector,
            recognizer,
            orientation,
            rectifier,
            single_image,
            pdf_extractor: self.pdf_extractor,
            governor,
            adaptive_pool,
        })
    }
}

/// A fully constructed, ready-to-use OCR pipeline.
pub struct Pipeline {
    config: Configuration,
    detector: Arc<dyn Detector>,
    recognizer: Arc<dyn Recognizer>,
    orientation: Option<Arc<dyn OrientationClassifier>>,
    rectifier: Option<Arc<dyn Rectifier>>,
    single_image: Arc<SingleImageEngine>,
    pdf_extractor: Option<Arc<dyn PdfExtractor>>,
    governor: Option<(Arc<ResourceGovernor>, Option<tokio::task::JoinHandle<()>>)>,
    adaptive_pool: Option<AdaptiveWorkerPool>,
}

impl Pipeline {
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Runs a single image through the staged engine.
    pub async fn process_image(
        &self,
        image: &ocr_core::RasterImage,
        cancel: &CancellationToken,
    ) -> Result<ocr_types::ImageResult, OcrError> {
        if let Some((governor, _)) = &self.governor {
            let _slot = governor.acquire_work_slot(cancel).await?;
            return self.single_image.process(image, cancel).await;
        }
        self.single_image.process(image, cancel).await
    }

    /// Builds a [`BatchEngine`] bound to this pipeline's single-image engine
    /// and, optionally, a progress observer.
    #[must_use]
    pub fn batch_engine(&self, observer: Option<Arc<dyn Observer>>) -> BatchEngine {
        let mut engine = BatchEngine::new(Arc::clone(&self.single_image));
        if let Some(observer) = observer {
            engine = engine.with_observer(observer);
        }
        engine
    }

    /// Builds a [`DocumentEngine`] bound to this pipeline's collaborators.
    /// Returns `None` when no PDF extractor was configured.
    #[must_use]
    pub fn document_engine(&self) -> Option<DocumentEngine> {
        let extractor = self.pdf_extractor.as_ref()?;
        let max_work_slots = self.config.resources.max_concurrent_work;
        Some(DocumentEngine::new(
            Arc::clone(&self.single_image),
            Arc::clone(extractor),
            max_work_slots,
        ))
    }

    /// Current adaptive worker-count recommendation, when adaptive scaling
    /// was configured.
    #[must_use]
    pub fn current_worker_count(&self) -> Option<usize> {
        self.adaptive_pool.as_ref().map(|pool| pool.tick())
    }

    /// Read-only description of the live pipeline. See §4.6.
    #[must_use]
    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            models_dir: self.config.models_dir.clone(),
            orientation_enabled: self.orientation.is_some(),
            rectification_enabled: self.rectifier.is_some(),
            text_line_orientation_enabled: self.config.text_line_orientation.enabled,
            detector_model: self.config.detector_path.clone(),
            recognizer_model: self.config.recognizer_path.clone(),
            parallel_workers: self.config.effective_worker_count(),
            batch_size: self.config.resources.batch_size,
            resources: self.config.resources,
            live_resource_stats: self.governor.as_ref().map(|(governor, _)| governor.get_statistics()),
        }
    }

    /// Releases collaborators in reverse order: resource governor,
    /// orientation, rectifier, recognizer, detector. The first non-nil
    /// close error is returned after every release is attempted.
    pub async fn close(&self) -> Result<(), OcrError> {
        let mut first_error = None;

        if let Some((_, Some(handle))) = &self.governor {
            handle.abort();
        }
        if let Some(orientation) = &self.orientation {
            if let Err(err) = orientation.close().await {
                first_error.get_or_insert(OcrError::ValidationFailed(err.to_string()));
            }
        }
        if let Some(rectifier) = &self.rectifier {
            if let Err(err) = rectifier.close().await {
                first_error.get_or_insert(OcrError::ValidationFailed(err.to_string()));
            }
        }
        if let Err(err) = self.recognizer.close().await {
            first_error.get_or_insert(OcrError::ValidationFailed(err.to_string()));
        }
        if let Err(err) = self.detector.close().await {
            first_error.get_or_insert(OcrError::ValidationFailed(err.to_string()));
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// The read-only pipeline description returned by [`Pipeline::info`].
/// Absent sub-fields (`None`) indicate the corresponding feature is
/// inactive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub models_dir: Option<PathBuf>,
    pub orientation_enabled: bool,
    pub rectification_enabled: bool,
    pub text_line_orientation_enabled: bool,
    pub detector_model: Option<PathBuf>,
    pub recognizer_model: Option<PathBuf>,
    pub parallel_workers: usize,
    pub batch_size: usize,
    pub resources: ResourceConfig,
    pub live_resource_stats: Option<ResourceStats>,
}
