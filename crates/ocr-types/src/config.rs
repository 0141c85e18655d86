//! The frozen, builder-constructed pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Non-maximum-suppression flavor used by the detector collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NmsFlavor {
    Hard,
    Linear,
    Gaussian,
}

impl Default for NmsFlavor {
    fn default() -> Self {
        NmsFlavor::Hard
    }
}

/// Whether the detector reports quadrilateral polygons or plain boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonMode {
    Quad,
    Box,
}

impl Default for PolygonMode {
    fn default() -> Self {
        PolygonMode::Quad
    }
}

/// Detector-facing thresholds, forwarded verbatim to the detector
/// collaborator at build time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub db_thresh: f32,
    pub db_box_thresh: f32,
    pub nms: NmsFlavor,
    pub iou_threshold: f32,
    pub gaussian_sigma: f32,
    pub score_threshold: f32,
    pub polygon_mode: PolygonMode,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            db_thresh: 0.3,
            db_box_thresh: 0.6,
            nms: NmsFlavor::default(),
            iou_threshold: 0.5,
            gaussian_sigma: 0.5,
            score_threshold: 0.5,
            polygon_mode: PolygonMode::default(),
        }
    }
}

/// Recognizer-facing geometry, forwarded verbatim at build time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    pub image_height: u32,
    pub max_width: u32,
    pub width_padding_multiple: u32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            image_height: 48,
            max_width: 960,
            width_padding_multiple: 32,
        }
    }
}

/// Per-stage enable flags and confidence thresholds for the three optional
/// classifiers (orientation, text-line orientation, rectification).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub confidence_threshold: f32,
}

impl ClassifierConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            confidence_threshold: 0.9,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// GPU placement shared by every inference collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuConfig {
    pub enabled: bool,
    pub device_id: i32,
    pub memory_limit_bytes: Option<u64>,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device_id: 0,
            memory_limit_bytes: None,
        }
    }
}

/// Barcode collaborator configuration; absent backend degrades to disabled
/// at runtime regardless of these flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarcodeConfig {
    pub enabled: bool,
    pub types: Vec<String>,
    pub min_size: u32,
    pub try_harder: bool,
}

/// Batch/document engine and resource governor tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub parallel_workers: usize,
    pub batch_size: usize,
    pub memory_cap_bytes: u64,
    pub max_concurrent_work: usize,
    pub memory_pressure_threshold: f64,
    pub adaptive_scaling: bool,
    pub backpressure: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            parallel_workers: UNSET_WORKER_COUNT,
            batch_size: 1,
            memory_cap_bytes: 0,
            max_concurrent_work: 0,
            memory_pressure_threshold: 0.8,
            adaptive_scaling: false,
            backpressure: false,
        }
    }
}

/// Sentinel meaning "not explicitly configured". `ocr-types` has no
/// system-info dependency of its own, so it cannot resolve this to a CPU
/// count itself; `PipelineBuilder::build` resolves it to `num_cpus::get()`
/// and writes the result back into the frozen configuration, per the
/// default-worker-count rule.
pub const UNSET_WORKER_COUNT: usize = 0;

impl ResourceConfig {
    /// Clamps the pressure threshold into (0, 1], per §4.1.
    #[must_use]
    pub fn clamped_pressure_threshold(&self) -> f64 {
        self.memory_pressure_threshold.clamp(f64::EPSILON, 1.0)
    }
}

/// The complete, frozen pipeline configuration produced by the orchestrator
/// builder. Built once; never mutated after the pipeline is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub models_dir: Option<PathBuf>,
    pub detector_path: Option<PathBuf>,
    pub recognizer_path: Option<PathBuf>,
    pub dictionary_path: Option<PathBuf>,
    pub dictionary_paths: Vec<PathBuf>,
    pub rectifier_path: Option<PathBuf>,
    pub server_variant: bool,
    pub language: Option<String>,
    pub detection: DetectionConfig,
    pub recognition: RecognitionConfig,
    pub orientation: ClassifierConfig,
    pub text_line_orientation: ClassifierConfig,
    pub rectification: ClassifierConfig,
    pub thread_count: usize,
    pub warmup_iterations: u32,
    pub resources: ResourceConfig,
    pub gpu: GpuConfig,
    pub barcode: BarcodeConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            models_dir: None,
            detector_path: None,
            recognizer_path: None,
            dictionary_path: None,
            dictionary_paths: Vec::new(),
            rectifier_path: None,
            server_variant: false,
            language: None,
            detection: DetectionConfig::default(),
            recognition: RecognitionConfig::default(),
            orientation: ClassifierConfig::disabled(),
            text_line_orientation: ClassifierConfig::disabled(),
            rectification: ClassifierConfig::disabled(),
            thread_count: 1,
            warmup_iterations: 0,
            resources: ResourceConfig::default(),
            gpu: GpuConfig::default(),
            barcode: BarcodeConfig::default(),
        }
    }
}

impl Configuration {
    /// Worker count after defaulting: at least 1, per §3's invariant.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        self.resources.parallel_workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_worker_count_is_at_least_one() {
        let mut config = Configuration::default();
        config.resources.parallel_workers = 0;
        assert_eq!(config.effective_worker_count(), 1);
    }

    #[test]
    fn pressure_threshold_clamps_into_unit_interval() {
        let mut resources = ResourceConfig::default();
        resources.memory_pressure_threshold = 1.5;
        assert_eq!(resources.clamped_pressure_threshold(), 1.0);
        resources.memory_pressure_threshold = 0.0;
        assert!(resources.clamped_pressure_threshold() > 0.0);
    }

    #[test]
    fn configuration_round_trips_through_toml() {
        let config = Configuration::default();
        let text = toml::to_string(&config).expect("serialize");
        let parsed: Configuration = toml::from_str(&text).expect("deserialize");
        assert_eq!(parsed.thread_count, config.thread_count);
        assert_eq!(parsed.resources.batch_size, config.resources.batch_size);
    }
}
