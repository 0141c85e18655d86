//! Shared data types for the OCR pipeline orchestration core.
//!
//! This crate owns nothing but value types and the crate-wide error enum —
//! no engines, no concurrency, no I/O. It exists so `ocr-core` and
//! `ocr-orchestrator` can share result/config types without depending on
//! each other.

pub mod config;
pub mod error;
pub mod geometry;
pub mod image_result;
pub mod progress;
pub mod region;
pub mod resource_stats;

pub use config::{
    BarcodeConfig, ClassifierConfig, Configuration, DetectionConfig, GpuConfig, NmsFlavor,
    PolygonMode, RecognitionConfig, ResourceConfig, UNSET_WORKER_COUNT,
};
pub use error::{OcrError, Result};
pub use geometry::{BBox, Point, Polygon, RotationAngle};
pub use image_result::{
    BarcodeResult, DocumentResult, ImageResult, ImageTiming, OrientationRecord, PageResult,
    TextResult,
};
pub use progress::{BatchStatistics, ProgressSnapshot};
pub use region::{RecognitionOutput, Region};
pub use resource_stats::ResourceStats;
