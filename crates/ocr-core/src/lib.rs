//! Concurrency, staging, and resource-governance engines for the OCR
//! pipeline. `ocr-types` owns the value types this crate moves around;
//! this crate owns everything that runs.

pub mod batch;
pub mod cancellation;
pub mod collab;
pub mod document;
pub mod image_view;
pub mod progress;
pub mod resource;
pub mod single_image;

pub use batch::{compute_statistics, BatchEngine, BatchMode, BatchSlot, ErrorHandler};
pub use cancellation::CancellationToken;
pub use collab::{
    BarcodeBackend, BarcodeOptions, Detector, LineOrienter, OrientationClassifier, PdfExtractor,
    Recognizer, Rectifier, TextCleanup,
};
pub use document::DocumentEngine;
pub use image_view::{ImageView, RasterImage};
pub use progress::{
    ConsoleBarObserver, FanOutObserver, LogSeverity, NoOpObserver, Observer, ProgressTracker,
    StructuredLogObserver, TimeThrottledObserver, WriterObserver,
};
pub use resource::{AdaptiveWorkerPool, ResourceGovernor, WorkSlotGuard};
pub use single_image::SingleImageEngine;
