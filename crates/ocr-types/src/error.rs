//! Error types shared by every OCR pipeline crate

use thiserror::Error;

/// Errors surfaced by the single-image, batch, and document engines
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("pipeline not initialized: detector and recognizer are required")]
    NotInitialized,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("detection failed on image {index}: {source}")]
    DetectionFailed {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("recognition failed on image {index}: {source}")]
    RecognitionFailed {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("extraction failed for page {page}: {source}")]
    ExtractionFailed {
        page: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("resource limit reached: {0}")]
    ResourceLimit(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("warmup failed: {0}")]
    WarmupFailed(#[source] anyhow::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OcrError {
    /// The image index carried by a fatal per-image failure, if any
    #[must_use]
    pub fn image_index(&self) -> Option<usize> {
        match self {
            OcrError::DetectionFailed { index, .. } | OcrError::RecognitionFailed { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OcrError::Cancelled)
    }
}

/// Result type used by every public entry point in the pipeline
pub type Result<T> = std::result::Result<T, OcrError>;
