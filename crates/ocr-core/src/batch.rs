//! The batch engine: sequential, parallel, and parallel micro-batched
//! processing of an ordered image list. See §4.4.
//!
//! Grounded on `BulkExecutor::execute_bulk` in the host workspace's core
//! crate: a `tokio::sync::Semaphore` bounds concurrency, one task is spawned
//! per unit of work, and results stream back over an `mpsc` channel. This
//! module generalizes that shape to preserve input order in the output and
//! to support windowed (micro-batched) sequential sub-runs per worker.

use std::sync::Arc;

use ocr_types::{BatchStatistics, OcrError};
use tokio::sync::mpsc;

use crate::cancellation::CancellationToken;
use crate::image_view::RasterImage;
use crate::progress::Observer;
use crate::single_image::SingleImageEngine;

/// How [`BatchEngine::process`] schedules work across the input list.
pub enum BatchMode {
    /// One image after another; aborts on the first error.
    Sequential,
    /// `workers` concurrent single-image jobs, ordered-result reassembly.
    Parallel { workers: usize },
    /// `workers` concurrent jobs, each processing a contiguous window of
    /// `batch_size` images sequentially.
    MicroBatched { workers: usize, batch_size: usize },
}

/// One slot of a batch run's output: either a result or the per-image error
/// that occupied that index, so callers can see exactly which inputs
/// succeeded and which failed without losing position.
pub enum BatchSlot<T> {
    Ok(T),
    Err(OcrError),
    /// Never scheduled: the run was cancelled or aborted before this index
    /// was reached.
    Unfilled,
}

/// A per-image error callback invoked for failing slots in the parallel
/// variant, mirroring §4.4's "optional per-image error handler".
pub type ErrorHandler = dyn Fn(usize, &RasterImage, &OcrError) + Send + Sync;

pub struct BatchEngine {
    single_image: Arc<SingleImageEngine>,
    observer: Option<Arc<dyn Observer>>,
    error_handler: Option<Arc<ErrorHandler>>,
}

impl BatchEngine {
    #[must_use]
    pub fn new(single_image: Arc<SingleImageEngine>) -> Self {
        Self {
            single_image,
            observer: None,
            error_handler: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Runs `images` through `mode`, returning one slot per input and the
    /// first-by-index error, if any. See §4.4.
    pub async fn process(
        &self,
        images: Vec<RasterImage>,
        mode: BatchMode,
        cancel: &CancellationToken,
    ) -> (Vec<BatchSlot<ocr_types::ImageResult>>, Option<OcrError>) {
        if images.is_empty() {
            return (Vec::new(), Some(OcrError::InvalidInput("no images provided".into())));
        }

        let total = images.len() as u64;
        if let Some(observer) = &self.observer {
            observer.on_start(total);
        }

        let (slots, first_error) = match mode {
            BatchMode::Sequential => self.run_sequential(images, cancel).await,
            BatchMode::Parallel { workers } => self.run_parallel(images, workers.max(1), cancel).await,
            BatchMode::MicroBatched { workers, batch_size } => {
                self.run_micro_batched(images, workers.max(1), batch_size.max(1), cancel).await
            }
        };

        if let Some(observer) = &self.observer {
            observer.on_complete();
        }
        (slots, first_error)
    }

    async fn run_sequential(
        &self,
        images: Vec<RasterImage>,
        cancel: &CancellationToken,
    ) -> (Vec<BatchSlot<ocr_types::ImageResult>>, Option<OcrError>) {
        let total = images.len() as u64;
        let mut slots = Vec::with_capacity(images.len());
        let mut first_error = None;

        for (index, image) in images.into_iter().enumerate() {
            if cancel.is_cancelled() {
                self.emit_error(index, &image, &OcrError::Cancelled);
                slots.push(BatchSlot::Err(OcrError::Cancelled));
                first_error.get_or_insert(OcrError::Cancelled);
                break;
            }
            match self.single_image.process(&image, cancel).await {
                Ok(result) => {
                    slots.push(BatchSlot::Ok(result));
                }
                Err(err) => {
                    self.emit_error(index, &image, &err);
                    first_error.get_or_insert_with(|| tag_index(&err, index));
                    slots.push(BatchSlot::Err(err));
                    break;
                }
            }
            self.emit_progress(index as u64 + 1, total);
        }
        (slots, first_error)
    }

    async fn run_parallel(
        &self,
        images: Vec<RasterImage>,
        workers: usize,
        cancel: &CancellationToken,
    ) -> (Vec<BatchSlot<ocr_types::ImageResult>>, Option<OcrError>) {
        let total = images.len();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel(total.max(1));

        for (index, image) in images.into_iter().enumerate() {
            let permit_source = Arc::clone(&semaphore);
            let engine = Arc::clone(&self.single_image);
            let tx = tx.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = permit_source.acquire_owned() => permit,
                    () = cancel.cancelled() => {
                        let _ = tx.send((index, image, Err(OcrError::Cancelled))).await;
                        return;
                    }
                };
                let Ok(_permit) = permit else { return };
                let result = engine.process(&image, &cancel).await;
                let _ = tx.send((index, image, result)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<BatchSlot<ocr_types::ImageResult>> =
            (0..total).map(|_| BatchSlot::Unfilled).collect();
        let mut first_error: Option<(usize, OcrError)> = None;
        let mut completed = 0u64;

        while let Some((index, image, outcome)) = rx.recv().await {
            completed += 1;
            match outcome {
                Ok(result) => slots[index] = BatchSlot::Ok(result),
                Err(err) => {
                    self.emit_error(index, &image, &err);
                    let tagged = tag_index(&err, index);
                    if first_error.as_ref().map(|(i, _)| index < *i).unwrap_or(true) {
                        first_error = Some((index, tagged));
                    }
                    slots[index] = BatchSlot::Err(err);
                }
            }
            self.emit_progress(completed, total as u64);

            if cancel.is_cancelled() {
                break;
            }
        }

        if cancel.is_cancelled() {
            return (slots, Some(OcrError::Cancelled));
        }
        (slots, first_error.map(|(_, err)| err))
    }

    async fn run_micro_batched(
        &self,
        images: Vec<RasterImage>,
        workers: usize,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> (Vec<BatchSlot<ocr_types::ImageResult>>, Option<OcrError>) {
        let total = images.len();
        let windows: Vec<(usize, Vec<RasterImage>)> = images
            .into_iter()
            .enumerate()
            .fold(Vec::new(), |mut acc: Vec<(usize, Vec<RasterImage>)>, (index, image)| {
                match acc.last_mut() {
                    Some((start, bucket)) if bucket.len() < batch_size && index - *start < batch_size => {
                        bucket.push(image);
                    }
                    _ => acc.push((index, vec![image])),
                }
                acc
            });

        let semaphore = Arc::new(tokio::sync::Semaphore::new(workers));
        let (tx, mut rx) = mpsc::channel(windows.len().max(1));

        for (start, window) in windows {
            let permit_source = Arc::clone(&semaphore);
            let engine = Arc::clone(&self.single_image);
            let tx = tx.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = permit_source.acquire_owned() => permit,
                    () = cancel.cancelled() => {
                        let _ = tx.send((start, Vec::new(), Some(OcrError::Cancelled))).await;
                        return;
                    }
                };
                let Ok(_permit) = permit else { return };

                let mut results = Vec::with_capacity(window.len());
                let mut window_error = None;
                for image in &window {
                    if cancel.is_cancelled() {
                        window_error = Some(OcrError::Cancelled);
                        break;
                    }
                    match engine.process(image, &cancel).await {
                        Ok(result) => results.push(result),
                        Err(err) => {
                            window_error = Some(err);
                            break;
                        }
                    }
                }
                let _ = tx.send((start, results, window_error)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<BatchSlot<ocr_types::ImageResult>> =
            (0..total).map(|_| BatchSlot::Unfilled).collect();
        let mut first_error: Option<(usize, OcrError)> = None;
        let mut completed = 0u64;

        while let Some((start, results, window_error)) = rx.recv().await {
            let succeeded = results.len();
            for (offset, result) in results.into_iter().enumerate() {
                slots[start + offset] = BatchSlot::Ok(result);
            }
            completed += succeeded as u64;
            if let Some(err) = window_error {
                let tagged = tag_index(&err, start);
                if first_error.as_ref().map(|(i, _)| start < *i).unwrap_or(true) {
                    first_error = Some((start, tagged));
                }
                if start + succeeded < total {
                    slots[start + succeeded] = BatchSlot::Err(err);
                    completed += 1;
                }
            }
            self.emit_progress(completed, total as u64);
        }

        if cancel.is_cancelled() {
            return (slots, Some(OcrError::Cancelled));
        }
        (slots, first_error.map(|(_, err)| err))
    }

    fn emit_progress(&self, current: u64, total: u64) {
        if let Some(observer) = &self.observer {
            observer.on_progress(current, total);
        }
    }

    fn emit_error(&self, index: usize, image: &RasterImage, error: &OcrError) {
        if let Some(observer) = &self.observer {
            observer.on_error(index as u64, &error.to_string());
        }
        if let Some(handler) = &self.error_handler {
            handler(index, image, error);
        }
    }
}

fn tag_index(err: &OcrError, index: usize) -> OcrError {
    match err {
        OcrError::DetectionFailed { source, .. } => OcrError::DetectionFailed {
            index,
            source: anyhow::anyhow!(source.to_string()),
        },
        OcrError::RecognitionFailed { source, .. } => OcrError::RecognitionFailed {
            index,
            source: anyhow::anyhow!(source.to_string()),
        },
        OcrError::Cancelled => OcrError::Cancelled,
        other => OcrError::ValidationFailed(other.to_string()),
    }
}

/// Computes throughput statistics over a completed run's slots.
#[must_use]
pub fn compute_statistics<T>(slots: &[BatchSlot<T>], elapsed_secs: f64) -> BatchStatistics {
    let processed = slots.len();
    let failed = slots
        .iter()
        .filter(|slot| matches!(slot, BatchSlot::Err(_) | BatchSlot::Unfilled))
        .count();
    BatchStatistics::compute(processed, failed, elapsed_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::stub::{NoOpDetector, NoOpRecognizer};

    fn engine() -> Arc<SingleImageEngine> {
        Arc::new(SingleImageEngine::new(Arc::new(NoOpDetector), Arc::new(NoOpRecognizer)))
    }

    fn images(n: u32) -> Vec<RasterImage> {
        (0..n).map(|_| RasterImage::solid(10, 10, [255, 255, 255])).collect()
    }

    #[tokio::test]
    async fn sequential_processes_every_image_in_order() {
        let batch = BatchEngine::new(engine());
        let cancel = CancellationToken::new();
        let (slots, err) = batch.process(images(5), BatchMode::Sequential, &cancel).await;
        assert!(err.is_none());
        assert_eq!(slots.len(), 5);
        assert!(slots.iter().all(|s| matches!(s, BatchSlot::Ok(_))));
    }

    #[tokio::test]
    async fn parallel_preserves_output_order() {
        let batch = BatchEngine::new(engine());
        let cancel = CancellationToken::new();
        let (slots, err) = batch
            .process(images(8), BatchMode::Parallel { workers: 3 }, &cancel)
            .await;
        assert!(err.is_none());
        assert_eq!(slots.len(), 8);
        assert!(slots.iter().all(|s| matches!(s, BatchSlot::Ok(_))));
    }

    #[tokio::test]
    async fn micro_batched_partitions_into_windows() {
        let batch = BatchEngine::new(engine());
        let cancel = CancellationToken::new();
        let (slots, err) = batch
            .process(
                images(7),
                BatchMode::MicroBatched { workers: 2, batch_size: 3 },
                &cancel,
            )
            .await;
        assert!(err.is_none());
        assert_eq!(slots.len(), 7);
        assert!(slots.iter().all(|s| matches!(s, BatchSlot::Ok(_))));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let batch = BatchEngine::new(engine());
        let cancel = CancellationToken::new();
        let (slots, err) = batch.process(Vec::new(), BatchMode::Sequential, &cancel).await;
        assert!(slots.is_empty());
        assert!(matches!(err, Some(OcrError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn cancellation_before_run_yields_cancelled_sequential() {
        let batch = BatchEngine::new(engine());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (_slots, err) = batch.process(images(3), BatchMode::Sequential, &cancel).await;
        assert!(matches!(err, Some(OcrError::Cancelled)));
    }

    #[test]
    fn statistics_counts_failed_and_unfilled_slots() {
        let slots: Vec<BatchSlot<()>> = vec![
            BatchSlot::Ok(()),
            BatchSlot::Err(OcrError::Cancelled),
            BatchSlot::Unfilled,
        ];
        let stats = compute_statistics(&slots, 3.0);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.failed, 2);
    }
}
