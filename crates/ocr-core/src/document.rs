//! The document engine: extract pages from a file, OCR every image on
//! every page, return a page-ordered `DocumentResult`. See §4.5.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use ocr_types::{DocumentResult, OcrError, PageResult};
use tokio::sync::mpsc;

use crate::cancellation::CancellationToken;
use crate::collab::PdfExtractor;
use crate::image_view::RasterImage;
use crate::single_image::SingleImageEngine;

pub struct DocumentEngine {
    single_image: Arc<SingleImageEngine>,
    extractor: Arc<dyn PdfExtractor>,
    max_work_slots: usize,
}

impl DocumentEngine {
    #[must_use]
    pub fn new(single_image: Arc<SingleImageEngine>, extractor: Arc<dyn PdfExtractor>, max_work_slots: usize) -> Self {
        Self {
            single_image,
            extractor,
            max_work_slots,
        }
    }

    /// Extracts `filename`'s selected pages and OCRs every page's images.
    /// See §4.5's worker-pool sizing formula and first-page-error-aborts
    /// contract.
    pub async fn process(
        &self,
        filename: &str,
        page_range_selector: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentResult, OcrError> {
        let total_start = Instant::now();

        let extract_start = Instant::now();
        let pages: BTreeMap<u32, Vec<RasterImage>> = self
            .extractor
            .extract(filename, page_range_selector)
            .await
            .map_err(|source| OcrError::ExtractionFailed { page: 0, source })?;
        let extraction_nanos = extract_start.elapsed().as_nanos() as u64;

        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }

        let page_count = pages.len();
        let worker_count = self
            .max_work_slots
            .max(num_cpus::get())
            .min(page_count.max(1))
            .max(1);

        let semaphore = Arc::new(tokio::sync::Semaphore::new(worker_count));
        let (tx, mut rx) = mpsc::channel(page_count.max(1));

        for (page_number, images) in pages {
            let permit_source = Arc::clone(&semaphore);
            let engine = Arc::clone(&self.single_image);
            let tx = tx.clone();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let permit = tokio::select! {
                    permit = permit_source.acquire_owned() => permit,
                    () = cancel.cancelled() => {
                        let _ = tx.send((page_number, Err(OcrError::Cancelled))).await;
                        return;
                    }
                };
                let Ok(_permit) = permit else { return };
                let outcome = process_page(&engine, page_number, images, &cancel).await;
                let _ = tx.send((page_number, outcome)).await;
            });
        }
        drop(tx);

        let mut results = Vec::with_capacity(page_count);
        let mut first_error = None;
        while let Some((page_number, outcome)) = rx.recv().await {
            match outcome {
                Ok(page_result) => results.push(page_result),
                Err(err) => {
                    first_error.get_or_insert(tag_page(err, page_number));
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }

        results.sort_by_key(|page: &PageResult| page.page_number);

        Ok(DocumentResult {
            filename: filename.to_string(),
            total_pages: page_count,
            pages: results,
            extraction_nanos,
            total_nanos: total_start.elapsed().as_nanos() as u64,
        })
    }
}

async fn process_page(
    engine: &SingleImageEngine,
    page_number: u32,
    images: Vec<RasterImage>,
    cancel: &CancellationToken,
) -> Result<PageResult, OcrError> {
    let page_start = Instant::now();
    let mut image_results = Vec::with_capacity(images.len());
    for image in &images {
        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }
        let result = engine.process(image, cancel).await?;
        image_results.push(result);
    }
    Ok(PageResult::from_images(
        page_number,
        image_results,
        page_start.elapsed().as_nanos() as u64,
    ))
}

fn tag_page(err: OcrError, page_number: u32) -> OcrError {
    match err {
        OcrError::Cancelled => OcrError::Cancelled,
        OcrError::ExtractionFailed { source, .. } => OcrError::ExtractionFailed {
            page: page_number,
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::stub::{NoOpDetector, NoOpRecognizer};
    use async_trait::async_trait;

    struct TwoPageExtractor;

    #[async_trait]
    impl PdfExtractor for TwoPageExtractor {
        async fn extract(
            &self,
            _filename: &str,
            _page_range_selector: &str,
        ) -> anyhow::Result<BTreeMap<u32, Vec<RasterImage>>> {
            let mut pages = BTreeMap::new();
            pages.insert(2, vec![RasterImage::solid(40, 30, [255, 255, 255])]);
            pages.insert(1, vec![
                RasterImage::solid(80, 50, [255, 255, 255]),
                RasterImage::solid(20, 200, [255, 255, 255]),
            ]);
            Ok(pages)
        }
    }

    fn single_image_engine() -> Arc<SingleImageEngine> {
        Arc::new(SingleImageEngine::new(Arc::new(NoOpDetector), Arc::new(NoOpRecognizer)))
    }

    #[tokio::test]
    async fn pages_are_returned_in_ascending_page_number_order() {
        let document = DocumentEngine::new(single_image_engine(), Arc::new(TwoPageExtractor), 4);
        let cancel = CancellationToken::new();
        let result = document.process("doc.pdf", "1-2", &cancel).await.unwrap();
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.pages[0].page_number, 1);
        assert_eq!(result.pages[1].page_number, 2);
    }

    #[tokio::test]
    async fn page_dimensions_are_max_over_its_images() {
        let document = DocumentEngine::new(single_image_engine(), Arc::new(TwoPageExtractor), 4);
        let cancel = CancellationToken::new();
        let result = document.process("doc.pdf", "1-2", &cancel).await.unwrap();
        let page_one = &result.pages[0];
        assert_eq!(page_one.width, 80);
        assert_eq!(page_one.height, 200);
    }

    struct FailingExtractor;

    #[async_trait]
    impl PdfExtractor for FailingExtractor {
        async fn extract(
            &self,
            _filename: &str,
            _page_range_selector: &str,
        ) -> anyhow::Result<BTreeMap<u32, Vec<RasterImage>>> {
            Err(anyhow::anyhow!("corrupt pdf"))
        }
    }

    #[tokio::test]
    async fn extractor_failure_surfaces_as_extraction_failed() {
        let document = DocumentEngine::new(single_image_engine(), Arc::new(FailingExtractor), 4);
        let cancel = CancellationToken::new();
        let result = document.process("doc.pdf", "1-2", &cancel).await;
        assert!(matches!(result, Err(OcrError::ExtractionFailed { .. })));
    }
}
