//! Benchmark for the batch engine's throughput across worker counts.
//!
//! Run with:
//! ```bash
//! cargo bench --bench batch_engine_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ocr_core::collab::stub::{NoOpDetector, NoOpRecognizer};
use ocr_core::{BatchEngine, BatchMode, CancellationToken, RasterImage, SingleImageEngine};

fn sample_images(count: usize) -> Vec<RasterImage> {
    (0..count).map(|_| RasterImage::solid(640, 480, [255, 255, 255])).collect()
}

fn benchmark_sequential(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let engine = Arc::new(SingleImageEngine::new(Arc::new(NoOpDetector), Arc::new(NoOpRecognizer)));
    let batch = BatchEngine::new(Arc::clone(&engine));

    c.bench_function("sequential_20_images", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let cancel = CancellationToken::new();
                let (slots, _) = batch
                    .process(black_box(sample_images(20)), BatchMode::Sequential, &cancel)
                    .await;
                black_box(slots);
            });
        })
    });
}

fn benchmark_parallel_worker_scaling(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let engine = Arc::new(SingleImageEngine::new(Arc::new(NoOpDetector), Arc::new(NoOpRecognizer)));
    let batch = BatchEngine::new(Arc::clone(&engine));

    let mut group = c.benchmark_group("parallel_20_images_by_worker_count");
    for workers in [1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                runtime.block_on(async {
                    let cancel = CancellationToken::new();
                    let (slots, _) = batch
                        .process(
                            black_box(sample_images(20)),
                            BatchMode::Parallel { workers },
                            &cancel,
                        )
                        .await;
                    black_box(slots);
                });
            })
        });
    }
    group.finish();
}

fn benchmark_micro_batched(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let engine = Arc::new(SingleImageEngine::new(Arc::new(NoOpDetector), Arc::new(NoOpRecognizer)));
    let batch = BatchEngine::new(Arc::clone(&engine));

    c.bench_function("micro_batched_20_images_window_4", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let cancel = CancellationToken::new();
                let (slots, _) = batch
                    .process(
                        black_box(sample_images(20)),
                        BatchMode::MicroBatched { workers: 4, batch_size: 4 },
                        &cancel,
                    )
                    .await;
                black_box(slots);
            });
        })
    });
}

criterion_group!(
    benches,
    benchmark_sequential,
    benchmark_parallel_worker_scaling,
    benchmark_micro_batched
);
criterion_main!(benches);
