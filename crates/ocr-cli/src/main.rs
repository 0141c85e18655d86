//! Demonstration CLI: runs the orchestrator's stub collaborators over a
//! directory of images and prints the batch result tree as JSON.
//!
//! Not part of the pipeline's public contract; see §10.4.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ocr_core::{BatchMode, CancellationToken, ConsoleBarObserver, Observer, RasterImage};
use ocr_orchestrator::PipelineBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ocr-cli",
    version,
    about = "Demonstration CLI for the OCR pipeline orchestrator",
    long_about = "Runs the batch engine over a directory of images using the in-workspace \
                  stub collaborators and prints the resulting JSON tree.\n\n\
                  EXAMPLES:\n  \
                  ocr-cli --input ./scans --workers 4\n  \
                  ocr-cli --input ./scans --batch-size 2"
)]
struct Cli {
    /// Directory containing images to process (jpg/png).
    #[arg(short, long)]
    input: PathBuf,

    /// Number of parallel workers; 0 resolves to the host CPU count.
    #[arg(short, long, default_value_t = 0)]
    workers: usize,

    /// Micro-batch window size; 1 disables windowing.
    #[arg(short, long, default_value_t = 1)]
    batch_size: usize,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let pipeline = PipelineBuilder::new()
        .build()
        .await
        .context("failed to build pipeline")?;

    let images = load_images(&cli.input)?;
    if images.is_empty() {
        anyhow::bail!("no images found under {}", cli.input.display());
    }
    tracing::info!(count = images.len(), "loaded images");

    let observer: Arc<dyn Observer> = Arc::new(ConsoleBarObserver::new(true, true));
    let batch = pipeline.batch_engine(Some(observer));
    let cancel = CancellationToken::new();

    let workers = if cli.workers == 0 {
        pipeline.config().effective_worker_count()
    } else {
        cli.workers
    };
    let mode = if cli.batch_size > 1 {
        BatchMode::MicroBatched {
            workers: workers.max(1),
            batch_size: cli.batch_size,
        }
    } else if workers > 1 {
        BatchMode::Parallel { workers }
    } else {
        BatchMode::Sequential
    };

    let (slots, first_error) = batch.process(images, mode, &cancel).await;

    let results: Vec<Option<&ocr_types::ImageResult>> = slots
        .iter()
        .map(|slot| match slot {
            ocr_core::BatchSlot::Ok(result) => Some(result),
            _ => None,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&results)?);

    pipeline.close().await.ok();

    if let Some(err) = first_error {
        anyhow::bail!(err);
    }
    Ok(())
}

fn load_images(dir: &std::path::Path) -> Result<Vec<RasterImage>> {
    let mut images = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
            .unwrap_or(false);
        if !is_image {
            continue;
        }
        let decoded = image::open(&path).with_context(|| format!("decoding {}", path.display()))?;
        images.push(RasterImage::new(decoded.to_rgb8()));
    }
    Ok(images)
}
