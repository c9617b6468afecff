//! Object editing CLI
//!
//! Command-line front end over the editing pipeline: model maintenance
//! commands plus the single-image detect → segment → inpaint run.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, ModelCache},
    download::{fetch_image, ModelDownloader},
    inference,
    models::ModelKind,
    pipeline::{EditRequest, InpaintPipeline},
    services::{ConsoleProgressReporter, ImageIoService, ProcessingStage, ProgressReporter, ProgressUpdate},
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Text-prompted object editing: detect, segment, and inpaint
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "grounded-inpaint")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image: URL or local file path
    #[arg(
        value_name = "IMAGE",
        required_unless_present_any = &["only_download", "list_models", "clear_cache", "show_cache_dir", "show_providers"]
    )]
    pub input: Option<String>,

    /// Free-text prompt naming the object to find (e.g. "bench")
    #[arg(long)]
    pub find: Option<String>,

    /// Prompt describing what to paint in place of the object
    #[arg(long)]
    pub replace: Option<String>,

    /// Prompt describing what to paint in place of the background
    #[arg(long)]
    pub background: Option<String>,

    /// Negative prompt shared by both inpainting passes
    #[arg(long, default_value = "low resolution, ugly")]
    pub negative: String,

    /// Seed for the latent noise generator
    #[arg(long, default_value_t = 32)]
    pub seed: u64,

    /// Minimum detection confidence for a box to survive
    #[arg(long, default_value_t = 0.3)]
    pub box_threshold: f32,

    /// Minimum token confidence for a word to join the detected phrase
    #[arg(long, default_value_t = 0.25)]
    pub text_threshold: f32,

    /// Number of denoising steps
    #[arg(long, default_value_t = 30)]
    pub steps: usize,

    /// Classifier-free guidance scale
    #[arg(long, default_value_t = 7.5)]
    pub guidance: f32,

    /// Output directory for the artifact sequence
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliOutputFormat::Jpeg)]
    pub format: CliOutputFormat,

    /// JPEG quality (0-100)
    #[arg(long, default_value_t = 90)]
    pub jpeg_quality: u8,

    /// Execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Detector model: URL, cached model ID, or path [default: bundled repository]
    #[arg(long)]
    pub detector_model: Option<String>,

    /// Segmenter model: URL, cached model ID, or path [default: bundled repository]
    #[arg(long)]
    pub segmenter_model: Option<String>,

    /// Inpainter model: URL, cached model ID, or path [default: bundled repository]
    #[arg(long)]
    pub inpainter_model: Option<String>,

    /// Use a random overlay color instead of the fixed default
    #[arg(long)]
    pub random_overlay_color: bool,

    /// Download the stage models but don't process any image
    #[arg(long)]
    pub only_download: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Clear all cached models and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Show current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<String>,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Jpeg,
    Png,
}

/// CLI entry point
///
/// # Errors
/// - Any pipeline, download, or I/O failure, with context attached
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose)?;

    if let Some(cache_dir) = &cli.cache_dir {
        std::env::set_var("GROUNDED_INPAINT_CACHE_DIR", cache_dir);
    }

    if cli.show_providers {
        return show_providers();
    }
    if cli.show_cache_dir {
        return show_cache_dir();
    }
    if cli.list_models {
        return list_models();
    }
    if cli.clear_cache {
        return clear_cache();
    }
    if cli.only_download {
        return download_models(&cli).await;
    }

    process_image(&cli).await
}

fn show_providers() -> Result<()> {
    println!("Execution providers:");
    for (name, available, description) in inference::list_providers() {
        let status = if available { "✅" } else { "❌" };
        println!("  {status} {name:<8} {description}");
    }
    Ok(())
}

fn show_cache_dir() -> Result<()> {
    let cache = ModelCache::new().context("Failed to open model cache")?;
    println!("{}", cache.get_current_cache_dir().display());
    Ok(())
}

fn list_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to open model cache")?;
    let models = cache
        .scan_cached_models()
        .context("Failed to scan model cache")?;

    if models.is_empty() {
        println!("No cached models. Run with --only-download to fetch the defaults.");
        return Ok(());
    }

    println!("Cached models:");
    for info in models {
        let stage = info
            .kind
            .map_or("incomplete".to_string(), |k| k.to_string());
        println!(
            "  {:<50} {:<12} {}",
            info.model_id,
            stage,
            format_size(info.size_bytes)
        );
    }
    Ok(())
}

fn clear_cache() -> Result<()> {
    let cache = ModelCache::new().context("Failed to open model cache")?;
    let removed = cache
        .clear_all_models()
        .context("Failed to clear model cache")?;

    if removed.is_empty() {
        println!("Cache is already empty.");
    } else {
        for model_id in &removed {
            println!("Removed {model_id}");
        }
        println!("Cleared {} model(s).", removed.len());
    }
    Ok(())
}

async fn download_models(cli: &Cli) -> Result<()> {
    let downloader = ModelDownloader::new().context("Failed to create model downloader")?;

    for kind in ModelKind::ALL {
        let arg = match kind {
            ModelKind::Detector => cli.detector_model.as_deref(),
            ModelKind::Segmenter => cli.segmenter_model.as_deref(),
            ModelKind::Inpainter => cli.inpainter_model.as_deref(),
        };
        let url = match arg {
            Some(value) if value.starts_with("https://") => value,
            _ => kind.default_url(),
        };

        let model_id = downloader
            .download_model(kind, url, true)
            .await
            .with_context(|| format!("Failed to download {kind} model"))?;
        println!("{kind}: {model_id}");
    }

    Ok(())
}

async fn process_image(cli: &Cli) -> Result<()> {
    CliConfigBuilder::validate_processing_args(cli)?;
    let config = CliConfigBuilder::build(cli)?;

    let reporter = ConsoleProgressReporter;
    let input = cli
        .input
        .as_deref()
        .context("An input image URL or path is required")?;

    reporter.report(&ProgressUpdate::new(ProcessingStage::ImageLoading));
    let image = if input.starts_with("http://") || input.starts_with("https://") {
        let bytes = fetch_image(input).await?;
        let image = ImageIoService::load_from_bytes(&bytes)?;

        // Persist the fetched source next to the other artifacts
        std::fs::create_dir_all(&cli.output_dir).with_context(|| {
            format!("Failed to create output directory {}", cli.output_dir.display())
        })?;
        let source_path = cli
            .output_dir
            .join(format!("source.{}", config.output_format.extension()));
        ImageIoService::save_image(&image, &source_path, config.output_format, config.jpeg_quality)?;
        println!("Fetched {input} -> {}", source_path.display());
        image
    } else {
        ImageIoService::load_image(input)
            .with_context(|| format!("Failed to load image from {input}"))?
    };

    let find = cli.find.clone().unwrap_or_default();
    let request = EditRequest {
        find: find.clone(),
        replace_with: cli.replace.clone(),
        background: cli.background.clone(),
        negative_prompt: cli.negative.clone(),
    };

    reporter.report(&ProgressUpdate::new(ProcessingStage::Initialization));
    let mut pipeline = InpaintPipeline::new(config.clone());
    pipeline
        .initialize()
        .context("Failed to initialize pipeline (are the models downloaded?)")?;

    reporter.report(&ProgressUpdate::with_message(
        ProcessingStage::Detection,
        find.clone(),
    ));
    let result = pipeline
        .run(&image, &request)
        .with_context(|| format!("Pipeline run failed for '{find}'"))?;

    reporter.report(&ProgressUpdate::new(ProcessingStage::Saving));
    let written = ImageIoService::save_artifacts(
        &result,
        &cli.output_dir,
        config.output_format,
        config.jpeg_quality,
    )?;

    reporter.report(&ProgressUpdate::new(ProcessingStage::Completed));

    println!(
        "Found {} '{}' instance(s); best: '{}' ({:.3})",
        result.detections.len(),
        find,
        result.detections[0].phrase,
        result.detections[0].score
    );
    println!("{}", result.timings().summary());
    for path in written {
        println!("  {}", path.display());
    }

    Ok(())
}
