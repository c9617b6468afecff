#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Grounded Inpaint
//!
//! Text-prompted object editing for images, built on ONNX Runtime: find an
//! object named by a free-text prompt (open-vocabulary detection), cut it out
//! precisely (promptable segmentation), and regenerate the masked region (or
//! everything around it) from a text prompt (diffusion inpainting).
//!
//! The pipeline is strictly linear: each stage's output is the next stage's
//! input, and all three models run as ONNX sessions sharing one execution
//! provider configuration.
//!
//! ## Features
//!
//! - **Open-vocabulary detection**: boxes from free-text prompts with
//!   box/text confidence thresholds and phrase decoding
//! - **Promptable segmentation**: one binary mask per detected box,
//!   boxes-as-prompt, single-mask mode
//! - **Diffusion inpainting**: seeded, deterministic DDIM sampling with
//!   classifier-free guidance over a prompt/negative-prompt pair
//! - **Model management**: automatic downloading and XDG caching of the three
//!   stage models from `HuggingFace`
//! - **Hardware acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **CLI integration**: optional command-line interface (enable with the
//!   `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grounded_inpaint::{
//!     edit_image_from_url, EditRequest, ModelDownloader, PipelineConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Download and cache the three stage models (one-time setup)
//! let downloader = ModelDownloader::new()?;
//! downloader.download_defaults(true).await?;
//!
//! // Replace the detected bench with a sofa
//! let request = EditRequest {
//!     find: "bench".to_string(),
//!     replace_with: Some("A sofa, high quality, detailed".to_string()),
//!     background: None,
//!     negative_prompt: "low resolution, ugly".to_string(),
//! };
//! let config = PipelineConfig::builder().seed(32).build()?;
//!
//! let result = edit_image_from_url(
//!     "https://example.com/bench.png",
//!     &request,
//!     config,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod detector;
pub mod download;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod inpainter;
pub mod mask;
pub mod models;
pub mod pipeline;
pub mod scheduler;
pub mod segmenter;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Public API exports
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{ExecutionProvider, OutputFormat, PipelineConfig, PipelineConfigBuilder};
pub use detector::GroundedDetector;
pub use download::{
    fetch_image, parse_huggingface_url, validate_model_url, ModelDownloader,
};
pub use error::{PipelineError, Result};
pub use geometry::{BoundingBox, PixelBox};
pub use inpainter::DiffusionInpainter;
pub use mask::SegmentationMask;
pub use models::{ModelKind, ModelManager, ModelSource, ModelSpec, StageModels};
pub use pipeline::{EditRequest, InpaintPipeline};
pub use scheduler::DdimScheduler;
pub use segmenter::SamSegmenter;
pub use services::{
    ConsoleProgressReporter, ImageIoService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
pub use types::{Detection, EditResult, ProcessingMetadata, ProcessingTimings};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Edit an image fetched from a URL
///
/// Fetches the image with a short fixed timeout (hard stop on non-success
/// status), decodes it, and runs the full pipeline.
///
/// # Errors
/// - Network failures or non-success HTTP status
/// - Any pipeline stage failure
pub async fn edit_image_from_url(
    url: &str,
    request: &EditRequest,
    config: PipelineConfig,
) -> Result<EditResult> {
    let bytes = fetch_image(url).await?;
    edit_image_from_bytes(&bytes, request, config).await
}

/// Edit an image provided as encoded bytes
///
/// # Errors
/// - Undecodable image data
/// - Any pipeline stage failure
pub async fn edit_image_from_bytes(
    image_bytes: &[u8],
    request: &EditRequest,
    config: PipelineConfig,
) -> Result<EditResult> {
    let image = image::load_from_memory(image_bytes).map_err(|e| {
        PipelineError::processing(format!("Failed to decode image from bytes: {e}"))
    })?;
    edit_image(image, request, config).await
}

/// Edit a pre-loaded `DynamicImage`
///
/// The most flexible entry point for in-memory processing: no network, no
/// file I/O, just the three model stages.
///
/// # Errors
/// - Any pipeline stage failure
pub async fn edit_image(
    image: image::DynamicImage,
    request: &EditRequest,
    config: PipelineConfig,
) -> Result<EditResult> {
    let mut pipeline = InpaintPipeline::new(config);
    pipeline.run(&image, request)
}
