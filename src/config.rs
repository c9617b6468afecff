//! Configuration types for the object editing pipeline

use crate::error::{PipelineError, Result};
use crate::models::StageModels;
use serde::{Deserialize, Serialize};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration (Metal Performance Shaders)
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        // Default to auto-detection for best performance
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(PipelineError::invalid_config(format!(
                "Unknown execution provider '{other}'. Valid: auto, cpu, cuda, coreml"
            ))),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// PNG (lossless)
    Png,
    /// JPEG with configurable quality
    Jpeg,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Jpeg
    }
}

impl OutputFormat {
    /// File extension for this format
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Complete configuration for the editing pipeline
///
/// Collects the knobs of all three stages: detection thresholds, diffusion
/// sampling parameters, session/provider settings, and output encoding.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model specifications for the three pipeline stages
    pub models: StageModels,

    /// Execution provider for all ONNX sessions
    pub execution_provider: ExecutionProvider,

    /// Minimum detection confidence for a box to survive
    pub box_threshold: f32,

    /// Minimum token confidence for a word to join the detected phrase
    pub text_threshold: f32,

    /// Number of denoising steps for the inpainting stage
    pub inference_steps: usize,

    /// Classifier-free guidance scale
    pub guidance_scale: f32,

    /// Seed for the latent noise generator
    pub seed: u64,

    /// Use a random overlay color instead of the fixed default
    pub random_overlay_color: bool,

    /// Output format for written artifacts
    pub output_format: OutputFormat,

    /// JPEG quality (0-100)
    pub jpeg_quality: u8,

    /// Number of intra-op threads (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads (0 = auto)
    pub inter_threads: usize,

    /// Enable debug mode (keeps intermediate tensors in logs)
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            models: StageModels::default(),
            execution_provider: ExecutionProvider::Auto,
            box_threshold: 0.3,
            text_threshold: 0.25,
            inference_steps: 30,
            guidance_scale: 7.5,
            seed: 32,
            random_overlay_color: false,
            output_format: OutputFormat::Jpeg,
            jpeg_quality: 90,
            intra_threads: 0,
            inter_threads: 0,
            debug: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

/// Builder for `PipelineConfig`
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn models(mut self, models: StageModels) -> Self {
        self.config.models = models;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn box_threshold(mut self, threshold: f32) -> Self {
        self.config.box_threshold = threshold;
        self
    }

    #[must_use]
    pub fn text_threshold(mut self, threshold: f32) -> Self {
        self.config.text_threshold = threshold;
        self
    }

    #[must_use]
    pub fn inference_steps(mut self, steps: usize) -> Self {
        self.config.inference_steps = steps;
        self
    }

    #[must_use]
    pub fn guidance_scale(mut self, scale: f32) -> Self {
        self.config.guidance_scale = scale;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    #[must_use]
    pub fn random_overlay_color(mut self, random: bool) -> Self {
        self.config.random_overlay_color = random;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(0, 100);
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the pipeline configuration
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidConfig` for:
    /// - Thresholds outside (0, 1]
    /// - Zero inference steps or more steps than the 1000-step training schedule
    /// - Guidance scale below 1.0
    pub fn build(self) -> Result<PipelineConfig> {
        let c = &self.config;
        if !(c.box_threshold > 0.0 && c.box_threshold <= 1.0) {
            return Err(PipelineError::invalid_config(format!(
                "box_threshold must be in (0, 1], got {}",
                c.box_threshold
            )));
        }
        if !(c.text_threshold > 0.0 && c.text_threshold <= 1.0) {
            return Err(PipelineError::invalid_config(format!(
                "text_threshold must be in (0, 1], got {}",
                c.text_threshold
            )));
        }
        if c.inference_steps == 0 || c.inference_steps > 1000 {
            return Err(PipelineError::invalid_config(format!(
                "inference_steps must be in 1..=1000, got {}",
                c.inference_steps
            )));
        }
        if c.guidance_scale < 1.0 {
            return Err(PipelineError::invalid_config(format!(
                "guidance_scale must be >= 1.0, got {}",
                c.guidance_scale
            )));
        }

        Ok(self.config)
    }
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
