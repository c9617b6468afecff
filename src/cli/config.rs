//! CLI argument to pipeline configuration conversion

use crate::cache::ModelCache;
use crate::config::{ExecutionProvider, OutputFormat, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::models::{ModelKind, ModelSource, ModelSpec, StageModels};
use std::path::Path;
use std::str::FromStr;

use super::main_impl::{Cli, CliOutputFormat};

/// Builds a `PipelineConfig` from parsed CLI arguments
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Convert CLI arguments into a validated pipeline configuration
    ///
    /// # Errors
    /// - Invalid execution provider string
    /// - Threshold/step validation failures
    pub(crate) fn build(cli: &Cli) -> Result<PipelineConfig> {
        let execution_provider = ExecutionProvider::from_str(&cli.execution_provider)?;

        let models = StageModels {
            detector: Self::resolve_model_spec(ModelKind::Detector, cli.detector_model.as_deref()),
            segmenter: Self::resolve_model_spec(
                ModelKind::Segmenter,
                cli.segmenter_model.as_deref(),
            ),
            inpainter: Self::resolve_model_spec(
                ModelKind::Inpainter,
                cli.inpainter_model.as_deref(),
            ),
        };

        PipelineConfig::builder()
            .models(models)
            .execution_provider(execution_provider)
            .box_threshold(cli.box_threshold)
            .text_threshold(cli.text_threshold)
            .inference_steps(cli.steps)
            .guidance_scale(cli.guidance)
            .seed(cli.seed)
            .random_overlay_color(cli.random_overlay_color)
            .output_format(cli.format.into())
            .jpeg_quality(cli.jpeg_quality)
            .intra_threads(cli.threads)
            .inter_threads(if cli.threads > 0 {
                (cli.threads / 4).max(1)
            } else {
                0
            })
            .debug(cli.verbose >= 2)
            .build()
    }

    /// Resolve a model argument: filesystem path, repository URL, or cache ID
    fn resolve_model_spec(kind: ModelKind, value: Option<&str>) -> ModelSpec {
        match value {
            None => ModelSpec::default_for(kind),
            Some(value) if Path::new(value).exists() => ModelSpec {
                source: ModelSource::External(Path::new(value).to_path_buf()),
            },
            Some(value) if value.starts_with("https://") => ModelSpec {
                source: ModelSource::Downloaded(ModelCache::url_to_model_id(value)),
            },
            Some(value) => ModelSpec {
                source: ModelSource::Downloaded(value.to_string()),
            },
        }
    }

    /// Validate mutually dependent processing arguments
    ///
    /// # Errors
    /// - Missing detection prompt when an input image is given
    pub(crate) fn validate_processing_args(cli: &Cli) -> Result<()> {
        if cli.find.as_deref().map_or(true, |f| f.trim().is_empty()) {
            return Err(PipelineError::invalid_config(
                "--find <PROMPT> is required to process an image",
            ));
        }
        Ok(())
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => Self::Png,
            CliOutputFormat::Jpeg => Self::Jpeg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_spec_default() {
        let spec = CliConfigBuilder::resolve_model_spec(ModelKind::Detector, None);
        assert_eq!(spec, ModelSpec::default_for(ModelKind::Detector));
    }

    #[test]
    fn test_resolve_model_spec_url() {
        let spec = CliConfigBuilder::resolve_model_spec(
            ModelKind::Segmenter,
            Some("https://huggingface.co/Xenova/sam-vit-base"),
        );
        assert_eq!(
            spec.source,
            ModelSource::Downloaded("Xenova--sam-vit-base".to_string())
        );
    }

    #[test]
    fn test_resolve_model_spec_path() {
        let dir = tempfile::tempdir().unwrap();
        let path_str = dir.path().to_string_lossy().to_string();
        let spec = CliConfigBuilder::resolve_model_spec(ModelKind::Inpainter, Some(&path_str));
        assert!(matches!(spec.source, ModelSource::External(_)));
    }

    #[test]
    fn test_resolve_model_spec_cache_id() {
        let spec = CliConfigBuilder::resolve_model_spec(
            ModelKind::Detector,
            Some("onnx-community--grounding-dino-tiny-ONNX"),
        );
        assert_eq!(
            spec.source,
            ModelSource::Downloaded("onnx-community--grounding-dino-tiny-ONNX".to_string())
        );
    }

    #[test]
    fn test_output_format_conversion() {
        assert_eq!(OutputFormat::from(CliOutputFormat::Png), OutputFormat::Png);
        assert_eq!(OutputFormat::from(CliOutputFormat::Jpeg), OutputFormat::Jpeg);
    }
}
