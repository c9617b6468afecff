//! Model specifications and on-disk resolution for the three pipeline stages

use crate::cache::ModelCache;
use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};

/// Model source specification
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelSource {
    /// External model from filesystem path
    External(PathBuf),
    /// Downloaded model from cache by model ID
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => {
                format!("cached:{model_id}")
            },
        }
    }
}

/// The three model roles in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    /// Open-vocabulary object detector (Grounding DINO)
    Detector,
    /// Promptable segmentation model (SAM encoder + decoder)
    Segmenter,
    /// Diffusion inpainting model (text encoder, UNet, VAE pair)
    Inpainter,
}

impl ModelKind {
    /// All pipeline model kinds in stage order
    pub const ALL: [ModelKind; 3] = [Self::Detector, Self::Segmenter, Self::Inpainter];

    /// Default `HuggingFace` repository for this model kind
    #[must_use]
    pub fn default_url(self) -> &'static str {
        match self {
            Self::Detector => "https://huggingface.co/onnx-community/grounding-dino-tiny-ONNX",
            Self::Segmenter => "https://huggingface.co/Xenova/sam-vit-base",
            Self::Inpainter => "https://huggingface.co/onnx-community/stable-diffusion-2-inpainting",
        }
    }

    /// Repository-relative files required for this model kind
    #[must_use]
    pub fn required_files(self) -> &'static [&'static str] {
        match self {
            Self::Detector => &["onnx/model.onnx", "tokenizer.json"],
            Self::Segmenter => &[
                "onnx/vision_encoder.onnx",
                "onnx/prompt_encoder_mask_decoder.onnx",
            ],
            Self::Inpainter => &[
                "text_encoder/model.onnx",
                "unet/model.onnx",
                "vae_encoder/model.onnx",
                "vae_decoder/model.onnx",
                "tokenizer/tokenizer.json",
            ],
        }
    }

    /// Cache identifier of the default repository
    #[must_use]
    pub fn default_model_id(self) -> String {
        ModelCache::url_to_model_id(self.default_url())
    }

    /// Short name for logging and progress output
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Detector => "detector",
            Self::Segmenter => "segmenter",
            Self::Inpainter => "inpainter",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete model specification for one stage
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
}

impl ModelSpec {
    /// Spec pointing at the cached default model for a kind
    #[must_use]
    pub fn default_for(kind: ModelKind) -> Self {
        Self {
            source: ModelSource::Downloaded(kind.default_model_id()),
        }
    }
}

/// Model specifications for all three pipeline stages
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageModels {
    pub detector: ModelSpec,
    pub segmenter: ModelSpec,
    pub inpainter: ModelSpec,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            detector: ModelSpec::default_for(ModelKind::Detector),
            segmenter: ModelSpec::default_for(ModelKind::Segmenter),
            inpainter: ModelSpec::default_for(ModelKind::Inpainter),
        }
    }
}

impl StageModels {
    /// Spec for a given model kind
    #[must_use]
    pub fn spec(&self, kind: ModelKind) -> &ModelSpec {
        match kind {
            ModelKind::Detector => &self.detector,
            ModelKind::Segmenter => &self.segmenter,
            ModelKind::Inpainter => &self.inpainter,
        }
    }
}

/// Resolves a stage's model spec to verified on-disk file paths
#[derive(Debug)]
pub struct ModelManager {
    kind: ModelKind,
    base_dir: PathBuf,
}

impl ModelManager {
    /// Create a manager for the given stage from its spec
    ///
    /// # Errors
    /// - Cache directory cannot be determined (downloaded models)
    /// - Model directory missing or incomplete
    pub fn from_spec(kind: ModelKind, spec: &ModelSpec) -> Result<Self> {
        let base_dir = match &spec.source {
            ModelSource::External(path) => path.clone(),
            ModelSource::Downloaded(model_id) => {
                let cache = ModelCache::new()?;
                if !cache.is_model_cached(model_id) {
                    return Err(PipelineError::model(format!(
                        "{kind} model '{model_id}' is not cached. Run with --only-download first \
                         or pass a model directory.",
                    )));
                }
                cache.get_model_path(model_id)
            },
        };

        let manager = Self { kind, base_dir };
        manager.verify_files()?;
        Ok(manager)
    }

    fn verify_files(&self) -> Result<()> {
        for file in self.kind.required_files() {
            let path = self.base_dir.join(file);
            if !path.exists() {
                return Err(PipelineError::model(format!(
                    "{} model is missing required file '{}' under '{}'",
                    self.kind,
                    file,
                    self.base_dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Model kind this manager resolves
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Absolute path of a repository-relative model file
    ///
    /// # Errors
    /// - File not present in the model directory
    pub fn file_path(&self, relative: &str) -> Result<PathBuf> {
        let path = self.base_dir.join(relative);
        if !path.exists() {
            return Err(PipelineError::model(format!(
                "{} model file '{}' not found under '{}'",
                self.kind,
                relative,
                self.base_dir.display()
            )));
        }
        Ok(path)
    }

    /// Load a repository-relative model file into memory
    ///
    /// # Errors
    /// - File missing or unreadable
    pub fn load_file(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.file_path(relative)?;
        std::fs::read(&path)
            .map_err(|e| PipelineError::file_io_error("read model file", &path, &e))
    }

    /// Total size of the resolved model directory in bytes
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        dir_size(&self.base_dir)
    }
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_specs_point_at_cache() {
        let models = StageModels::default();
        for kind in ModelKind::ALL {
            match &models.spec(kind).source {
                ModelSource::Downloaded(id) => assert_eq!(id, &kind.default_model_id()),
                ModelSource::External(_) => panic!("default spec should be Downloaded"),
            }
        }
    }

    #[test]
    fn test_default_model_ids_are_cache_safe() {
        for kind in ModelKind::ALL {
            let id = kind.default_model_id();
            assert!(!id.contains('/'), "id '{id}' must be filesystem-safe");
        }
    }

    #[test]
    fn test_required_files_nonempty() {
        for kind in ModelKind::ALL {
            assert!(!kind.required_files().is_empty());
        }
        // The inpainter is a multi-session model
        assert!(ModelKind::Inpainter.required_files().len() >= 4);
    }

    #[test]
    fn test_source_display_name() {
        let source = ModelSource::Downloaded("xenova--sam-vit-base".to_string());
        assert_eq!(source.display_name(), "cached:xenova--sam-vit-base");

        let source = ModelSource::External(PathBuf::from("/models/sam"));
        assert_eq!(source.display_name(), "external:sam");
    }

    #[test]
    fn test_external_manager_rejects_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ModelSpec {
            source: ModelSource::External(dir.path().to_path_buf()),
        };
        let result = ModelManager::from_spec(ModelKind::Detector, &spec);
        assert!(matches!(result, Err(PipelineError::Model(_))));
    }

    #[test]
    fn test_external_manager_resolves_files() {
        let dir = tempfile::tempdir().unwrap();
        for file in ModelKind::Detector.required_files() {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"stub").unwrap();
        }

        let spec = ModelSpec {
            source: ModelSource::External(dir.path().to_path_buf()),
        };
        let manager = ModelManager::from_spec(ModelKind::Detector, &spec).unwrap();
        assert_eq!(manager.kind(), ModelKind::Detector);
        assert_eq!(manager.load_file("tokenizer.json").unwrap(), b"stub");
        assert!(manager.size_bytes() > 0);
    }
}
