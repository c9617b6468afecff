//! Model cache management for downloaded models
//!
//! Cached models live in an XDG-compliant directory, one subdirectory per
//! model ID. A directory is considered valid when it carries every file the
//! matching pipeline stage requires.

use crate::error::{PipelineError, Result};
use crate::models::ModelKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Pipeline stage whose file manifest this directory satisfies
    pub kind: Option<ModelKind>,
    /// Estimated size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache manager
    ///
    /// Uses XDG Base Directory specification for cache location:
    /// - Linux/macOS: `~/.cache/grounded-inpaint/models/`
    /// - Windows: `%LOCALAPPDATA%/grounded-inpaint/models/`
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                PipelineError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    /// Get the XDG-compliant cache directory path
    fn get_cache_dir() -> Result<PathBuf> {
        // Environment variable override first
        if let Ok(cache_override) = std::env::var("GROUNDED_INPAINT_CACHE_DIR") {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                PipelineError::invalid_config(
                    "Failed to determine cache directory. Set GROUNDED_INPAINT_CACHE_DIR.",
                )
            })?
            .join("grounded-inpaint")
            .join("models"))
    }

    /// Generate a model ID from a URL
    ///
    /// Converts URLs like `<https://huggingface.co/Xenova/sam-vit-base>`
    /// to cache-safe identifiers like `Xenova--sam-vit-base`.
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if url.starts_with(prefix) {
            url.get(prefix.len()..).unwrap_or(url).replace('/', "--")
        } else {
            // Non-HuggingFace URLs get a hash-based identifier
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let hash_string = format!("url-{:x}", hasher.finalize());
            hash_string.get(..16).unwrap_or(&hash_string).to_string()
        }
    }

    /// Check if a model is cached and complete
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        let model_path = self.cache_dir.join(model_id);
        model_path.exists() && Self::directory_kind(&model_path).is_some()
    }

    /// Get the path to a cached model directory (may not exist)
    #[must_use]
    pub fn get_model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Determine which stage manifest a model directory satisfies, if any
    fn directory_kind(model_path: &Path) -> Option<ModelKind> {
        ModelKind::ALL.into_iter().find(|kind| {
            kind.required_files()
                .iter()
                .all(|file| model_path.join(file).exists())
        })
    }

    /// Scan the cache directory and return all available models
    ///
    /// Used by the `--list-models` functionality.
    ///
    /// # Errors
    /// - Failed to read cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            PipelineError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                PipelineError::file_io_error("read cache entry", &self.cache_dir, &e)
            })?;

            let path = entry.path();
            if path.is_dir() {
                if let Some(info) = Self::analyze_model_directory(&path)? {
                    models.push(info);
                }
            }
        }

        // Sort by model ID for consistent output
        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    fn analyze_model_directory(model_path: &Path) -> Result<Option<CachedModelInfo>> {
        let model_id = model_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                PipelineError::invalid_config(format!(
                    "Invalid model directory name: {}",
                    model_path.display()
                ))
            })?
            .to_string();

        let kind = Self::directory_kind(model_path);
        if kind.is_none() {
            log::debug!("Skipping incomplete model directory: {}", model_path.display());
        }

        let size_bytes = Self::calculate_directory_size(model_path).unwrap_or(0);

        Ok(Some(CachedModelInfo {
            model_id,
            path: model_path.to_path_buf(),
            kind,
            size_bytes,
        }))
    }

    fn calculate_directory_size(dir_path: &Path) -> Result<u64> {
        let mut total_size = 0;
        Self::visit_dir(dir_path, &mut total_size)
            .map_err(|e| PipelineError::file_io_error("calculate directory size", dir_path, &e))?;
        Ok(total_size)
    }

    fn visit_dir(dir: &Path, total: &mut u64) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::visit_dir(&path, total)?;
            } else {
                *total += entry.metadata()?.len();
            }
        }
        Ok(())
    }

    /// Clear all cached models
    ///
    /// # Returns
    /// Vector of removed model IDs for user feedback
    ///
    /// # Errors
    /// - Failed to access cache directory
    /// - Failed to remove model directories
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed_models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(removed_models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            PipelineError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                PipelineError::file_io_error("read cache entry", &self.cache_dir, &e)
            })?;

            let path = entry.path();
            if path.is_dir() {
                let model_id = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("unknown");

                log::info!("Removing cached model: {}", model_id);
                fs::remove_dir_all(&path).map_err(|e| {
                    PipelineError::file_io_error("remove cached model directory", &path, &e)
                })?;
                removed_models.push(model_id.to_string());
            }
        }

        Ok(removed_models)
    }

    /// Clear a specific cached model
    ///
    /// # Returns
    /// `true` if the model was found and removed, `false` if it was not cached
    ///
    /// # Errors
    /// - Failed to remove model directory
    pub fn clear_specific_model(&self, model_id: &str) -> Result<bool> {
        let model_path = self.get_model_path(model_id);

        if !model_path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model_id);
        fs::remove_dir_all(&model_path).map_err(|e| {
            PipelineError::file_io_error("remove cached model", &model_path, &e)
        })?;

        Ok(true)
    }

    /// Create a new model cache with a custom cache directory
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let models_dir = cache_dir.join("models");

        if !models_dir.exists() {
            fs::create_dir_all(&models_dir).map_err(|e| {
                PipelineError::file_io_error("create custom cache directory", &models_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: models_dir,
        })
    }

    /// Get the current cache directory path
    #[must_use]
    pub fn get_current_cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate_model(cache: &ModelCache, model_id: &str, kind: ModelKind) {
        let model_dir = cache.get_model_path(model_id);
        for file in kind.required_files() {
            let path = model_dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"model-bytes").unwrap();
        }
    }

    #[test]
    fn test_url_to_model_id_huggingface() {
        let id = ModelCache::url_to_model_id("https://huggingface.co/Xenova/sam-vit-base");
        assert_eq!(id, "Xenova--sam-vit-base");
    }

    #[test]
    fn test_url_to_model_id_other() {
        let id = ModelCache::url_to_model_id("https://example.com/some/model");
        assert!(id.starts_with("url-"));
        assert_eq!(id.len(), 16);
    }

    #[test]
    fn test_cache_roundtrip() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();

        assert!(!cache.is_model_cached("Xenova--sam-vit-base"));
        populate_model(&cache, "Xenova--sam-vit-base", ModelKind::Segmenter);
        assert!(cache.is_model_cached("Xenova--sam-vit-base"));

        let scanned = cache.scan_cached_models().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].kind, Some(ModelKind::Segmenter));
        assert!(scanned[0].size_bytes > 0);
    }

    #[test]
    fn test_incomplete_model_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();

        let model_dir = cache.get_model_path("partial");
        fs::create_dir_all(model_dir.join("onnx")).unwrap();
        fs::write(model_dir.join("tokenizer.json"), b"{}").unwrap();

        assert!(!cache.is_model_cached("partial"));

        let scanned = cache.scan_cached_models().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].kind, None);
    }

    #[test]
    fn test_clear_specific_model() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        populate_model(&cache, "model-a", ModelKind::Detector);
        populate_model(&cache, "model-b", ModelKind::Segmenter);

        assert!(cache.clear_specific_model("model-a").unwrap());
        assert!(!cache.clear_specific_model("model-a").unwrap());
        assert!(cache.is_model_cached("model-b"));
    }

    #[test]
    fn test_clear_all_models() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        populate_model(&cache, "model-a", ModelKind::Detector);
        populate_model(&cache, "model-b", ModelKind::Inpainter);

        let mut removed = cache.clear_all_models().unwrap();
        removed.sort();
        assert_eq!(removed, vec!["model-a", "model-b"]);
        assert!(cache.scan_cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
