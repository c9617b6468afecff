//! Model and image downloading
//!
//! Async downloading of the three stage models from `HuggingFace` repositories
//! with progress reporting, integrity verification, and atomic cache placement,
//! plus the single source-image fetch that starts a pipeline run.

use crate::cache::ModelCache;
use crate::error::{PipelineError, Result};
use crate::models::ModelKind;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Timeout for the single source-image fetch
const IMAGE_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(4);

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Set message for progress indicator
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    /// Set length for progress indicator
    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    /// Set position for progress indicator
    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    /// Finish progress indicator with message
    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

impl ModelDownloader {
    /// Create a new model downloader
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // 5 minute timeout
            .build()
            .map_err(|e| PipelineError::network_error("Failed to create HTTP client", e))?;

        let cache = ModelCache::new()?;

        Ok(Self { client, cache })
    }

    /// Create a downloader over an existing cache (custom cache directories)
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| PipelineError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download one stage model from a repository URL into the cache
    ///
    /// Handles URL validation, per-stage file manifests, progress reporting,
    /// and atomic placement (temp directory → final cache location).
    ///
    /// # Errors
    /// - Invalid or unsupported URL format
    /// - Network errors during download
    /// - File system errors during caching
    pub async fn download_model(
        &self,
        kind: ModelKind,
        url: &str,
        show_progress: bool,
    ) -> Result<String> {
        validate_model_url(url)?;
        let model_id = ModelCache::url_to_model_id(url);
        log::info!("Downloading {} model from: {}", kind, url);
        log::info!("Model ID: {}", model_id);

        if self.cache.is_model_cached(&model_id) {
            log::info!("Model already cached: {}", model_id);
            return Ok(model_id);
        }

        let temp_dir = Self::create_temp_download_dir(&model_id)?;
        let final_dir = self.cache.get_model_path(&model_id);

        let progress = if show_progress {
            Some(Self::create_progress_indicator())
        } else {
            None
        };

        match self
            .download_model_files(kind, url, &temp_dir, progress.as_ref())
            .await
        {
            Ok(()) => {
                // Atomic move from temp to final location
                if final_dir.exists() {
                    fs::remove_dir_all(&final_dir).map_err(|e| {
                        PipelineError::file_io_error(
                            "remove existing model directory",
                            &final_dir,
                            &e,
                        )
                    })?;
                }

                fs::rename(&temp_dir, &final_dir).map_err(|e| {
                    PipelineError::file_io_error("move downloaded model to cache", &final_dir, &e)
                })?;

                if let Some(pb) = progress {
                    pb.finish_with_message(format!("✅ Downloaded {model_id}"));
                }

                log::info!("Successfully downloaded model: {}", model_id);
                Ok(model_id)
            },
            Err(e) => {
                // Cleanup temp directory on failure
                if temp_dir.exists() {
                    if let Err(cleanup_err) = fs::remove_dir_all(&temp_dir) {
                        log::warn!("Failed to cleanup temp directory: {}", cleanup_err);
                    }
                }

                if let Some(pb) = progress {
                    pb.finish_with_message("❌ Download failed".to_string());
                }

                Err(e)
            },
        }
    }

    /// Download the default model of every pipeline stage
    ///
    /// # Errors
    /// - Any single stage download failing aborts the whole operation
    pub async fn download_defaults(&self, show_progress: bool) -> Result<Vec<String>> {
        let mut model_ids = Vec::with_capacity(ModelKind::ALL.len());
        for kind in ModelKind::ALL {
            let model_id = self
                .download_model(kind, kind.default_url(), show_progress)
                .await?;
            model_ids.push(model_id);
        }
        Ok(model_ids)
    }

    /// Create a temporary directory for downloading
    fn create_temp_download_dir(model_id: &str) -> Result<PathBuf> {
        let temp_dir = std::env::temp_dir().join(format!("grounded-inpaint-{model_id}"));

        if temp_dir.exists() {
            fs::remove_dir_all(&temp_dir).map_err(|e| {
                PipelineError::file_io_error("remove existing temp directory", &temp_dir, &e)
            })?;
        }

        fs::create_dir_all(&temp_dir)
            .map_err(|e| PipelineError::file_io_error("create temp directory", &temp_dir, &e))?;

        Ok(temp_dir)
    }

    /// Create a progress indicator for download reporting
    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(100);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Download every file of a stage's manifest
    async fn download_model_files(
        &self,
        kind: ModelKind,
        base_url: &str,
        download_dir: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        let raw_base = format!("{base_url}/resolve/main/");

        for file_name in kind.required_files() {
            let file_url = format!("{raw_base}{file_name}");
            let local_path = download_dir.join(file_name);

            if let Some(pb) = progress {
                pb.set_message(format!("Downloading {file_name}"));
            }

            self.download_file(&file_url, &local_path, progress).await?;
        }

        Ok(())
    }

    /// Download a single file with progress reporting
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PipelineError::file_io_error("create directory", parent, &e))?;
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::network_error(&format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(PipelineError::network_error(
                "Download failed",
                format!("HTTP error {} for {url}", response.status()),
            ));
        }

        let total_size = response.content_length();

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| PipelineError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| PipelineError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break; // EOF
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| PipelineError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;

            if let Some(pb) = progress {
                if let Some(total) = total_size {
                    pb.set_length(total);
                    pb.set_position(downloaded);
                } else {
                    pb.set_message(format!(
                        "Downloaded {:.1} MB",
                        downloaded as f64 / 1_024_000.0
                    ));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| PipelineError::file_io_error("flush file", local_path, &e))?;

        log::debug!(
            "Downloaded {} bytes to {}",
            downloaded,
            local_path.display()
        );
        Ok(())
    }

    /// Verify the integrity of a downloaded file using SHA256
    ///
    /// # Errors
    /// - File cannot be read
    pub fn verify_file_integrity(
        &self,
        file_path: &Path,
        expected_hash: Option<&str>,
    ) -> Result<bool> {
        let Some(expected) = expected_hash else {
            // No hash provided, skip verification
            return Ok(true);
        };

        let contents = fs::read(file_path).map_err(|e| {
            PipelineError::file_io_error("read file for verification", file_path, &e)
        })?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let actual_hash = format!("{:x}", hasher.finalize());

        if actual_hash == expected {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual_hash
            );
            Ok(false)
        }
    }

    /// Get the model cache for other operations
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Fetch the source image for a pipeline run
///
/// One HTTP GET with a short fixed timeout. A non-success status is a hard
/// error; there is no retry.
///
/// # Errors
/// - Request construction or transport failures
/// - Non-success HTTP status
pub async fn fetch_image(url: &str) -> Result<Vec<u8>> {
    let client = Client::builder()
        .timeout(IMAGE_FETCH_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::network_error("Failed to create HTTP client", e))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PipelineError::network_error(&format!("Failed to fetch image {url}"), e))?;

    if !response.status().is_success() {
        return Err(PipelineError::network_error(
            "Image fetch failed",
            format!("status code {} for {url}", response.status()),
        ));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::network_error("Failed to read image body", e))?;

    log::info!("Fetched {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

/// Validate that a URL is a supported model repository
///
/// Currently only `HuggingFace` repositories are supported.
///
/// # Errors
/// - Empty URL, non-`HuggingFace` host, or missing repository path
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(PipelineError::invalid_config("Model URL cannot be empty"));
    }

    if !url.starts_with("https://huggingface.co/") {
        return Err(PipelineError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories are supported (https://huggingface.co/...)"
        )));
    }

    let repo_path = url.strip_prefix("https://huggingface.co/").unwrap_or("");
    if repo_path.is_empty() || !repo_path.contains('/') {
        return Err(PipelineError::invalid_config(format!(
            "Invalid HuggingFace repository URL: {url}. Expected format: https://huggingface.co/username/repo-name"
        )));
    }

    Ok(())
}

/// Parse a `HuggingFace` URL and extract (owner, repository) names
///
/// # Errors
/// - URL fails `validate_model_url`
pub fn parse_huggingface_url(url: &str) -> Result<(String, String)> {
    validate_model_url(url)?;

    let repo_path = url.strip_prefix("https://huggingface.co/").unwrap_or("");
    let mut parts = repo_path.splitn(2, '/');
    let owner = parts.next().unwrap_or("").to_string();
    let repo = parts
        .next()
        .unwrap_or("")
        .trim_end_matches('/')
        .to_string();

    if owner.is_empty() || repo.is_empty() {
        return Err(PipelineError::invalid_config(format!(
            "Could not extract owner/repository from URL: {url}"
        )));
    }

    Ok((owner, repo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_model_url() {
        assert!(validate_model_url("https://huggingface.co/Xenova/sam-vit-base").is_ok());
        assert!(validate_model_url("").is_err());
        assert!(validate_model_url("https://example.com/model").is_err());
        assert!(validate_model_url("https://huggingface.co/no-repo").is_err());
    }

    #[test]
    fn test_parse_huggingface_url() {
        let (owner, repo) =
            parse_huggingface_url("https://huggingface.co/onnx-community/grounding-dino-tiny-ONNX")
                .unwrap();
        assert_eq!(owner, "onnx-community");
        assert_eq!(repo, "grounding-dino-tiny-ONNX");

        let (owner, repo) =
            parse_huggingface_url("https://huggingface.co/Xenova/sam-vit-base/").unwrap();
        assert_eq!(owner, "Xenova");
        assert_eq!(repo, "sam-vit-base");
    }

    #[test]
    fn test_create_temp_download_dir() {
        let temp_dir = ModelDownloader::create_temp_download_dir("test--model").unwrap();
        assert!(temp_dir.exists());
        assert!(temp_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("test--model"));
        fs::remove_dir_all(&temp_dir).unwrap();
    }

    #[test]
    fn test_create_temp_download_dir_cleans_existing() {
        let temp_dir = ModelDownloader::create_temp_download_dir("test--stale").unwrap();
        fs::write(temp_dir.join("leftover.bin"), b"stale").unwrap();

        let recreated = ModelDownloader::create_temp_download_dir("test--stale").unwrap();
        assert!(recreated.exists());
        assert!(!recreated.join("leftover.bin").exists());
        fs::remove_dir_all(&recreated).unwrap();
    }

    #[test]
    fn test_verify_file_integrity() {
        let downloader = ModelDownloader::new().unwrap();
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"model contents").unwrap();

        // No hash provided skips verification
        assert!(downloader
            .verify_file_integrity(temp.path(), None)
            .unwrap());

        let mut hasher = Sha256::new();
        hasher.update(b"model contents");
        let good_hash = format!("{:x}", hasher.finalize());
        assert!(downloader
            .verify_file_integrity(temp.path(), Some(&good_hash))
            .unwrap());
        assert!(!downloader
            .verify_file_integrity(temp.path(), Some("deadbeef"))
            .unwrap());
    }

    #[test]
    fn test_progress_indicator_no_op() {
        let indicator = ProgressIndicator::NoOp;
        indicator.set_message("msg".to_string());
        indicator.set_length(100);
        indicator.set_position(50);
        indicator.finish_with_message("done".to_string());
    }
}
