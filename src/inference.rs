//! ONNX Runtime session construction shared by all three pipeline stages
//!
//! All sessions go through the same factory: execution provider selection with
//! availability probing, graph optimization, and thread auto-detection. The
//! stage adapters own their sessions; this module only builds them.

use crate::config::{ExecutionProvider, PipelineConfig};
use crate::error::{PipelineError, Result};
use ort::ep::{
    CUDA as CUDAExecutionProvider, CoreML as CoreMLExecutionProvider,
    ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;

/// List all ONNX Runtime execution providers with availability status and descriptions
///
/// Returns a vector of tuples containing provider name, availability, and a
/// short description. Used by the CLI `--show-providers` diagnostics.
#[must_use]
pub fn list_providers() -> Vec<(String, bool, String)> {
    let mut providers = Vec::new();

    log::debug!("Probing execution providers:");
    log::debug!("  - Platform: {os}", os = std::env::consts::OS);
    log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);
    log::debug!(
        "  - CPU cores: {cores}",
        cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1)
    );

    // CPU is always available
    providers.push((
        "CPU".to_string(),
        true,
        "Always available, uses CPU for inference".to_string(),
    ));

    let cuda_available =
        OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
    if cuda_available {
        log::info!("✅ CUDA execution provider is available");
    } else {
        log::debug!("CUDA execution provider is not available");
    }
    providers.push((
        "CUDA".to_string(),
        cuda_available,
        "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
    ));

    let coreml_available =
        OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false);
    if coreml_available {
        log::info!("✅ CoreML execution provider is available");
    } else {
        log::debug!("CoreML execution provider is not available");
    }
    providers.push((
        "CoreML".to_string(),
        coreml_available,
        "Apple Silicon GPU acceleration (macOS only)".to_string(),
    ));

    providers
}

/// Build an ONNX Runtime session for a model file
///
/// Applies the configured execution provider (with availability checking and
/// CPU fallback), Level3 graph optimization, parallel execution, and the
/// configured or auto-detected thread counts.
///
/// # Errors
/// - Session builder or provider configuration failures
/// - Model file missing or not a valid ONNX graph
pub fn create_session(model_path: &Path, config: &PipelineConfig) -> Result<Session> {
    let mut session_builder = Session::builder()
        .map_err(|e| {
            PipelineError::inference(format!("Failed to create session builder: {e}"))
        })?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| {
            PipelineError::inference(format!("Failed to set optimization level: {e}"))
        })?;

    session_builder = match config.execution_provider {
        ExecutionProvider::Auto => {
            // Auto-detect: try CUDA > CoreML > CPU with availability checking
            let mut providers = Vec::new();

            let cuda_provider = CUDAExecutionProvider::default();
            if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                log::info!("🚀 CUDA execution provider is available and will be used");
                providers.push(cuda_provider.build());
            } else {
                log::debug!("CUDA execution provider is not available");
            }

            let coreml_provider = CoreMLExecutionProvider::default();
            if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                log::info!("🍎 CoreML execution provider is available and will be used");
                let coreml_provider = CoreMLExecutionProvider::default().with_subgraphs(true);
                providers.push(coreml_provider.build());
            } else {
                log::debug!("CoreML execution provider is not available");
            }

            if providers.is_empty() {
                log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                session_builder
            } else {
                session_builder
                    .with_execution_providers(providers)
                    .map_err(|e| {
                        PipelineError::inference(format!(
                            "Failed to set auto execution providers: {e}"
                        ))
                    })?
            }
        },
        ExecutionProvider::Cpu => {
            log::info!("Using CPU execution provider");
            session_builder
        },
        ExecutionProvider::Cuda => {
            let cuda_provider = CUDAExecutionProvider::default();
            if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                log::info!("Using CUDA execution provider");
                session_builder
                    .with_execution_providers([cuda_provider.build()])
                    .map_err(|e| {
                        PipelineError::inference(format!(
                            "Failed to set CUDA execution provider: {e}"
                        ))
                    })?
            } else {
                log::warn!(
                    "CUDA execution provider requested but not available, falling back to CPU"
                );
                session_builder
            }
        },
        ExecutionProvider::CoreMl => {
            let coreml_provider = CoreMLExecutionProvider::default();
            if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                let enhanced = CoreMLExecutionProvider::default().with_subgraphs(true);
                session_builder
                    .with_execution_providers([enhanced.build()])
                    .map_err(|e| {
                        PipelineError::inference(format!(
                            "Failed to set CoreML execution provider: {e}"
                        ))
                    })?
            } else {
                log::warn!(
                    "CoreML execution provider requested but not available, falling back to CPU"
                );
                session_builder
            }
        },
    };

    let (intra_threads, inter_threads) = thread_counts(config);

    let session = session_builder
        .with_parallel_execution(true)
        .map_err(|e| PipelineError::inference(format!("Failed to enable parallel execution: {e}")))?
        .with_intra_threads(intra_threads)
        .map_err(|e| PipelineError::inference(format!("Failed to set intra threads: {e}")))?
        .with_inter_threads(inter_threads)
        .map_err(|e| PipelineError::inference(format!("Failed to set inter threads: {e}")))?
        .commit_from_file(model_path)
        .map_err(|e| {
            PipelineError::inference(format!(
                "Failed to create session from '{}': {e}",
                model_path.display()
            ))
        })?;

    log::debug!("✅ ONNX Runtime session created for {}", model_path.display());
    log::debug!(
        "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
    );
    log::debug!("  - Optimization level: Level3");

    Ok(session)
}

/// Resolve configured thread counts, auto-detecting when set to 0
fn thread_counts(config: &PipelineConfig) -> (usize, usize) {
    let cores = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(8);

    let intra = if config.intra_threads > 0 {
        config.intra_threads
    } else {
        // All physical cores for compute-heavy operators
        cores
    };

    let inter = if config.inter_threads > 0 {
        config.inter_threads
    } else {
        // Fewer coordination threads
        (cores / 4).max(1)
    };

    (intra, inter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_providers_always_has_cpu() {
        let providers = list_providers();
        let cpu = providers.iter().find(|(name, _, _)| name == "CPU");
        assert!(cpu.is_some());
        assert!(cpu.unwrap().1, "CPU provider must always be available");
    }

    #[test]
    fn test_thread_counts_auto_detect() {
        let config = PipelineConfig::default();
        let (intra, inter) = thread_counts(&config);
        assert!(intra >= 1);
        assert!(inter >= 1);
    }

    #[test]
    fn test_thread_counts_explicit() {
        let config = PipelineConfig::builder()
            .intra_threads(4)
            .inter_threads(2)
            .build()
            .unwrap();
        assert_eq!(thread_counts(&config), (4, 2));
    }
}
