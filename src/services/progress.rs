//! Progress reporting service
//!
//! Separates progress reporting from the pipeline itself so different
//! frontends can render stage updates their own way.

/// Progress stages of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading the three stage models
    Initialization,
    /// Fetching or decoding the source image
    ImageLoading,
    /// Open-vocabulary detection
    Detection,
    /// Promptable segmentation
    Segmentation,
    /// Object inpainting pass
    ObjectInpainting,
    /// Background inpainting pass
    BackgroundInpainting,
    /// Writing artifacts to disk
    Saving,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Initialization => "Loading models",
            Self::ImageLoading => "Loading source image",
            Self::Detection => "Detecting object",
            Self::Segmentation => "Segmenting object",
            Self::ObjectInpainting => "Inpainting object region",
            Self::BackgroundInpainting => "Inpainting background region",
            Self::Saving => "Saving artifacts",
            Self::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(self) -> u8 {
        match self {
            Self::Initialization => 5,
            Self::ImageLoading => 10,
            Self::Detection => 25,
            Self::Segmentation => 40,
            Self::ObjectInpainting => 70,
            Self::BackgroundInpainting => 90,
            Self::Saving => 98,
            Self::Completed => 100,
        }
    }
}

/// Progress update containing stage and message information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: ProcessingStage,
    /// Optional detail line for the stage
    pub message: Option<String>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage) -> Self {
        Self {
            stage,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(stage: ProcessingStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: Some(message.into()),
        }
    }
}

/// Trait for receiving progress updates
pub trait ProgressReporter {
    /// Called whenever the pipeline enters a new stage
    fn report(&self, update: &ProgressUpdate);
}

/// Reporter that logs stages to the console
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter;

impl ProgressReporter for ConsoleProgressReporter {
    fn report(&self, update: &ProgressUpdate) {
        match &update.message {
            Some(message) => log::info!(
                "[{:>3}%] {} - {}",
                update.stage.progress_percentage(),
                update.stage.description(),
                message
            ),
            None => log::info!(
                "[{:>3}%] {}",
                update.stage.progress_percentage(),
                update.stage.description()
            ),
        }
    }
}

/// Reporter that swallows all updates (library embedding)
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report(&self, _update: &ProgressUpdate) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages_increase() {
        let stages = [
            ProcessingStage::Initialization,
            ProcessingStage::ImageLoading,
            ProcessingStage::Detection,
            ProcessingStage::Segmentation,
            ProcessingStage::ObjectInpainting,
            ProcessingStage::BackgroundInpainting,
            ProcessingStage::Saving,
            ProcessingStage::Completed,
        ];
        let percentages: Vec<u8> = stages.iter().map(|s| s.progress_percentage()).collect();
        assert!(percentages.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*percentages.last().unwrap(), 100);
    }

    #[test]
    fn test_descriptions_nonempty() {
        assert!(!ProcessingStage::Detection.description().is_empty());
        assert!(!ProcessingStage::Completed.description().is_empty());
    }

    #[test]
    fn test_update_with_message() {
        let update = ProgressUpdate::with_message(ProcessingStage::Detection, "bench");
        assert_eq!(update.stage, ProcessingStage::Detection);
        assert_eq!(update.message.as_deref(), Some("bench"));

        // No-op reporter must accept any update
        NoOpProgressReporter.report(&update);
    }
}
