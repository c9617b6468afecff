//! Core result types for pipeline runs

use crate::geometry::BoundingBox;
use crate::mask::SegmentationMask;
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// One detected object instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Normalized center-size box
    pub bbox: BoundingBox,
    /// Detection confidence
    pub score: f32,
    /// Phrase decoded from the prompt tokens that fired for this box
    pub phrase: String,
}

/// Timing breakdown of a pipeline run (milliseconds)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image decode time
    pub decode_ms: u64,
    /// Detection stage (preprocessing + inference + postprocessing)
    pub detection_ms: u64,
    /// Segmentation stage (embedding + per-box decoding)
    pub segmentation_ms: u64,
    /// Inpainting stage, summed over both passes
    pub inpainting_ms: u64,
    /// Artifact encoding time, when measured
    pub encode_ms: Option<u64>,
    /// End-to-end wall time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// One-line summary for logs and CLI output
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Detect: {}ms | Segment: {}ms | Inpaint: {}ms",
            self.total_ms,
            self.decode_ms,
            self.detection_ms,
            self.segmentation_ms,
            self.inpainting_ms
        );
        if let Some(encode_ms) = self.encode_ms {
            summary.push_str(&format!(" | Encode: {encode_ms}ms"));
        }
        summary
    }
}

/// Metadata describing how a result was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Detector model identifier
    pub detector_model: String,
    /// Segmenter model identifier
    pub segmenter_model: String,
    /// Inpainter model identifier
    pub inpainter_model: String,
    /// Seed used for the latent noise generator
    pub seed: u64,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
    /// Stage timing breakdown
    pub timings: ProcessingTimings,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(detector: String, segmenter: String, inpainter: String, seed: u64) -> Self {
        Self {
            detector_model: detector,
            segmenter_model: segmenter,
            inpainter_model: inpainter,
            seed,
            completed_at: Utc::now(),
            timings: ProcessingTimings::default(),
        }
    }
}

/// Result of a full pipeline run
///
/// Carries every artifact of the fixed output sequence: the annotated
/// detection frame, the mask overlay, both masks, and the generated edits.
#[derive(Debug, Clone)]
pub struct EditResult {
    /// Detections that survived the thresholds
    pub detections: Vec<Detection>,
    /// Source image with detection boxes drawn on it
    pub annotated: RgbImage,
    /// Source image with the translucent mask overlay
    pub overlay: RgbaImage,
    /// Object mask from the top detection
    pub mask: SegmentationMask,
    /// Inverted object mask (background)
    pub inverted_mask: SegmentationMask,
    /// Object replaced by the edit prompt (when requested)
    pub object_edit: Option<DynamicImage>,
    /// Background replaced by the background prompt (when requested)
    pub background_edit: Option<DynamicImage>,
    /// Original image dimensions
    pub original_dimensions: (u32, u32),
    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl EditResult {
    /// Get detailed timing breakdown
    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// Get original image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.original_dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_summary_contains_stages() {
        let timings = ProcessingTimings {
            decode_ms: 10,
            detection_ms: 200,
            segmentation_ms: 300,
            inpainting_ms: 4000,
            encode_ms: Some(15),
            total_ms: 4525,
        };
        let summary = timings.summary();
        assert!(summary.contains("Total: 4525ms"));
        assert!(summary.contains("Detect: 200ms"));
        assert!(summary.contains("Encode: 15ms"));
    }

    #[test]
    fn test_timing_summary_without_encode() {
        let summary = ProcessingTimings::default().summary();
        assert!(!summary.contains("Encode"));
    }

    #[test]
    fn test_metadata_records_seed() {
        let metadata = ProcessingMetadata::new(
            "detector".to_string(),
            "segmenter".to_string(),
            "inpainter".to_string(),
            32,
        );
        assert_eq!(metadata.seed, 32);
    }
}
