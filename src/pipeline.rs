//! Unified editing pipeline
//!
//! `InpaintPipeline` consolidates the three stage adapters behind one
//! configuration and executes the linear detect → segment → inpaint flow.
//! Stages are loaded lazily on the first run and reused afterwards.

use crate::config::PipelineConfig;
use crate::detector::{annotate, GroundedDetector};
use crate::error::{PipelineError, Result};
use crate::inpainter::DiffusionInpainter;
use crate::mask::{SegmentationMask, DEFAULT_OVERLAY_COLOR};
use crate::models::{ModelKind, ModelManager};
use crate::segmenter::SamSegmenter;
use crate::types::{EditResult, ProcessingMetadata};
use image::DynamicImage;
use log::{debug, info};
use std::time::Instant;
use tracing::info_span;

/// What to find and what to paint in its place
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Free-text prompt naming the object to locate
    pub find: String,
    /// Prompt for regenerating the object region (skipped when `None`)
    pub replace_with: Option<String>,
    /// Prompt for regenerating everything except the object (skipped when `None`)
    pub background: Option<String>,
    /// Negative prompt shared by both inpainting passes
    pub negative_prompt: String,
}

impl EditRequest {
    /// Request that only locates and masks the object
    #[must_use]
    pub fn locate(find: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace_with: None,
            background: None,
            negative_prompt: String::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.find.trim().is_empty() {
            return Err(PipelineError::invalid_config(
                "Detection prompt must not be empty",
            ));
        }
        Ok(())
    }
}

/// The full editing pipeline
pub struct InpaintPipeline {
    config: PipelineConfig,
    detector: Option<GroundedDetector>,
    segmenter: Option<SamSegmenter>,
    inpainter: Option<DiffusionInpainter>,
    initialized: bool,
}

impl InpaintPipeline {
    /// Create a new pipeline from a configuration
    ///
    /// Models are not touched until `initialize` or the first `run`.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            detector: None,
            segmenter: None,
            inpainter: None,
            initialized: false,
        }
    }

    /// Pipeline configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load all three stage models
    ///
    /// # Errors
    /// - Any model missing from cache or disk
    /// - Session construction failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        info!("Initializing editing pipeline");
        debug!("Execution provider: {:?}", self.config.execution_provider);

        let detector_manager =
            ModelManager::from_spec(ModelKind::Detector, &self.config.models.detector)?;
        let segmenter_manager =
            ModelManager::from_spec(ModelKind::Segmenter, &self.config.models.segmenter)?;
        let inpainter_manager =
            ModelManager::from_spec(ModelKind::Inpainter, &self.config.models.inpainter)?;

        self.detector = Some(GroundedDetector::load(&detector_manager, &self.config)?);
        self.segmenter = Some(SamSegmenter::load(&segmenter_manager, &self.config)?);
        self.inpainter = Some(DiffusionInpainter::load(&inpainter_manager, &self.config)?);
        self.initialized = true;

        info!("Editing pipeline initialized");
        Ok(())
    }

    /// Execute the full pipeline over one image
    ///
    /// Runs detection, segments the detected boxes, then inpaints the object
    /// and/or background regions depending on the request. The top-scoring
    /// detection drives the masks and edits.
    ///
    /// # Errors
    /// - `PipelineError::Processing` when no detection survives the thresholds
    /// - Any stage inference failure
    pub fn run(&mut self, image: &DynamicImage, request: &EditRequest) -> Result<EditResult> {
        request.validate()?;
        self.initialize()?;

        let span = info_span!("pipeline_run", find = %request.find);
        let _guard = span.enter();

        let total_start = Instant::now();
        let original_dimensions = (image.width(), image.height());

        // Stage 1: detection
        let detect_start = Instant::now();
        let detector = self
            .detector
            .as_mut()
            .ok_or_else(|| PipelineError::internal("Detector not initialized"))?;
        let detector_name = detector.model_name().to_string();
        let detections = detector.detect(
            image,
            &request.find,
            self.config.box_threshold,
            self.config.text_threshold,
        )?;
        if detections.is_empty() {
            return Err(PipelineError::processing(format!(
                "No '{}' found above box threshold {}",
                request.find, self.config.box_threshold
            )));
        }
        let annotated = annotate(image, &detections);
        let detection_ms = detect_start.elapsed().as_millis() as u64;
        info!(
            "Detection: {} box(es), best score {:.3} ({}ms)",
            detections.len(),
            detections[0].score,
            detection_ms
        );

        // Stage 2: segmentation, one mask per detected box
        let segment_start = Instant::now();
        let pixel_boxes: Vec<_> = detections
            .iter()
            .map(|d| d.bbox.to_pixel(original_dimensions.0, original_dimensions.1))
            .collect();
        let overlay_color = self.overlay_color();
        let segmenter = self
            .segmenter
            .as_mut()
            .ok_or_else(|| PipelineError::internal("Segmenter not initialized"))?;
        let segmenter_name = segmenter.model_name().to_string();
        let mut masks = segmenter.segment(image, &pixel_boxes)?;
        if masks.is_empty() {
            return Err(PipelineError::processing("Segmenter returned no masks"));
        }
        let mask = masks.swap_remove(0);
        let inverted_mask = mask.invert();
        let overlay = mask.overlay(&annotated_to_dynamic(&annotated), overlay_color)?;
        let segmentation_ms = segment_start.elapsed().as_millis() as u64;
        info!(
            "Segmentation: mask coverage {:.1}% ({}ms)",
            mask.coverage() * 100.0,
            segmentation_ms
        );

        // Stage 3: inpainting passes
        let inpaint_start = Instant::now();
        let inpainter = self
            .inpainter
            .as_mut()
            .ok_or_else(|| PipelineError::internal("Inpainter not initialized"))?;
        let inpainter_name = inpainter.model_name().to_string();

        let object_edit = match &request.replace_with {
            Some(prompt) => Some(inpainter.inpaint(
                image,
                &mask,
                prompt,
                &request.negative_prompt,
                self.config.seed,
                self.config.inference_steps,
                self.config.guidance_scale,
            )?),
            None => None,
        };

        let background_edit = match &request.background {
            Some(prompt) => Some(inpainter.inpaint(
                image,
                &inverted_mask,
                prompt,
                &request.negative_prompt,
                self.config.seed,
                self.config.inference_steps,
                self.config.guidance_scale,
            )?),
            None => None,
        };
        let inpainting_ms = inpaint_start.elapsed().as_millis() as u64;

        let mut metadata = ProcessingMetadata::new(
            detector_name,
            segmenter_name,
            inpainter_name,
            self.config.seed,
        );
        metadata.timings.detection_ms = detection_ms;
        metadata.timings.segmentation_ms = segmentation_ms;
        metadata.timings.inpainting_ms = inpainting_ms;
        metadata.timings.total_ms = total_start.elapsed().as_millis() as u64;

        info!("{}", metadata.timings.summary());

        Ok(EditResult {
            detections,
            annotated,
            overlay,
            mask,
            inverted_mask,
            object_edit,
            background_edit,
            original_dimensions,
            metadata,
        })
    }

    fn overlay_color(&self) -> [u8; 4] {
        if self.config.random_overlay_color {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            [rng.gen(), rng.gen(), rng.gen(), 204]
        } else {
            DEFAULT_OVERLAY_COLOR
        }
    }

    /// Segment helper exposed for callers that already have boxes
    ///
    /// # Errors
    /// - Pipeline not initializable or segmentation failure
    pub fn segment_boxes(
        &mut self,
        image: &DynamicImage,
        boxes: &[crate::geometry::PixelBox],
    ) -> Result<Vec<SegmentationMask>> {
        self.initialize()?;
        let segmenter = self
            .segmenter
            .as_mut()
            .ok_or_else(|| PipelineError::internal("Segmenter not initialized"))?;
        segmenter.segment(image, boxes)
    }
}

fn annotated_to_dynamic(annotated: &image::RgbImage) -> DynamicImage {
    DynamicImage::ImageRgb8(annotated.clone())
}
