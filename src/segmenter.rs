//! Promptable segmentation adapter (SAM encoder/decoder pair)
//!
//! The image is embedded once per run; every detector box is then decoded
//! into its own binary mask. Boxes are prompted as two corner points with
//! the SAM labels 2 (top-left) and 3 (bottom-right), single-mask mode.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::geometry::PixelBox;
use crate::inference;
use crate::mask::SegmentationMask;
use crate::models::ModelManager;
use image::{DynamicImage, GrayImage, Luma};
use ndarray::{Array3, Array4, ArrayD};
use ort::session::Session;
use ort::value::Value;

/// Encoder input frame size (longest side)
const ENCODER_SIZE: u32 = 1024;

/// SAM pixel normalization constants (applied to 0-255 values)
const MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Prompt labels marking box corners
const LABEL_TOP_LEFT: i64 = 2;
const LABEL_BOTTOM_RIGHT: i64 = 3;

/// SAM segmentation adapter
pub struct SamSegmenter {
    encoder: Session,
    decoder: Session,
    model_name: String,
}

impl SamSegmenter {
    /// Load the encoder and decoder sessions from a resolved model directory
    ///
    /// # Errors
    /// - Missing model files
    /// - Session construction failures
    pub fn load(manager: &ModelManager, config: &PipelineConfig) -> Result<Self> {
        let encoder_path = manager.file_path("onnx/vision_encoder.onnx")?;
        let decoder_path = manager.file_path("onnx/prompt_encoder_mask_decoder.onnx")?;

        let encoder = inference::create_session(&encoder_path, config)?;
        let decoder = inference::create_session(&decoder_path, config)?;

        log::info!("Segmenter loaded ({})", encoder_path.display());
        Ok(Self {
            encoder,
            decoder,
            model_name: manager.kind().name().to_string(),
        })
    }

    /// Model display name for metadata
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Segment one mask per pixel-space box
    ///
    /// The image is embedded once; each box is decoded independently in
    /// single-mask mode. Boxes are forwarded to the decoder exactly as given.
    ///
    /// # Errors
    /// - Inference failures in either session
    /// - Unexpected output tensor shapes
    pub fn segment(
        &mut self,
        image: &DynamicImage,
        boxes: &[PixelBox],
    ) -> Result<Vec<SegmentationMask>> {
        let (width, height) = (image.width(), image.height());
        let scale = f64::from(ENCODER_SIZE) / f64::from(width.max(height));

        let (embeddings, positional) = self.embed(image, scale)?;

        let mut masks = Vec::with_capacity(boxes.len());
        for pixel_box in boxes {
            let mask = self.decode_box(&embeddings, &positional, *pixel_box, scale, width, height)?;
            masks.push(mask);
        }

        log::info!("Segmenter produced {} mask(s)", masks.len());
        Ok(masks)
    }

    /// Run the vision encoder once over the padded 1024-frame image
    fn embed(&mut self, image: &DynamicImage, scale: f64) -> Result<(ArrayD<f32>, ArrayD<f32>)> {
        let scaled_w = (f64::from(image.width()) * scale).round() as u32;
        let scaled_h = (f64::from(image.height()) * scale).round() as u32;

        let resized = image::imageops::resize(
            &image.to_rgb8(),
            scaled_w.max(1),
            scaled_h.max(1),
            image::imageops::FilterType::Triangle,
        );

        // Top-left aligned canvas, zero padding on the remainder
        let size = ENCODER_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] =
                    (f32::from(pixel[channel]) - MEAN[channel]) / STD[channel];
            }
        }

        let pixel_input = Value::from_array(tensor).map_err(|e| {
            PipelineError::processing(format!("Failed to convert encoder tensor: {e}"))
        })?;

        let outputs = self
            .encoder
            .run(ort::inputs!["pixel_values" => pixel_input])
            .map_err(|e| {
                PipelineError::inference(format!("Segmenter encoder inference failed: {e}"))
            })?;

        let embeddings = outputs
            .get("image_embeddings")
            .ok_or_else(|| {
                PipelineError::processing("Encoder output 'image_embeddings' not found")
            })?
            .try_extract_array::<f32>()
            .map_err(|e| PipelineError::processing(format!("Failed to extract embeddings: {e}")))?
            .to_owned();

        let positional = outputs
            .get("image_positional_embeddings")
            .ok_or_else(|| {
                PipelineError::processing(
                    "Encoder output 'image_positional_embeddings' not found",
                )
            })?
            .try_extract_array::<f32>()
            .map_err(|e| {
                PipelineError::processing(format!("Failed to extract positional embeddings: {e}"))
            })?
            .to_owned();

        Ok((embeddings, positional))
    }

    /// Decode a single box prompt into a full-resolution binary mask
    fn decode_box(
        &mut self,
        embeddings: &ArrayD<f32>,
        positional: &ArrayD<f32>,
        pixel_box: PixelBox,
        scale: f64,
        width: u32,
        height: u32,
    ) -> Result<SegmentationMask> {
        // Box corners in the encoder's 1024 coordinate frame
        let points = Array4::from_shape_vec(
            (1, 1, 2, 2),
            vec![
                (f64::from(pixel_box.x0) * scale) as f32,
                (f64::from(pixel_box.y0) * scale) as f32,
                (f64::from(pixel_box.x1) * scale) as f32,
                (f64::from(pixel_box.y1) * scale) as f32,
            ],
        )
        .map_err(|e| PipelineError::processing(format!("Failed to shape point prompt: {e}")))?;

        let labels = Array3::from_shape_vec((1, 1, 2), vec![LABEL_TOP_LEFT, LABEL_BOTTOM_RIGHT])
            .map_err(|e| PipelineError::processing(format!("Failed to shape point labels: {e}")))?;

        let points_input = Value::from_array(points).map_err(|e| {
            PipelineError::processing(format!("Failed to convert point prompt: {e}"))
        })?;
        let labels_input = Value::from_array(labels).map_err(|e| {
            PipelineError::processing(format!("Failed to convert point labels: {e}"))
        })?;
        let embeddings_input = Value::from_array(embeddings.clone()).map_err(|e| {
            PipelineError::processing(format!("Failed to convert embeddings: {e}"))
        })?;
        let positional_input = Value::from_array(positional.clone()).map_err(|e| {
            PipelineError::processing(format!("Failed to convert positional embeddings: {e}"))
        })?;

        let outputs = self
            .decoder
            .run(ort::inputs![
                "input_points" => points_input,
                "input_labels" => labels_input,
                "image_embeddings" => embeddings_input,
                "image_positional_embeddings" => positional_input,
            ])
            .map_err(|e| {
                PipelineError::inference(format!("Segmenter decoder inference failed: {e}"))
            })?;

        let pred_masks = outputs
            .get("pred_masks")
            .ok_or_else(|| PipelineError::processing("Decoder output 'pred_masks' not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| PipelineError::processing(format!("Failed to extract masks: {e}")))?
            .to_owned();

        let shape = pred_masks.shape().to_vec();
        if shape.len() != 5 {
            return Err(PipelineError::processing(format!(
                "Unexpected decoder mask rank: {shape:?}"
            )));
        }
        let (mask_h, mask_w) = (shape[3], shape[4]);

        // Single-mask mode: keep the first of the decoder's mask hypotheses
        let mut low_res = GrayImage::new(mask_w as u32, mask_h as u32);
        for y in 0..mask_h {
            for x in 0..mask_w {
                let logit = pred_masks[[0, 0, 0, y, x]];
                let value = if logit > 0.0 { 255 } else { 0 };
                low_res.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }

        Ok(upscale_mask(&low_res, scale, width, height))
    }
}

/// Map a low-resolution decoder mask back onto the original image frame
///
/// The decoder mask covers the padded 1024-square; the valid region is the
/// top-left (scaled width x scaled height) rectangle, which is cropped and
/// resized to the source dimensions.
fn upscale_mask(low_res: &GrayImage, scale: f64, width: u32, height: u32) -> SegmentationMask {
    let full = image::imageops::resize(
        low_res,
        ENCODER_SIZE,
        ENCODER_SIZE,
        image::imageops::FilterType::Nearest,
    );

    let valid_w = ((f64::from(width) * scale).round() as u32).clamp(1, ENCODER_SIZE);
    let valid_h = ((f64::from(height) * scale).round() as u32).clamp(1, ENCODER_SIZE);
    let cropped = image::imageops::crop_imm(&full, 0, 0, valid_w, valid_h).to_image();

    let restored = image::imageops::resize(
        &cropped,
        width,
        height,
        image::imageops::FilterType::Nearest,
    );

    SegmentationMask::from_image(&restored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upscale_mask_dimensions() {
        let low_res = GrayImage::from_pixel(256, 256, Luma([255]));
        let scale = f64::from(ENCODER_SIZE) / 640.0;

        let mask = upscale_mask(&low_res, scale, 640, 480);
        assert_eq!(mask.dimensions, (640, 480));
        assert!(mask.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_upscale_mask_stays_binary() {
        let mut low_res = GrayImage::from_pixel(256, 256, Luma([0]));
        for y in 100..150 {
            for x in 100..150 {
                low_res.put_pixel(x, y, Luma([255]));
            }
        }
        let scale = f64::from(ENCODER_SIZE) / 800.0;

        let mask = upscale_mask(&low_res, scale, 800, 600);
        assert_eq!(mask.dimensions, (800, 600));
        assert!(mask.data.iter().all(|&v| v == 0 || v == 255));
        assert!(mask.coverage() > 0.0);
    }
}
