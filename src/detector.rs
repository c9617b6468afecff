//! Open-vocabulary detection adapter (Grounding DINO)
//!
//! Wraps the detector ONNX session together with its BERT tokenizer. The
//! adapter owns preprocessing (fixed 800x800 resize, ImageNet normalization),
//! prompt canonicalization, and the threshold/phrase postprocessing of the
//! raw query logits.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::geometry::BoundingBox;
use crate::inference;
use crate::models::ModelManager;
use crate::types::Detection;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::Value;
use tokenizers::Tokenizer;

/// Fixed detector input resolution
const INPUT_SIZE: u32 = 800;

/// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Color used for annotation rectangles
const BOX_COLOR: Rgb<u8> = Rgb([255, 64, 64]);

/// Grounding DINO detection adapter
pub struct GroundedDetector {
    session: Session,
    tokenizer: Tokenizer,
    model_name: String,
}

impl GroundedDetector {
    /// Load the detector session and tokenizer from a resolved model directory
    ///
    /// # Errors
    /// - Missing model or tokenizer files
    /// - Session construction failures
    pub fn load(manager: &ModelManager, config: &PipelineConfig) -> Result<Self> {
        let model_path = manager.file_path("onnx/model.onnx")?;
        let session = inference::create_session(&model_path, config)?;

        let tokenizer_path = manager.file_path("tokenizer.json")?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            PipelineError::model(format!(
                "Failed to load detector tokenizer from '{}': {e}",
                tokenizer_path.display()
            ))
        })?;

        log::info!("Detector loaded ({})", model_path.display());
        Ok(Self {
            session,
            tokenizer,
            model_name: manager.kind().name().to_string(),
        })
    }

    /// Model display name for metadata
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Detect objects matching a free-text prompt
    ///
    /// Returns boxes in normalized center-size format, sorted by descending
    /// confidence. Queries below `box_threshold` are dropped; the phrase is
    /// decoded from the token positions above `text_threshold`.
    ///
    /// # Errors
    /// - Tokenization or inference failures
    /// - Unexpected output tensor shapes
    pub fn detect(
        &mut self,
        image: &DynamicImage,
        prompt: &str,
        box_threshold: f32,
        text_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let canonical = canonicalize_prompt(prompt);
        log::debug!("Detecting '{}' (canonical: '{}')", prompt, canonical);

        let encoding = self
            .tokenizer
            .encode(canonical.as_str(), true)
            .map_err(|e| PipelineError::processing(format!("Failed to tokenize prompt: {e}")))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let attention: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect();
        let type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| i64::from(t))
            .collect();
        let special_mask = encoding.get_special_tokens_mask().to_vec();
        let seq_len = ids.len();

        let pixel_values = preprocess(image);

        let pixel_input = Value::from_array(pixel_values).map_err(|e| {
            PipelineError::processing(format!("Failed to convert image tensor: {e}"))
        })?;
        let ids_input = Value::from_array(to_i64_tensor(&ids, seq_len)?).map_err(|e| {
            PipelineError::processing(format!("Failed to convert input ids: {e}"))
        })?;
        let attention_input =
            Value::from_array(to_i64_tensor(&attention, seq_len)?).map_err(|e| {
                PipelineError::processing(format!("Failed to convert attention mask: {e}"))
            })?;
        let type_input = Value::from_array(to_i64_tensor(&type_ids, seq_len)?).map_err(|e| {
            PipelineError::processing(format!("Failed to convert token type ids: {e}"))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![
                "pixel_values" => pixel_input,
                "input_ids" => ids_input,
                "attention_mask" => attention_input,
                "token_type_ids" => type_input,
            ])
            .map_err(|e| PipelineError::inference(format!("Detector inference failed: {e}")))?;

        let logits = outputs
            .get("logits")
            .ok_or_else(|| PipelineError::processing("Detector output 'logits' not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| PipelineError::processing(format!("Failed to extract logits: {e}")))?
            .to_owned();
        let boxes = outputs
            .get("pred_boxes")
            .ok_or_else(|| PipelineError::processing("Detector output 'pred_boxes' not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| PipelineError::processing(format!("Failed to extract boxes: {e}")))?
            .to_owned();

        let logits_shape = logits.shape().to_vec();
        if logits_shape.len() != 3 || boxes.shape().len() != 3 {
            return Err(PipelineError::processing(format!(
                "Unexpected detector output ranks: logits {:?}, boxes {:?}",
                logits_shape,
                boxes.shape()
            )));
        }

        let num_queries = logits_shape[1];
        let text_dim = logits_shape[2];
        let mut detections = Vec::new();

        for query in 0..num_queries {
            // Per-query confidence is the best sigmoid over the real prompt tokens
            let mut best_score = 0.0f32;
            let mut phrase_ids: Vec<u32> = Vec::new();

            for token in 0..seq_len.min(text_dim) {
                if special_mask.get(token).copied().unwrap_or(1) == 1 {
                    continue;
                }
                let score = sigmoid(logits[[0, query, token]]);
                if score > best_score {
                    best_score = score;
                }
                if score > text_threshold {
                    if let Some(&id) = encoding.get_ids().get(token) {
                        phrase_ids.push(id);
                    }
                }
            }

            if best_score <= box_threshold {
                continue;
            }

            let phrase = self
                .tokenizer
                .decode(&phrase_ids, true)
                .unwrap_or_default()
                .trim()
                .to_string();

            detections.push(Detection {
                bbox: BoundingBox::new(
                    boxes[[0, query, 0]],
                    boxes[[0, query, 1]],
                    boxes[[0, query, 2]],
                    boxes[[0, query, 3]],
                ),
                score: best_score,
                phrase,
            });
        }

        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        log::info!(
            "Detector found {} box(es) above threshold for '{}'",
            detections.len(),
            prompt
        );
        Ok(detections)
    }
}

/// Canonicalize a detection prompt: lowercase, terminated with a period
#[must_use]
pub fn canonicalize_prompt(prompt: &str) -> String {
    let lower = prompt.trim().to_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{lower}.")
    }
}

/// Resize to the fixed detector resolution and normalize to an NCHW tensor
fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let resized = image::imageops::resize(
        &image.to_rgb8(),
        INPUT_SIZE,
        INPUT_SIZE,
        image::imageops::FilterType::Triangle,
    );

    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            let normalized = (f32::from(pixel[channel]) / 255.0 - MEAN[channel]) / STD[channel];
            tensor[[0, channel, y as usize, x as usize]] = normalized;
        }
    }
    tensor
}

fn to_i64_tensor(values: &[i64], len: usize) -> Result<Array2<i64>> {
    Array2::from_shape_vec((1, len), values.to_vec())
        .map_err(|e| PipelineError::processing(format!("Failed to shape token tensor: {e}")))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Draw detection rectangles onto a copy of the source image
#[must_use]
pub fn annotate(image: &DynamicImage, detections: &[Detection]) -> RgbImage {
    let mut annotated = image.to_rgb8();
    let (width, height) = annotated.dimensions();

    for detection in detections {
        let pixel_box = detection.bbox.to_pixel(width, height);
        let x = pixel_box.x0.max(0.0) as i32;
        let y = pixel_box.y0.max(0.0) as i32;
        let w = pixel_box.width().max(1.0) as u32;
        let h = pixel_box.height().max(1.0) as u32;

        // Two nested rectangles for a 2px outline
        draw_hollow_rect_mut(&mut annotated, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(x + 1, y + 1).of_size(w - 2, h - 2),
                BOX_COLOR,
            );
        }
    }

    annotated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_prompt() {
        assert_eq!(canonicalize_prompt("Bench"), "bench.");
        assert_eq!(canonicalize_prompt("a red car."), "a red car.");
        assert_eq!(canonicalize_prompt("  Dog  "), "dog.");
    }

    #[test]
    fn test_sigmoid_range() {
        assert!((sigmoid(0.0) - 0.5).abs() < f32::EPSILON);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 32, Rgb([255, 255, 255])));
        let tensor = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 800, 800]);

        // White pixel maps to (1.0 - mean) / std per channel
        let expected_r = (1.0 - MEAN[0]) / STD[0];
        assert!((tensor[[0, 0, 400, 400]] - expected_r).abs() < 1e-4);
    }

    #[test]
    fn test_annotate_draws_box() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0])));
        let detections = vec![Detection {
            bbox: BoundingBox::new(0.5, 0.5, 0.4, 0.4),
            score: 0.9,
            phrase: "bench".to_string(),
        }];

        let annotated = annotate(&image, &detections);
        assert_eq!(annotated.get_pixel(30, 30), &BOX_COLOR);
        // Center stays untouched
        assert_eq!(annotated.get_pixel(50, 50), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_empty_is_source() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([7, 8, 9])));
        let annotated = annotate(&image, &[]);
        assert_eq!(annotated.as_raw(), image.to_rgb8().as_raw());
    }

    #[test]
    fn test_i64_tensor_shape() {
        let tensor = to_i64_tensor(&[101, 2003, 102], 3).unwrap();
        assert_eq!(tensor.shape(), &[1, 3]);
    }
}
