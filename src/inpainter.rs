//! Diffusion inpainting adapter (Stable Diffusion inpainting ONNX export)
//!
//! Four sessions (text encoder, UNet, VAE encoder, VAE decoder) plus the CLIP
//! tokenizer. The masked region of the 512x512-resized image is regenerated
//! through the seeded DDIM loop with classifier-free guidance; the result is
//! resized back to the source dimensions with a fixed resampling policy.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::inference;
use crate::mask::SegmentationMask;
use crate::models::ModelManager;
use crate::scheduler::DdimScheduler;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{concatenate, Array1, Array2, Array3, Array4, Axis};
use ort::session::Session;
use ort::value::Value;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use tokenizers::Tokenizer;

/// Fixed diffusion input resolution
const SAMPLE_SIZE: u32 = 512;

/// Latent grid resolution (sample size / VAE downscale factor)
const LATENT_SIZE: usize = 64;

/// Latent channels of the VAE
const LATENT_CHANNELS: usize = 4;

/// VAE latent scaling factor
const VAE_SCALE: f32 = 0.18215;

/// CLIP context length
const TOKEN_LENGTH: usize = 77;

/// Stable Diffusion inpainting adapter
pub struct DiffusionInpainter {
    text_encoder: Session,
    unet: Session,
    vae_encoder: Session,
    vae_decoder: Session,
    tokenizer: Tokenizer,
    model_name: String,
}

impl DiffusionInpainter {
    /// Load the four sessions and the tokenizer from a resolved model directory
    ///
    /// # Errors
    /// - Missing model or tokenizer files
    /// - Session construction failures
    pub fn load(manager: &ModelManager, config: &PipelineConfig) -> Result<Self> {
        let text_encoder =
            inference::create_session(&manager.file_path("text_encoder/model.onnx")?, config)?;
        let unet = inference::create_session(&manager.file_path("unet/model.onnx")?, config)?;
        let vae_encoder =
            inference::create_session(&manager.file_path("vae_encoder/model.onnx")?, config)?;
        let vae_decoder =
            inference::create_session(&manager.file_path("vae_decoder/model.onnx")?, config)?;

        let tokenizer_path = manager.file_path("tokenizer/tokenizer.json")?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            PipelineError::model(format!(
                "Failed to load inpainter tokenizer from '{}': {e}",
                tokenizer_path.display()
            ))
        })?;

        log::info!("Inpainter loaded (4 sessions)");
        Ok(Self {
            text_encoder,
            unet,
            vae_encoder,
            vae_decoder,
            tokenizer,
            model_name: manager.kind().name().to_string(),
        })
    }

    /// Model display name for metadata
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Regenerate the masked region of an image from a text prompt
    ///
    /// Non-zero mask pixels are repainted; zero pixels are preserved. The
    /// run is deterministic for a fixed seed, prompts, and weights.
    ///
    /// # Errors
    /// - Mask dimensions differing from the image dimensions
    /// - Inference failures in any session
    #[allow(clippy::too_many_arguments)]
    pub fn inpaint(
        &mut self,
        image: &DynamicImage,
        mask: &SegmentationMask,
        prompt: &str,
        negative_prompt: &str,
        seed: u64,
        steps: usize,
        guidance_scale: f32,
    ) -> Result<DynamicImage> {
        let (orig_width, orig_height) = (image.width(), image.height());
        if mask.dimensions != (orig_width, orig_height) {
            return Err(PipelineError::invalid_config(format!(
                "Mask dimensions {}x{} do not match image dimensions {orig_width}x{orig_height}",
                mask.dimensions.0, mask.dimensions.1
            )));
        }

        log::info!(
            "Inpainting {}x{} image ({} steps, seed {})",
            orig_width,
            orig_height,
            steps,
            seed
        );

        // Both the image and the mask are brought to the model's fixed frame
        let rgb512 = image::imageops::resize(
            &image.to_rgb8(),
            SAMPLE_SIZE,
            SAMPLE_SIZE,
            image::imageops::FilterType::Triangle,
        );
        let mask512 = mask.resize(SAMPLE_SIZE, SAMPLE_SIZE)?;

        let text_embeddings = self.encode_prompt(prompt)?;
        let uncond_embeddings = self.encode_prompt(negative_prompt)?;

        let masked_image = mask_out_image(&rgb512, &mask512);
        let masked_latents = self.encode_vae(&masked_image)?;
        let mask_latent = downsample_mask(&mask512);

        let scheduler = DdimScheduler::new(steps)?;
        let mut latents = gaussian_latents(seed);
        latents *= scheduler.init_noise_sigma();

        for (step, &timestep) in scheduler.timesteps().iter().enumerate() {
            log::debug!("Denoising step {}/{} (t={})", step + 1, steps, timestep);

            let unet_input = concatenate(
                Axis(1),
                &[latents.view(), mask_latent.view(), masked_latents.view()],
            )
            .map_err(|e| {
                PipelineError::processing(format!("Failed to assemble UNet input: {e}"))
            })?;

            let noise_cond = self.run_unet(&unet_input, timestep, &text_embeddings)?;
            let noise_uncond = self.run_unet(&unet_input, timestep, &uncond_embeddings)?;

            // Classifier-free guidance
            let noise_pred = &noise_uncond + &((&noise_cond - &noise_uncond) * guidance_scale);

            latents = scheduler.step(&noise_pred, timestep, &latents)?;
        }

        let decoded = self.decode_vae(&latents)?;

        // Back to the source frame with a fixed resampling policy
        let restored = image::imageops::resize(
            &decoded,
            orig_width,
            orig_height,
            image::imageops::FilterType::Lanczos3,
        );
        Ok(DynamicImage::ImageRgb8(restored))
    }

    /// Encode a prompt into CLIP hidden states
    fn encode_prompt(&mut self, prompt: &str) -> Result<Array3<f32>> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| PipelineError::processing(format!("Failed to tokenize prompt: {e}")))?;

        let pad_id = self
            .tokenizer
            .token_to_id("<|endoftext|>")
            .unwrap_or_default();
        let ids = pad_token_ids(encoding.get_ids(), i64::from(pad_id));

        let ids_tensor = Array2::from_shape_vec((1, TOKEN_LENGTH), ids)
            .map_err(|e| PipelineError::processing(format!("Failed to shape token ids: {e}")))?;
        let ids_input = Value::from_array(ids_tensor).map_err(|e| {
            PipelineError::processing(format!("Failed to convert token ids: {e}"))
        })?;

        let outputs = self
            .text_encoder
            .run(ort::inputs!["input_ids" => ids_input])
            .map_err(|e| PipelineError::inference(format!("Text encoder failed: {e}")))?;

        let hidden = outputs
            .get("last_hidden_state")
            .ok_or_else(|| {
                PipelineError::processing("Text encoder output 'last_hidden_state' not found")
            })?
            .try_extract_array::<f32>()
            .map_err(|e| {
                PipelineError::processing(format!("Failed to extract hidden states: {e}"))
            })?
            .to_owned();

        hidden
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| PipelineError::processing(format!("Unexpected text embedding rank: {e}")))
    }

    /// Encode an image into scaled VAE latents
    fn encode_vae(&mut self, image: &RgbImage) -> Result<Array4<f32>> {
        let tensor = image_to_model_input(image);
        let input = Value::from_array(tensor).map_err(|e| {
            PipelineError::processing(format!("Failed to convert VAE input: {e}"))
        })?;

        let outputs = self
            .vae_encoder
            .run(ort::inputs!["sample" => input])
            .map_err(|e| PipelineError::inference(format!("VAE encoder failed: {e}")))?;

        let latents = outputs
            .get("latent_sample")
            .ok_or_else(|| {
                PipelineError::processing("VAE encoder output 'latent_sample' not found")
            })?
            .try_extract_array::<f32>()
            .map_err(|e| PipelineError::processing(format!("Failed to extract latents: {e}")))?
            .to_owned();

        let latents = latents
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| PipelineError::processing(format!("Unexpected latent rank: {e}")))?;

        Ok(latents * VAE_SCALE)
    }

    /// Run one UNet pass and return the predicted noise
    fn run_unet(
        &mut self,
        sample: &Array4<f32>,
        timestep: usize,
        embeddings: &Array3<f32>,
    ) -> Result<Array4<f32>> {
        let sample_input = Value::from_array(sample.clone()).map_err(|e| {
            PipelineError::processing(format!("Failed to convert UNet sample: {e}"))
        })?;
        let timestep_input =
            Value::from_array(Array1::from_vec(vec![timestep as i64])).map_err(|e| {
                PipelineError::processing(format!("Failed to convert timestep: {e}"))
            })?;
        let hidden_input = Value::from_array(embeddings.clone()).map_err(|e| {
            PipelineError::processing(format!("Failed to convert hidden states: {e}"))
        })?;

        let outputs = self
            .unet
            .run(ort::inputs![
                "sample" => sample_input,
                "timestep" => timestep_input,
                "encoder_hidden_states" => hidden_input,
            ])
            .map_err(|e| PipelineError::inference(format!("UNet inference failed: {e}")))?;

        let noise = outputs
            .get("out_sample")
            .ok_or_else(|| PipelineError::processing("UNet output 'out_sample' not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| PipelineError::processing(format!("Failed to extract noise: {e}")))?
            .to_owned();

        noise
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| PipelineError::processing(format!("Unexpected noise rank: {e}")))
    }

    /// Decode latents into a 512x512 image
    fn decode_vae(&mut self, latents: &Array4<f32>) -> Result<RgbImage> {
        let scaled = latents / VAE_SCALE;
        let input = Value::from_array(scaled).map_err(|e| {
            PipelineError::processing(format!("Failed to convert decoder input: {e}"))
        })?;

        let outputs = self
            .vae_decoder
            .run(ort::inputs!["latent_sample" => input])
            .map_err(|e| PipelineError::inference(format!("VAE decoder failed: {e}")))?;

        let sample = outputs
            .get("sample")
            .ok_or_else(|| PipelineError::processing("VAE decoder output 'sample' not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| PipelineError::processing(format!("Failed to extract sample: {e}")))?
            .to_owned();

        let sample = sample
            .into_dimensionality::<ndarray::Ix4>()
            .map_err(|e| PipelineError::processing(format!("Unexpected sample rank: {e}")))?;

        Ok(model_output_to_image(&sample))
    }
}

/// Truncate or pad CLIP token ids to the fixed context length
fn pad_token_ids(ids: &[u32], pad_id: i64) -> Vec<i64> {
    let mut padded: Vec<i64> = ids
        .iter()
        .take(TOKEN_LENGTH)
        .map(|&id| i64::from(id))
        .collect();
    padded.resize(TOKEN_LENGTH, pad_id);
    padded
}

/// Normalize an RGB image to the [-1, 1] NCHW tensor the VAE expects
fn image_to_model_input(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] =
                f32::from(pixel[channel]) / 255.0 * 2.0 - 1.0;
        }
    }
    tensor
}

/// Convert a [-1, 1] model output tensor back into an RGB image
fn model_output_to_image(sample: &Array4<f32>) -> RgbImage {
    let height = sample.shape()[2];
    let width = sample.shape()[3];
    let mut image = RgbImage::new(width as u32, height as u32);
    for y in 0..height {
        for x in 0..width {
            let to_u8 = |v: f32| ((v + 1.0) / 2.0 * 255.0).round().clamp(0.0, 255.0) as u8;
            image.put_pixel(
                x as u32,
                y as u32,
                Rgb([
                    to_u8(sample[[0, 0, y, x]]),
                    to_u8(sample[[0, 1, y, x]]),
                    to_u8(sample[[0, 2, y, x]]),
                ]),
            );
        }
    }
    image
}

/// Zero out the masked region so the VAE only sees preserved pixels
fn mask_out_image(image: &RgbImage, mask: &SegmentationMask) -> RgbImage {
    let (width, _height) = image.dimensions();
    let mut masked = image.clone();
    for (x, y, pixel) in masked.enumerate_pixels_mut() {
        let idx = (y * width + x) as usize;
        if mask.data.get(idx).copied().unwrap_or(0) > 0 {
            *pixel = Rgb([0, 0, 0]);
        }
    }
    masked
}

/// Downsample the 512 mask to the latent grid: 1.0 = repaint, 0.0 = keep
fn downsample_mask(mask: &SegmentationMask) -> Array4<f32> {
    let (width, height) = mask.dimensions;
    let stride_x = width as usize / LATENT_SIZE;
    let stride_y = height as usize / LATENT_SIZE;

    let mut latent_mask = Array4::<f32>::zeros((1, 1, LATENT_SIZE, LATENT_SIZE));
    for y in 0..LATENT_SIZE {
        for x in 0..LATENT_SIZE {
            let idx = y * stride_y * width as usize + x * stride_x;
            let value = mask.data.get(idx).copied().unwrap_or(0);
            latent_mask[[0, 0, y, x]] = if value > 0 { 1.0 } else { 0.0 };
        }
    }
    latent_mask
}

/// Seeded standard-normal latents; identical seeds give identical draws
fn gaussian_latents(seed: u64) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut latents = Array4::<f32>::zeros((1, LATENT_CHANNELS, LATENT_SIZE, LATENT_SIZE));
    for value in &mut latents {
        *value = StandardNormal.sample(&mut rng);
    }
    latents
}
