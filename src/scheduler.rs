//! DDIM noise scheduler for the inpainting diffusion loop
//!
//! Implements the deterministic (eta = 0) DDIM update over the scaled-linear
//! beta schedule the inpainting model was trained with: 1000 training steps,
//! betas from 8.5e-4 to 1.2e-2, leading timestep spacing with an offset of 1.
//! Every quantity is precomputed at construction; `step` is pure arithmetic.

use crate::error::{PipelineError, Result};
use ndarray::Array4;

const NUM_TRAIN_TIMESTEPS: usize = 1000;
const BETA_START: f64 = 0.000_85;
const BETA_END: f64 = 0.012;
const STEPS_OFFSET: usize = 1;

/// Deterministic DDIM scheduler
#[derive(Debug, Clone)]
pub struct DdimScheduler {
    alphas_cumprod: Vec<f32>,
    final_alpha_cumprod: f32,
    timesteps: Vec<usize>,
    step_ratio: usize,
}

impl DdimScheduler {
    /// Create a scheduler for the given number of inference steps
    ///
    /// # Errors
    /// - Step count of zero or beyond the training schedule
    pub fn new(num_inference_steps: usize) -> Result<Self> {
        if num_inference_steps == 0 || num_inference_steps > NUM_TRAIN_TIMESTEPS {
            return Err(PipelineError::invalid_config(format!(
                "inference steps must be in 1..={NUM_TRAIN_TIMESTEPS}, got {num_inference_steps}"
            )));
        }

        // Scaled-linear schedule: linear in sqrt(beta)
        let mut alphas_cumprod = Vec::with_capacity(NUM_TRAIN_TIMESTEPS);
        let sqrt_start = BETA_START.sqrt();
        let sqrt_end = BETA_END.sqrt();
        let mut cumprod = 1.0f64;
        for t in 0..NUM_TRAIN_TIMESTEPS {
            let frac = t as f64 / (NUM_TRAIN_TIMESTEPS - 1) as f64;
            let beta = (sqrt_start + (sqrt_end - sqrt_start) * frac).powi(2);
            cumprod *= 1.0 - beta;
            alphas_cumprod.push(cumprod as f32);
        }

        // Leading spacing, highest timestep first
        let step_ratio = NUM_TRAIN_TIMESTEPS / num_inference_steps;
        let timesteps: Vec<usize> = (0..num_inference_steps)
            .map(|i| i * step_ratio + STEPS_OFFSET)
            .rev()
            .collect();

        let final_alpha_cumprod = *alphas_cumprod.first().ok_or_else(|| {
            PipelineError::internal("empty alpha schedule")
        })?;

        Ok(Self {
            alphas_cumprod,
            final_alpha_cumprod,
            timesteps,
            step_ratio,
        })
    }

    /// Denoising timesteps, highest first
    #[must_use]
    pub fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    /// Initial latent scale (identity for DDIM)
    #[must_use]
    pub fn init_noise_sigma(&self) -> f32 {
        1.0
    }

    fn alpha_at(&self, timestep: usize) -> f32 {
        self.alphas_cumprod
            .get(timestep)
            .copied()
            .unwrap_or(self.final_alpha_cumprod)
    }

    /// One deterministic DDIM update: predicted noise + current sample → previous sample
    ///
    /// # Errors
    /// - Timestep outside the training schedule
    pub fn step(
        &self,
        model_output: &Array4<f32>,
        timestep: usize,
        sample: &Array4<f32>,
    ) -> Result<Array4<f32>> {
        if timestep >= NUM_TRAIN_TIMESTEPS {
            return Err(PipelineError::processing(format!(
                "timestep {timestep} outside training schedule"
            )));
        }

        let alpha_prod_t = self.alpha_at(timestep);
        let alpha_prod_prev = if timestep >= self.step_ratio {
            self.alpha_at(timestep - self.step_ratio)
        } else {
            self.final_alpha_cumprod
        };

        let beta_prod_t = 1.0 - alpha_prod_t;

        // eps-prediction: recover x0, then re-point towards the previous timestep
        let pred_original = (sample - &(model_output * beta_prod_t.sqrt())) / alpha_prod_t.sqrt();
        let pred_direction = model_output * (1.0 - alpha_prod_prev).sqrt();

        Ok(&(pred_original * alpha_prod_prev.sqrt()) + &pred_direction)
    }

    /// Forward-noise a clean sample to a given timestep
    #[must_use]
    pub fn add_noise(
        &self,
        original: &Array4<f32>,
        noise: &Array4<f32>,
        timestep: usize,
    ) -> Array4<f32> {
        let alpha_prod_t = self.alpha_at(timestep);
        let sqrt_alpha = alpha_prod_t.sqrt();
        let sqrt_one_minus = (1.0 - alpha_prod_t).sqrt();
        &(original * sqrt_alpha) + &(noise * sqrt_one_minus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestep_count_and_order() {
        let scheduler = DdimScheduler::new(30).unwrap();
        let timesteps = scheduler.timesteps();
        assert_eq!(timesteps.len(), 30);
        assert!(timesteps.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(*timesteps.first().unwrap(), 29 * (1000 / 30) + 1);
        assert_eq!(*timesteps.last().unwrap(), 1);
    }

    #[test]
    fn test_invalid_step_counts() {
        assert!(DdimScheduler::new(0).is_err());
        assert!(DdimScheduler::new(1001).is_err());
    }

    #[test]
    fn test_alphas_decrease_monotonically() {
        let scheduler = DdimScheduler::new(10).unwrap();
        assert!(scheduler
            .alphas_cumprod
            .windows(2)
            .all(|w| w[1] < w[0] && w[1] > 0.0));
        assert!(scheduler.alphas_cumprod[0] < 1.0);
    }

    #[test]
    fn test_step_is_deterministic() {
        let scheduler = DdimScheduler::new(20).unwrap();
        let sample = Array4::<f32>::from_elem((1, 4, 8, 8), 0.5);
        let eps = Array4::<f32>::from_elem((1, 4, 8, 8), 0.1);
        let timestep = scheduler.timesteps()[0];

        let a = scheduler.step(&eps, timestep, &sample).unwrap();
        let b = scheduler.step(&eps, timestep, &sample).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_step_rejects_out_of_schedule_timestep() {
        let scheduler = DdimScheduler::new(20).unwrap();
        let sample = Array4::<f32>::zeros((1, 4, 8, 8));
        assert!(scheduler.step(&sample, 1000, &sample).is_err());
    }

    #[test]
    fn test_add_noise_at_low_timestep_is_near_identity() {
        let scheduler = DdimScheduler::new(10).unwrap();
        let original = Array4::<f32>::from_elem((1, 4, 4, 4), 1.0);
        let noise = Array4::<f32>::zeros((1, 4, 4, 4));

        let noised = scheduler.add_noise(&original, &noise, 0);
        for value in &noised {
            assert!((value - 1.0).abs() < 1e-2);
        }
    }

    #[test]
    fn test_zero_noise_full_denoise_recovers_scaled_sample() {
        // With eps = 0 the update is a pure rescale between alpha levels
        let scheduler = DdimScheduler::new(10).unwrap();
        let sample = Array4::<f32>::from_elem((1, 4, 4, 4), 0.8);
        let eps = Array4::<f32>::zeros((1, 4, 4, 4));
        let timestep = scheduler.timesteps()[0];

        let alpha_t = scheduler.alpha_at(timestep);
        let alpha_prev = scheduler.alpha_at(timestep - scheduler.step_ratio);
        let expected = 0.8 / alpha_t.sqrt() * alpha_prev.sqrt();

        let stepped = scheduler.step(&eps, timestep, &sample).unwrap();
        for value in &stepped {
            assert!((value - expected).abs() < 1e-4);
        }
    }
}
