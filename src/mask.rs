//! Binary segmentation masks and mask compositing

use crate::error::{PipelineError, Result};
use image::{DynamicImage, GenericImageView, ImageBuffer, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Default overlay tint (dodger blue at 60% alpha), matching the fixed
/// inspection color used when random colors are disabled.
pub const DEFAULT_OVERLAY_COLOR: [u8; 4] = [30, 144, 255, 153];

/// Binary segmentation mask
///
/// Grayscale values 0-255; the pipeline only ever produces 0 (background)
/// and 255 (object), but any non-zero value counts as masked when compositing
/// or inpainting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255)
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Create mask from a grayscale image
    #[must_use]
    pub fn from_image(image: &ImageBuffer<Luma<u8>, Vec<u8>>) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.as_raw().clone(), (width, height))
    }

    /// Convert the mask to a grayscale image
    ///
    /// # Errors
    /// - Data length does not match the stored dimensions
    pub fn to_image(&self) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (width, height) = self.dimensions;
        ImageBuffer::from_raw(width, height, self.data.clone()).ok_or_else(|| {
            PipelineError::processing(format!(
                "Mask data length {} does not match dimensions {}x{}",
                self.data.len(),
                width,
                height
            ))
        })
    }

    /// Invert the mask: every pixel v becomes 255 - v.
    ///
    /// Used to retarget inpainting from the object to the background.
    /// Inverting twice is an exact identity.
    #[must_use]
    pub fn invert(&self) -> Self {
        let data = self.data.iter().map(|v| 255 - v).collect();
        Self::new(data, self.dimensions)
    }

    /// Resize with nearest-neighbor sampling so the mask stays binary
    ///
    /// # Errors
    /// - Mask data is inconsistent with its dimensions
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        let image = self.to_image()?;
        let resized = image::imageops::resize(
            &image,
            width,
            height,
            image::imageops::FilterType::Nearest,
        );
        Ok(Self::from_image(&resized))
    }

    /// Fraction of pixels that are masked
    #[must_use]
    pub fn coverage(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let masked = self.data.iter().filter(|&&v| v > 0).count();
        masked as f32 / self.data.len() as f32
    }

    /// Alpha-blend a color over the base image at masked pixels
    ///
    /// Pixels where the mask is zero pass through unchanged, so an all-zero
    /// mask returns the base image exactly.
    ///
    /// # Errors
    /// - Mask dimensions differ from the base image dimensions
    pub fn overlay(&self, base: &DynamicImage, color: [u8; 4]) -> Result<RgbaImage> {
        let (width, height) = base.dimensions();
        if self.dimensions != (width, height) {
            return Err(PipelineError::invalid_config(format!(
                "Mask dimensions {}x{} do not match image dimensions {width}x{height}",
                self.dimensions.0, self.dimensions.1
            )));
        }

        let mut composite = base.to_rgba8();
        let alpha = f32::from(color[3]) / 255.0;

        for (x, y, pixel) in composite.enumerate_pixels_mut() {
            let idx = (y * width + x) as usize;
            let masked = self.data.get(idx).copied().unwrap_or(0) > 0;
            if masked {
                let blended = [
                    blend_channel(pixel[0], color[0], alpha),
                    blend_channel(pixel[1], color[1], alpha),
                    blend_channel(pixel[2], color[2], alpha),
                    pixel[3],
                ];
                *pixel = Rgba(blended);
            }
        }

        Ok(composite)
    }
}

fn blend_channel(base: u8, over: u8, alpha: f32) -> u8 {
    let blended = f32::from(base).mul_add(1.0 - alpha, f32::from(over) * alpha);
    blended.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checkerboard_mask(width: u32, height: u32) -> SegmentationMask {
        let data = (0..width * height)
            .map(|i| if (i % 2) == 0 { 255 } else { 0 })
            .collect();
        SegmentationMask::new(data, (width, height))
    }

    fn solid_base(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_pixel(width, height, Rgb([100u8, 150, 200]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_double_inversion_is_identity() {
        let mask = checkerboard_mask(16, 16);
        let restored = mask.invert().invert();
        assert_eq!(restored.data, mask.data);
    }

    #[test]
    fn test_invert_flips_binary_values() {
        let mask = SegmentationMask::new(vec![0, 255, 0, 255], (2, 2));
        let inverted = mask.invert();
        assert_eq!(inverted.data, vec![255, 0, 255, 0]);
    }

    #[test]
    fn test_empty_mask_overlay_is_identity() {
        let base = solid_base(8, 8);
        let mask = SegmentationMask::new(vec![0; 64], (8, 8));

        let composite = mask.overlay(&base, DEFAULT_OVERLAY_COLOR).unwrap();
        assert_eq!(composite.as_raw(), base.to_rgba8().as_raw());
    }

    #[test]
    fn test_overlay_changes_masked_pixels() {
        let base = solid_base(4, 4);
        let mut data = vec![0u8; 16];
        data[5] = 255;
        let mask = SegmentationMask::new(data, (4, 4));

        let composite = mask.overlay(&base, DEFAULT_OVERLAY_COLOR).unwrap();
        let original = base.to_rgba8();
        assert_ne!(composite.get_pixel(1, 1), original.get_pixel(1, 1));
        assert_eq!(composite.get_pixel(0, 0), original.get_pixel(0, 0));
    }

    #[test]
    fn test_overlay_dimension_mismatch() {
        let base = solid_base(8, 8);
        let mask = SegmentationMask::new(vec![0; 16], (4, 4));

        let result = mask.overlay(&base, DEFAULT_OVERLAY_COLOR);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_resize_stays_binary() {
        let mask = checkerboard_mask(8, 8);
        let resized = mask.resize(32, 32).unwrap();
        assert_eq!(resized.dimensions, (32, 32));
        assert!(resized.data.iter().all(|&v| v == 0 || v == 255));
    }

    #[test]
    fn test_coverage() {
        let mask = SegmentationMask::new(vec![255, 0, 255, 0], (2, 2));
        assert!((mask.coverage() - 0.5).abs() < f32::EPSILON);

        let empty = SegmentationMask::new(vec![], (0, 0));
        assert!(empty.coverage().abs() < f32::EPSILON);
    }

    #[test]
    fn test_round_trip_through_image() {
        let mask = checkerboard_mask(6, 4);
        let image = mask.to_image().unwrap();
        let restored = SegmentationMask::from_image(&image);
        assert_eq!(restored.data, mask.data);
        assert_eq!(restored.dimensions, mask.dimensions);
    }
}
