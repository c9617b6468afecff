//! Bounding box formats and conversions
//!
//! The detector emits normalized center-size boxes, the segmenter consumes
//! pixel-space corner boxes. The two conversions here are the only coordinate
//! math in the pipeline.

use serde::{Deserialize, Serialize};

/// Normalized center-size bounding box (all fields in 0–1, relative to image size)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Box center x
    pub cx: f32,
    /// Box center y
    pub cy: f32,
    /// Box width
    pub w: f32,
    /// Box height
    pub h: f32,
}

/// Pixel-space corner bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    /// Convert to corner format scaled to pixel coordinates.
    ///
    /// No clamping is applied; coordinates land wherever the scaled box puts
    /// them, including outside the image frame.
    #[must_use]
    pub fn to_pixel(self, image_width: u32, image_height: u32) -> PixelBox {
        let w = image_width as f32;
        let h = image_height as f32;
        PixelBox {
            x0: (self.cx - self.w / 2.0) * w,
            y0: (self.cy - self.h / 2.0) * h,
            x1: (self.cx + self.w / 2.0) * w,
            y1: (self.cy + self.h / 2.0) * h,
        }
    }
}

impl PixelBox {
    #[must_use]
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Convert back to normalized center-size format
    #[must_use]
    pub fn to_normalized(self, image_width: u32, image_height: u32) -> BoundingBox {
        let w = image_width as f32;
        let h = image_height as f32;
        BoundingBox {
            cx: (self.x0 + self.x1) / 2.0 / w,
            cy: (self.y0 + self.y1) / 2.0 / h,
            w: (self.x1 - self.x0) / w,
            h: (self.y1 - self.y0) / h,
        }
    }

    /// Box width in pixels
    #[must_use]
    pub fn width(self) -> f32 {
        self.x1 - self.x0
    }

    /// Box height in pixels
    #[must_use]
    pub fn height(self) -> f32 {
        self.y1 - self.y0
    }
}
