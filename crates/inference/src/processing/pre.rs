use crate::config::DEFAULT_INPUT_SIZE;
use common::span;
use image::{RgbImage, imageops::FilterType};
use ndarray::{Array, IxDyn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("image buffer is empty")]
    Empty,

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// An uploaded image decoded to 8-bit RGB.
pub struct DecodedImage {
    pub pixels: RgbImage,
    pub width: u32,
    pub height: u32,
}

/// Decode an arbitrary-format image buffer (JPEG, PNG, ...).
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, IngestError> {
    let _s = span!("decode_image");

    if bytes.is_empty() {
        return Err(IngestError::Empty);
    }

    let pixels = image::load_from_memory(bytes)?.into_rgb8();
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
        return Err(IngestError::Empty);
    }

    tracing::trace!(width, height, bytes = bytes.len(), "Decoded image");

    Ok(DecodedImage {
        pixels,
        width,
        height,
    })
}

/// Builds the model input tensor from a decoded image.
#[derive(Debug, Clone, Copy)]
pub struct PreProcessor {
    pub input_size: (u32, u32),
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

impl PreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self { input_size }
    }

    /// Stretch-resize to the input size, scale to `[0, 1]` and lay out as
    /// `[1, 3, H, W]` with R, G, B planes.
    ///
    /// The decoder already yields RGB, which is the channel order the
    /// detector expects, so no per-pixel swap is needed here.
    pub fn build_input(&self, image: &DecodedImage) -> Array<f32, IxDyn> {
        let _s = span!("build_input");

        let (width, height) = self.input_size;
        let resized = if image.pixels.dimensions() == self.input_size {
            image.pixels.clone()
        } else {
            image::imageops::resize(&image.pixels, width, height, FilterType::Triangle)
        };

        Self::normalize(&resized)
    }

    fn normalize(resized: &RgbImage) -> Array<f32, IxDyn> {
        let (width, height) = resized.dimensions();
        let mut input = Array::zeros(IxDyn(&[1, 3, height as usize, width as usize]));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }
        input
    }
}
