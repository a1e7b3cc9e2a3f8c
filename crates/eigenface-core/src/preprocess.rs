//! Image preparation — luma conversion, cubic resize, histogram equalisation.
//!
//! Every image fed to a recognizer must have the same size and similar
//! exposure; this turns arbitrary decoded pictures into such buffers.

use crate::linalg::GrayBuffer;
use crate::types::Dimensions;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

/// Edge length of the square crops the recognizer is tuned for.
pub const DEFAULT_FACE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOptions {
    pub width: u32,
    pub height: u32,
    /// Spread intensities over the full 0–255 range before projection.
    pub equalize: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_FACE_SIZE,
            height: DEFAULT_FACE_SIZE,
            equalize: true,
        }
    }
}

impl PreprocessOptions {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

/// Convert to grayscale, resize with a cubic filter, optionally equalise.
pub fn prepare(image: &DynamicImage, options: &PreprocessOptions) -> GrayBuffer {
    let gray = prepare_luma(image, options);
    GrayBuffer::from_array(
        options.dimensions(),
        gray.as_raw().iter().map(|&p| p as f64).collect(),
    )
}

/// Same as [`prepare`] but keeps the 8-bit image, e.g. for storing in a gallery.
pub fn prepare_luma(image: &DynamicImage, options: &PreprocessOptions) -> GrayImage {
    let luma = image.to_luma8();
    let mut resized = if luma.dimensions() == (options.width, options.height) {
        luma
    } else {
        imageops::resize(&luma, options.width, options.height, FilterType::CatmullRom)
    };
    if options.equalize {
        equalize_histogram(&mut resized);
    }
    resized
}

/// Global histogram equalisation in place.
///
/// Maps each intensity through the normalised cumulative histogram so that
/// the output uses the full 0–255 range. Constant images are left untouched.
pub fn equalize_histogram(gray: &mut [u8]) {
    if gray.is_empty() {
        return;
    }

    let mut hist = [0u32; 256];
    for &p in gray.iter() {
        hist[p as usize] += 1;
    }

    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = gray.len() as u32 - cdf_min;
    if denom == 0 {
        return;
    }

    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let scaled = (cdf[i].saturating_sub(cdf_min)) as f32 / denom as f32 * 255.0;
        *v = scaled.round().clamp(0.0, 255.0) as u8;
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}
