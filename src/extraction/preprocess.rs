//! Raster helpers for rendered pages: decode, measure, enhance, re-encode.
//!
//! Enhancement follows the usual "blend toward a degenerate image" model:
//! `out = degenerate + factor * (img - degenerate)`. A factor of 1.0 returns
//! the input unchanged, 0.0 returns the degenerate image, and values above 1.0
//! push pixels away from it.
//!
//! - contrast: degenerate is a flat image at the mean gray level
//! - sharpness: degenerate is a 3x3 smoothed copy

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
use tracing::debug;

use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum accepted encoded image size.
const MAX_IMAGE_BYTES: usize = 64 * 1024 * 1024; // 64 MB

/// Smallest possible valid PNG (signature + IHDR + IDAT + IEND).
const MIN_IMAGE_BYTES: usize = 67;

/// Smoothing kernel weights: centre 5, neighbours 1, divisor 13.
const SMOOTH_CENTER_WEIGHT: u32 = 5;
const SMOOTH_DIVISOR: u32 = 13;

// ═══════════════════════════════════════════════════════════
// Decode / encode
// ═══════════════════════════════════════════════════════════

/// Validate image bytes before decoding.
/// Rejects input too small or too large to be a page image.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Decode any supported raster into 8-bit grayscale.
pub fn decode_gray(bytes: &[u8]) -> Result<GrayImage, ExtractionError> {
    validate_image_bytes(bytes)?;
    let img = image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::ImageProcessing(format!("Image decode failed: {e}")))?;
    Ok(img.to_luma8())
}

pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageLuma8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Measurements
// ═══════════════════════════════════════════════════════════

/// Variance of the 4-neighbour Laplacian response over interior pixels.
///
/// Sharp text edges give a wide spread of responses; blur flattens them.
/// Images smaller than 3x3 have no interior and return 0.0.
pub fn compute_laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = (img.width(), img.height());
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = img.get_pixel(x, y).0[0] as f64;
            let top = img.get_pixel(x, y - 1).0[0] as f64;
            let bottom = img.get_pixel(x, y + 1).0[0] as f64;
            let left = img.get_pixel(x - 1, y).0[0] as f64;
            let right = img.get_pixel(x + 1, y).0[0] as f64;

            let laplacian = top + bottom + left + right - 4.0 * center;
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

/// Mean and standard deviation of pixel intensities.
/// Returns `None` for an empty image.
pub fn intensity_stats(img: &GrayImage) -> Option<(f32, f32)> {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for pixel in img.pixels() {
        let val = pixel.0[0] as f64;
        sum += val;
        sum_sq += val * val;
        count += 1;
    }

    if count == 0 {
        return None;
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    Some((mean as f32, variance.max(0.0).sqrt() as f32))
}

// ═══════════════════════════════════════════════════════════
// Enhancement
// ═══════════════════════════════════════════════════════════

fn blend(degenerate: f32, original: f32, factor: f32) -> u8 {
    (degenerate + factor * (original - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Scale distance from the mean gray level by `factor`.
pub fn enhance_contrast(img: &GrayImage, factor: f32) -> GrayImage {
    let Some((mean, _)) = intensity_stats(img) else {
        return img.clone();
    };
    let mean = mean.round();

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = blend(mean, pixel.0[0] as f32, factor);
    }
    out
}

/// 3x3 smoothing (centre-weighted). Border pixels are copied unchanged.
pub fn smooth(img: &GrayImage) -> GrayImage {
    let (w, h) = (img.width(), img.height());
    let mut out = img.clone();
    if w < 3 || h < 3 {
        return out;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = 0u32;
            for dy in 0..3 {
                for dx in 0..3 {
                    let v = img.get_pixel(x + dx - 1, y + dy - 1).0[0] as u32;
                    acc += if dx == 1 && dy == 1 {
                        v * SMOOTH_CENTER_WEIGHT
                    } else {
                        v
                    };
                }
            }
            let value = (acc + SMOOTH_DIVISOR / 2) / SMOOTH_DIVISOR;
            out.put_pixel(x, y, Luma([value.min(255) as u8]));
        }
    }
    out
}

/// Push pixels away from a smoothed copy by `factor`.
pub fn enhance_sharpness(img: &GrayImage, factor: f32) -> GrayImage {
    let degenerate = smooth(img);
    let mut out = img.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let base = degenerate.get_pixel(x, y).0[0] as f32;
        pixel.0[0] = blend(base, pixel.0[0] as f32, factor);
    }
    out
}

/// Apply optional contrast then sharpness enhancement.
pub fn enhance(img: &GrayImage, contrast: Option<f32>, sharpness: Option<f32>) -> GrayImage {
    let mut current = match contrast {
        Some(factor) => enhance_contrast(img, factor),
        None => img.clone(),
    };
    if let Some(factor) = sharpness {
        current = enhance_sharpness(&current, factor);
    }
    debug!(
        width = current.width(),
        height = current.height(),
        ?contrast,
        ?sharpness,
        "Enhanced page raster"
    );
    current
}
