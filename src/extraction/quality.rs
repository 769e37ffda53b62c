//! Image quality scoring for rendered pages.
//!
//! `score = 0.4 * sharpness + 0.4 * contrast + 0.2 * brightness`, each
//! component normalized to [0, 1]:
//! - sharpness: Laplacian variance / 1000, capped at 1
//! - contrast: intensity standard deviation / 128, capped at 1
//! - brightness: 1 - |mean - 127.5| / 127.5 (1.0 at mid-gray)

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::preprocess::{compute_laplacian_variance, decode_gray, intensity_stats};

const SHARPNESS_WEIGHT: f32 = 0.4;
const CONTRAST_WEIGHT: f32 = 0.4;
const BRIGHTNESS_WEIGHT: f32 = 0.2;

/// Laplacian variance at which sharpness saturates.
const SHARPNESS_SATURATION: f32 = 1000.0;

/// Standard deviation at which contrast saturates.
const CONTRAST_SATURATION: f32 = 128.0;

const MID_GRAY: f32 = 127.5;

/// Per-component breakdown of an image score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub sharpness: f32,
    pub contrast: f32,
    pub brightness: f32,
    pub score: f32,
}

impl QualityScore {
    const ZERO: QualityScore = QualityScore {
        sharpness: 0.0,
        contrast: 0.0,
        brightness: 0.0,
        score: 0.0,
    };
}

/// Score a grayscale raster. Empty images score 0.0.
pub fn assess(img: &GrayImage) -> QualityScore {
    let Some((mean, std)) = intensity_stats(img) else {
        return QualityScore::ZERO;
    };

    let sharpness = (compute_laplacian_variance(img) / SHARPNESS_SATURATION).min(1.0);
    let contrast = (std / CONTRAST_SATURATION).min(1.0);
    let brightness = (1.0 - (mean - MID_GRAY).abs() / MID_GRAY).clamp(0.0, 1.0);

    let score = (SHARPNESS_WEIGHT * sharpness
        + CONTRAST_WEIGHT * contrast
        + BRIGHTNESS_WEIGHT * brightness)
        .clamp(0.0, 1.0);

    QualityScore {
        sharpness,
        contrast,
        brightness,
        score,
    }
}

pub fn score_gray(img: &GrayImage) -> f32 {
    assess(img).score
}

/// Score encoded image bytes. Anything that fails to decode scores 0.0.
pub fn score_png(bytes: &[u8]) -> f32 {
    match decode_gray(bytes) {
        Ok(img) => score_gray(&img),
        Err(e) => {
            debug!(error = %e, "Unscorable raster, scoring 0.0");
            0.0
        }
    }
}
