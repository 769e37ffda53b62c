//! Document quality classification.
//!
//! Samples the first pages' text layer; a dense text layer means the document
//! is born-digital (tier A). Otherwise the first pages are rendered and scored
//! as images to pick an OCR intensity (tiers B-D). Any failure to read the
//! document lands on the fail-safe floor: tier D with the most thorough OCR.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::quality::score_png;
use super::types::{trimmed_char_count, ClassificationResult, PdfDocument, QualityTier};
use super::ExtractionError;

/// Every threshold the classifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// A sampled page with more trimmed chars than this has a text layer.
    pub text_layer_min_chars: usize,
    /// Sampled chars must exceed this times the sample count for tier A.
    pub density_per_page: usize,
    pub text_sample_pages: usize,
    pub image_sample_pages: usize,
    /// Render scale used for image scoring.
    pub render_scale: f32,
    /// Image score above this is tier B.
    pub good_cutoff: f32,
    /// Image score above this (and not above `good_cutoff`) is tier C.
    pub medium_cutoff: f32,
    pub born_digital_confidence: f32,
    pub fail_safe_confidence: f32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            text_layer_min_chars: 50,
            density_per_page: 100,
            text_sample_pages: 3,
            image_sample_pages: 2,
            render_scale: 2.0,
            good_cutoff: 0.8,
            medium_cutoff: 0.6,
            born_digital_confidence: 0.95,
            fail_safe_confidence: 0.3,
        }
    }
}

/// Stateless classifier; every call re-examines the document.
#[derive(Debug, Clone, Default)]
pub struct QualityClassifier {
    thresholds: ClassifierThresholds,
}

impl QualityClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify an opened document. Never fails.
    pub fn classify(&self, document: &dyn PdfDocument) -> ClassificationResult {
        let t = &self.thresholds;
        let page_count = document.page_count();
        let sample_count = t.text_sample_pages.min(page_count);

        let mut sampled_chars = 0usize;
        let mut has_text_layer = false;
        for (index, text) in document.page_texts(0..sample_count).into_iter().enumerate() {
            match text {
                Ok(text) => {
                    let chars = trimmed_char_count(&text);
                    if chars > t.text_layer_min_chars {
                        has_text_layer = true;
                    }
                    sampled_chars += chars;
                }
                Err(e) => {
                    warn!(page = index, error = %e, "Text layer unreadable, using fail-safe tier");
                    return self.fail_safe(e.to_string());
                }
            }
        }

        if has_text_layer && sampled_chars > t.density_per_page * sample_count {
            info!(
                sampled_pages = sample_count,
                sampled_chars,
                tier = %QualityTier::A,
                "Dense text layer found"
            );
            let mut result = ClassificationResult::new(QualityTier::A, t.born_digital_confidence);
            result.sampled_pages = sample_count;
            result.sampled_chars = sampled_chars;
            result.has_text_layer = true;
            return result;
        }

        let mut result = self.classify_by_image(document);
        result.sampled_pages = sample_count;
        result.sampled_chars = sampled_chars;
        result.has_text_layer = has_text_layer;
        result
    }

    /// Fail-safe verdict used when the document cannot be examined.
    pub fn fail_safe(&self, reason: impl Into<String>) -> ClassificationResult {
        let mut result =
            ClassificationResult::new(QualityTier::D, self.thresholds.fail_safe_confidence);
        result.degraded = Some(reason.into());
        result
    }

    fn classify_by_image(&self, document: &dyn PdfDocument) -> ClassificationResult {
        let t = &self.thresholds;
        let sampled: Vec<usize> = (0..t.image_sample_pages.min(document.page_count())).collect();

        let mut scores = Vec::with_capacity(sampled.len());
        document.render_each(
            &sampled,
            t.render_scale,
            &mut |index: usize, rendered: Result<Vec<u8>, ExtractionError>| match rendered {
                Ok(png) => {
                    let score = score_png(&png);
                    debug!(page = index, score, "Scored rendered page");
                    scores.push(score);
                }
                Err(e) => warn!(page = index, error = %e, "Page render failed, skipping sample"),
            },
        );

        if scores.is_empty() {
            info!("No page could be scored, using fail-safe tier");
            return ClassificationResult::new(QualityTier::D, t.fail_safe_confidence);
        }

        let average = scores.iter().sum::<f32>() / scores.len() as f32;
        let tier = self.tier_for_score(average);
        info!(image_score = average, tier = %tier, samples = scores.len(), "Classified by image quality");

        let mut result = ClassificationResult::new(tier, average);
        result.image_score = Some(average);
        result
    }

    /// Map an averaged image score to a tier. Boundaries belong to the lower tier.
    pub fn tier_for_score(&self, score: f32) -> QualityTier {
        if score > self.thresholds.good_cutoff {
            QualityTier::B
        } else if score > self.thresholds.medium_cutoff {
            QualityTier::C
        } else {
            QualityTier::D
        }
    }
}
