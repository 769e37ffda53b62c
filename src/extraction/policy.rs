//! Extraction policies: the knobs that differ between processing profiles.
//!
//! The router and pipeline are shared; a policy only answers three questions
//! per method: when is direct text good enough, how many pages to visit, and
//! how to prepare a page raster for recognition.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::ExtractionMethod;
use super::ExtractionError;

/// How a page raster is rendered and enhanced before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementProfile {
    pub render_scale: f32,
    pub contrast: Option<f32>,
    pub sharpness: Option<f32>,
}

impl EnhancementProfile {
    pub const PLAIN: EnhancementProfile = EnhancementProfile {
        render_scale: 2.0,
        contrast: None,
        sharpness: None,
    };

    pub const ENHANCED: EnhancementProfile = EnhancementProfile {
        render_scale: 2.5,
        contrast: Some(2.2),
        sharpness: Some(2.0),
    };

    pub fn for_method(method: ExtractionMethod) -> Self {
        match method {
            ExtractionMethod::TextExtraction | ExtractionMethod::OcrSimple => Self::PLAIN,
            ExtractionMethod::OcrEnhanced | ExtractionMethod::OcrAdvanced => Self::ENHANCED,
        }
    }

    pub fn is_enhanced(&self) -> bool {
        self.contrast.is_some() || self.sharpness.is_some()
    }
}

pub trait ExtractionPolicy {
    fn kind(&self) -> PolicyKind;

    /// Direct text is accepted when its trimmed char count exceeds this.
    fn direct_text_threshold(&self, method: ExtractionMethod) -> usize;

    /// Maximum pages to visit, `None` for all.
    fn page_cap(&self, method: ExtractionMethod) -> Option<usize>;

    fn enhancement(&self, method: ExtractionMethod) -> EnhancementProfile {
        EnhancementProfile::for_method(method)
    }
}

/// Default profile: one direct-text threshold, generous OCR page cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImprovedPolicy;

/// OCR pages visited by the improved policy.
const IMPROVED_OCR_PAGE_CAP: usize = 50;
const IMPROVED_DIRECT_THRESHOLD: usize = 50;

impl ExtractionPolicy for ImprovedPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Improved
    }

    fn direct_text_threshold(&self, _method: ExtractionMethod) -> usize {
        IMPROVED_DIRECT_THRESHOLD
    }

    fn page_cap(&self, method: ExtractionMethod) -> Option<usize> {
        method.is_ocr().then_some(IMPROVED_OCR_PAGE_CAP)
    }
}

/// Cost-constrained profile: few OCR pages, stricter direct-text acceptance
/// the worse the document looks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselinePolicy;

const BASELINE_OCR_PAGE_CAP: usize = 10;

impl ExtractionPolicy for BaselinePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Baseline
    }

    fn direct_text_threshold(&self, method: ExtractionMethod) -> usize {
        match method {
            ExtractionMethod::TextExtraction => 0,
            ExtractionMethod::OcrSimple => 50,
            ExtractionMethod::OcrEnhanced => 100,
            ExtractionMethod::OcrAdvanced => 150,
        }
    }

    fn page_cap(&self, method: ExtractionMethod) -> Option<usize> {
        method.is_ocr().then_some(BASELINE_OCR_PAGE_CAP)
    }
}

/// Wraps a policy with a fixed page cap from configuration.
pub struct CappedPolicy {
    inner: Box<dyn ExtractionPolicy + Send + Sync>,
    cap: usize,
}

impl CappedPolicy {
    pub fn new(inner: Box<dyn ExtractionPolicy + Send + Sync>, cap: usize) -> Self {
        Self { inner, cap }
    }
}

impl ExtractionPolicy for CappedPolicy {
    fn kind(&self) -> PolicyKind {
        self.inner.kind()
    }

    fn direct_text_threshold(&self, method: ExtractionMethod) -> usize {
        self.inner.direct_text_threshold(method)
    }

    fn page_cap(&self, _method: ExtractionMethod) -> Option<usize> {
        Some(self.cap)
    }

    fn enhancement(&self, method: ExtractionMethod) -> EnhancementProfile {
        self.inner.enhancement(method)
    }
}

/// Policy selector used in configuration and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Improved,
    Baseline,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improved => "improved",
            Self::Baseline => "baseline",
        }
    }

    pub fn build(self, page_cap: Option<usize>) -> Box<dyn ExtractionPolicy + Send + Sync> {
        let base: Box<dyn ExtractionPolicy + Send + Sync> = match self {
            Self::Improved => Box::new(ImprovedPolicy),
            Self::Baseline => Box::new(BaselinePolicy),
        };
        match page_cap {
            Some(cap) => Box::new(CappedPolicy::new(base, cap)),
            None => base,
        }
    }
}

impl FromStr for PolicyKind {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "improved" => Ok(Self::Improved),
            "baseline" => Ok(Self::Baseline),
            other => Err(ExtractionError::Config(format!(
                "unknown policy '{other}' (expected 'improved' or 'baseline')"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improved_caps_only_ocr() {
        let p = ImprovedPolicy;
        assert_eq!(p.page_cap(ExtractionMethod::TextExtraction), None);
        assert_eq!(p.page_cap(ExtractionMethod::OcrAdvanced), Some(50));
        assert_eq!(p.direct_text_threshold(ExtractionMethod::OcrEnhanced), 50);
    }

    #[test]
    fn baseline_threshold_rises_with_method() {
        let p = BaselinePolicy;
        let thresholds: Vec<_> = ExtractionMethod::ALL
            .iter()
            .map(|m| p.direct_text_threshold(*m))
            .collect();
        assert_eq!(thresholds, vec![0, 50, 100, 150]);
        assert_eq!(p.page_cap(ExtractionMethod::OcrSimple), Some(10));
    }

    #[test]
    fn enhancement_by_method() {
        let plain = EnhancementProfile::for_method(ExtractionMethod::OcrSimple);
        assert!(!plain.is_enhanced());
        assert_eq!(plain.render_scale, 2.0);

        let heavy = EnhancementProfile::for_method(ExtractionMethod::OcrAdvanced);
        assert_eq!(heavy.render_scale, 2.5);
        assert_eq!(heavy.contrast, Some(2.2));
        assert_eq!(heavy.sharpness, Some(2.0));
    }

    #[test]
    fn configured_cap_overrides_policy() {
        let p = PolicyKind::Improved.build(Some(3));
        assert_eq!(p.page_cap(ExtractionMethod::TextExtraction), Some(3));
        assert_eq!(p.page_cap(ExtractionMethod::OcrSimple), Some(3));
        assert_eq!(p.kind(), PolicyKind::Improved);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("Baseline".parse::<PolicyKind>().unwrap(), PolicyKind::Baseline);
        assert_eq!(" improved ".parse::<PolicyKind>().unwrap(), PolicyKind::Improved);
        assert!(matches!(
            "premium".parse::<PolicyKind>(),
            Err(ExtractionError::Config(_))
        ));
    }
}
