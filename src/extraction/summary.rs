use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{ClassificationResult, ExtractionMethod, QualityTier};

/// Counts over a batch of classifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub direct_extraction: usize,
    pub ocr_required: usize,
    pub degraded: usize,
    pub by_tier: BTreeMap<QualityTier, usize>,
    pub by_method: BTreeMap<String, usize>,
    pub mean_confidence: Option<f32>,
}

/// Reduce classifications to batch counts. Pure.
pub fn summarize(results: &[ClassificationResult]) -> BatchSummary {
    let mut summary = BatchSummary {
        total: results.len(),
        ..Default::default()
    };

    for result in results {
        if result.method == ExtractionMethod::TextExtraction {
            summary.direct_extraction += 1;
        } else {
            summary.ocr_required += 1;
        }
        if result.is_degraded() {
            summary.degraded += 1;
        }
        *summary.by_tier.entry(result.tier).or_default() += 1;
        *summary
            .by_method
            .entry(result.method.as_str().to_string())
            .or_default() += 1;
    }

    if !results.is_empty() {
        let sum: f32 = results.iter().map(|r| r.confidence).sum();
        summary.mean_confidence = Some(sum / results.len() as f32);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert!(summary.mean_confidence.is_none());
        assert!(summary.by_tier.is_empty());
    }

    #[test]
    fn counts_direct_and_ocr() {
        let mut degraded = ClassificationResult::new(QualityTier::D, 0.3);
        degraded.degraded = Some("unreadable".into());
        let results = vec![
            ClassificationResult::new(QualityTier::A, 0.95),
            ClassificationResult::new(QualityTier::A, 0.95),
            ClassificationResult::new(QualityTier::B, 0.85),
            degraded,
        ];
        let summary = summarize(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.direct_extraction, 2);
        assert_eq!(summary.ocr_required, 2);
        assert_eq!(summary.degraded, 1);
        assert_eq!(summary.by_tier[&QualityTier::A], 2);
        assert_eq!(summary.by_method["ocr_advanced"], 1);
        let mean = summary.mean_confidence.unwrap();
        assert!((mean - 0.7625).abs() < 1e-4, "mean {mean}");
    }

    #[test]
    fn serializes_tier_keys() {
        let summary = summarize(&[ClassificationResult::new(QualityTier::C, 0.7)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["by_tier"]["C"], 1);
        assert_eq!(json["by_method"]["ocr_enhanced"], 1);
    }
}
