use super::types::{PageResult, PageSource};

/// Confidence thresholds for recognized pages
pub mod thresholds {
    /// Below this: recognition likely failed.
    pub const VERY_LOW: f32 = 0.30;

    /// Below this: significant uncertainty. Worth a warning in the log.
    pub const LOW: f32 = 0.50;
}

/// Mean recognition confidence over OCR pages, weighted by text length.
///
/// Returns `None` when no page went through OCR, and 0.0 when OCR pages
/// produced no text at all.
pub fn mean_ocr_confidence(pages: &[PageResult]) -> Option<f32> {
    let ocr_pages: Vec<_> = pages
        .iter()
        .filter(|p| p.source == PageSource::Ocr && !p.is_failed())
        .collect();
    if ocr_pages.is_empty() {
        return None;
    }

    let total_chars: usize = ocr_pages.iter().map(|p| p.char_count).sum();
    if total_chars == 0 {
        return Some(0.0);
    }

    let weighted_sum: f32 = ocr_pages
        .iter()
        .map(|p| p.ocr_confidence.unwrap_or(0.0) * p.char_count as f32)
        .sum();

    Some(weighted_sum / total_chars as f32)
}

/// Page numbers of OCR pages whose confidence is below `threshold`.
pub fn low_confidence_pages(pages: &[PageResult], threshold: f32) -> Vec<usize> {
    pages
        .iter()
        .filter(|p| p.ocr_confidence.is_some_and(|c| c < threshold))
        .map(|p| p.page_number)
        .collect()
}
