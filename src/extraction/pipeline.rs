//! Per-page extraction with OCR fallback.
//!
//! Pages are visited in ascending order up to the policy's cap. Each page
//! tries its text layer first; when that is too thin and the method calls for
//! OCR, the page is rendered, enhanced per the method's profile and sent to
//! the recognition backend. A page that cannot be rendered or recognized is
//! recorded as failed and the loop moves on.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::policy::{EnhancementProfile, ExtractionPolicy};
use super::preprocess::{decode_gray, encode_png, enhance};
use super::types::{
    trimmed_char_count, ExtractionMethod, OcrEngine, PageResult, PageSource, PageStatus,
    PdfDocument, RecognitionRequest,
};
use super::ExtractionError;

/// Per-document result of the page loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pages: Vec<PageResult>,
    pub page_count: usize,
    pub pages_processed: usize,
    pub pages_skipped: usize,
    pub total_chars: usize,
}

impl PipelineReport {
    pub fn has_usable_text(&self) -> bool {
        self.pages.iter().any(PageResult::has_text)
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_failed()).count()
    }

    /// Join pages into one text, each preceded by its page marker.
    pub fn assemble(&self) -> String {
        assemble_pages(&self.pages)
    }
}

/// Marker line placed before each page's text.
pub fn page_marker(page: &PageResult) -> String {
    match (&page.status, page.source) {
        (PageStatus::Failed { .. }, PageSource::Ocr) => {
            format!("--- Page {} (OCR failed) ---", page.page_number)
        }
        (PageStatus::Failed { .. }, PageSource::Direct) => {
            format!("--- Page {} (failed) ---", page.page_number)
        }
        (_, PageSource::Ocr) => format!("--- Page {} (OCR) ---", page.page_number),
        (_, PageSource::Direct) => format!("--- Page {} ---", page.page_number),
    }
}

pub fn assemble_pages(pages: &[PageResult]) -> String {
    pages
        .iter()
        .map(|page| {
            let marker = page_marker(page);
            let body = page.text.trim();
            if body.is_empty() {
                marker
            } else {
                format!("{marker}\n{body}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct ExtractionPipeline<'a> {
    ocr: &'a dyn OcrEngine,
    policy: &'a dyn ExtractionPolicy,
    request: RecognitionRequest,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(
        ocr: &'a dyn OcrEngine,
        policy: &'a dyn ExtractionPolicy,
        request: RecognitionRequest,
    ) -> Self {
        Self {
            ocr,
            policy,
            request,
        }
    }

    pub fn run(&self, document: &dyn PdfDocument, method: ExtractionMethod) -> PipelineReport {
        let page_count = document.page_count();
        let pages_processed = match self.policy.page_cap(method) {
            Some(cap) => page_count.min(cap),
            None => page_count,
        };
        let threshold = self.policy.direct_text_threshold(method);
        let profile = self.policy.enhancement(method);

        let mut slots: Vec<Option<PageResult>> = Vec::with_capacity(pages_processed);
        let mut needs_ocr = Vec::new();
        for (index, text) in document.page_texts(0..pages_processed).into_iter().enumerate() {
            let page = self.direct_page(index, text, method, threshold);
            if page.is_none() {
                needs_ocr.push(index);
            }
            slots.push(page);
        }

        if !needs_ocr.is_empty() {
            let mut visit = |index: usize, rendered: Result<Vec<u8>, ExtractionError>| {
                slots[index] = Some(self.recognize_page(index, rendered, &profile));
            };
            document.render_each(&needs_ocr, profile.render_scale, &mut visit);
        }

        let pages: Vec<PageResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| PageResult::failed(index, PageSource::Ocr, "page was not rendered"))
            })
            .collect();
        for page in &pages {
            debug!(
                page = page.page_number,
                source = ?page.source,
                chars = page.char_count,
                failed = page.is_failed(),
                "Page extracted"
            );
        }

        let total_chars = pages.iter().map(|p| p.char_count).sum();
        let pages_skipped = page_count - pages_processed;
        if pages_skipped > 0 {
            info!(
                page_count,
                pages_processed, pages_skipped, "Page cap reached, remaining pages skipped"
            );
        }

        PipelineReport {
            pages,
            page_count,
            pages_processed,
            pages_skipped,
            total_chars,
        }
    }

    /// Accept the text layer, fail the page, or `None` to send it to OCR.
    fn direct_page(
        &self,
        index: usize,
        text: Result<String, ExtractionError>,
        method: ExtractionMethod,
        threshold: usize,
    ) -> Option<PageResult> {
        match text {
            Ok(text) if !method.is_ocr() || trimmed_char_count(&text) > threshold => {
                Some(PageResult::direct(index, text))
            }
            Ok(_) => None,
            Err(e) if !method.is_ocr() => {
                warn!(page = index + 1, error = %e, "Direct extraction failed");
                Some(PageResult::failed(index, PageSource::Direct, e.to_string()))
            }
            Err(e) => {
                warn!(page = index + 1, error = %e, "Direct extraction failed, falling back to OCR");
                None
            }
        }
    }

    fn recognize_page(
        &self,
        index: usize,
        rendered: Result<Vec<u8>, ExtractionError>,
        profile: &EnhancementProfile,
    ) -> PageResult {
        let recognized = rendered
            .and_then(|png| prepare(png, profile))
            .and_then(|png| self.ocr.recognize(&png, &self.request));
        match recognized {
            Ok(result) => PageResult::ocr(index, result.text, result.confidence),
            Err(e) => {
                warn!(page = index + 1, error = %e, "OCR failed for page");
                PageResult::failed(index, PageSource::Ocr, e.to_string())
            }
        }
    }
}

/// Apply the profile's enhancement to a rendered page.
fn prepare(rendered: Vec<u8>, profile: &EnhancementProfile) -> Result<Vec<u8>, ExtractionError> {
    if !profile.is_enhanced() {
        return Ok(rendered);
    }
    let gray = decode_gray(&rendered)?;
    encode_png(&enhance(&gray, profile.contrast, profile.sharpness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ocr::MockOcrEngine;
    use crate::extraction::pdfium::{MockDocument, MockPage};
    use crate::extraction::policy::{BaselinePolicy, ImprovedPolicy, PolicyKind};
    use crate::extraction::types::PageSegmentation;
    use image::{GrayImage, Luma};

    fn scan() -> GrayImage {
        GrayImage::from_fn(24, 24, |x, _| Luma([if x % 4 < 2 { 20 } else { 230 }]))
    }

    fn request() -> RecognitionRequest {
        RecognitionRequest::new(&["rus".into(), "eng".into()], PageSegmentation::UniformBlock)
    }

    fn long_text() -> String {
        "Direct text layer content that is long enough to be accepted.".to_string()
    }

    #[test]
    fn direct_text_preferred_over_ocr() {
        let doc = MockDocument::new(vec![MockPage::text(&long_text())]);
        let ocr = MockOcrEngine::new("ocr text", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);
        assert_eq!(report.pages[0].source, PageSource::Direct);
        assert_eq!(ocr.calls(), 0);
    }

    #[test]
    fn short_text_falls_back_to_ocr() {
        let doc = MockDocument::new(vec![MockPage::text("short").with_image(scan())]);
        let ocr = MockOcrEngine::new("recognized page text", 0.8);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrEnhanced);
        let page = &report.pages[0];
        assert_eq!(page.source, PageSource::Ocr);
        assert_eq!(page.text, "recognized page text");
        assert_eq!(page.ocr_confidence, Some(0.8));
        assert_eq!(ocr.calls(), 1);
    }

    #[test]
    fn text_extraction_keeps_short_direct_text() {
        let doc = MockDocument::new(vec![MockPage::text("tiny"), MockPage::text("")]);
        let ocr = MockOcrEngine::new("never", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::TextExtraction);
        assert_eq!(report.pages[0].text, "tiny");
        assert_eq!(report.pages[1].status, PageStatus::Empty);
        assert!(report.pages.iter().all(|p| p.source == PageSource::Direct));
        assert_eq!(ocr.calls(), 0);
    }

    #[test]
    fn recognition_uses_language_hints_and_block_mode() {
        let doc = MockDocument::new(vec![MockPage::scanned(scan())]);
        let ocr = MockOcrEngine::new("text", 0.7);
        ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);
        let seen = ocr.last_request().unwrap();
        assert_eq!(seen.language_spec(), "rus+eng");
        assert_eq!(seen.segmentation.psm(), "6");
    }

    #[test]
    fn one_failing_page_among_five() {
        let pages = (0..5).map(|_| MockPage::scanned(scan())).collect();
        let doc = MockDocument::new(pages);
        let ocr = MockOcrEngine::new("page body", 0.9).failing_on(3);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrAdvanced);

        assert_eq!(report.pages.len(), 5);
        assert_eq!(report.failed_pages(), 1);
        assert_eq!(report.pages.iter().filter(|p| p.has_text()).count(), 4);
        assert!(report.pages[2].is_failed());
        assert!(report.pages[2].text.is_empty());
    }

    #[test]
    fn render_failure_marks_page_failed() {
        let doc = MockDocument::new(vec![MockPage::render_error(), MockPage::scanned(scan())]);
        let ocr = MockOcrEngine::new("ok", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);
        assert!(report.pages[0].is_failed());
        assert!(report.pages[1].has_text());
    }

    #[test]
    fn page_cap_limits_visits() {
        let pages = (0..14).map(|_| MockPage::scanned(scan())).collect();
        let doc = MockDocument::new(pages);
        let ocr = MockOcrEngine::new("text", 0.9);
        let report = ExtractionPipeline::new(&ocr, &BaselinePolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);

        assert_eq!(report.page_count, 14);
        assert_eq!(report.pages_processed, 10);
        assert_eq!(report.pages_skipped, 4);
        assert_eq!(report.pages.len(), 10);
        assert_eq!(ocr.calls(), 10);
        assert_eq!(doc.accesses_beyond(10), 0);
    }

    #[test]
    fn configured_cap_applies_to_text_extraction() {
        let pages = (0..6).map(|_| MockPage::text(&long_text())).collect();
        let doc = MockDocument::new(pages);
        let ocr = MockOcrEngine::new("x", 0.9);
        let policy = PolicyKind::Improved.build(Some(2));
        let report = ExtractionPipeline::new(&ocr, policy.as_ref(), request())
            .run(&doc, ExtractionMethod::TextExtraction);
        assert_eq!(report.pages_processed, 2);
        assert_eq!(report.pages_skipped, 4);
    }

    #[test]
    fn baseline_threshold_sends_medium_text_to_ocr() {
        // 80 chars: accepted by improved (> 50), rejected by baseline advanced (<= 150).
        let text = "a".repeat(80);
        let doc = MockDocument::new(vec![MockPage::text(&text).with_image(scan())]);
        let ocr = MockOcrEngine::new("ocr", 0.9);

        let improved = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrAdvanced);
        assert_eq!(improved.pages[0].source, PageSource::Direct);

        let baseline = ExtractionPipeline::new(&ocr, &BaselinePolicy, request())
            .run(&doc, ExtractionMethod::OcrAdvanced);
        assert_eq!(baseline.pages[0].source, PageSource::Ocr);
    }

    #[test]
    fn total_chars_sums_pages() {
        let doc = MockDocument::new(vec![MockPage::text(&long_text()), MockPage::scanned(scan())]);
        let ocr = MockOcrEngine::new("12345", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);
        assert_eq!(report.total_chars, long_text().chars().count() + 5);
    }

    #[test]
    fn assembly_marks_every_page() {
        let pages = vec![
            PageResult::direct(0, "first".into()),
            PageResult::ocr(1, "second".into(), 0.8),
            PageResult::failed(2, PageSource::Ocr, "boom"),
        ];
        let text = assemble_pages(&pages);
        assert_eq!(
            text,
            "--- Page 1 ---\nfirst\n\n--- Page 2 (OCR) ---\nsecond\n\n--- Page 3 (OCR failed) ---"
        );
    }

    #[test]
    fn direct_failure_is_not_labelled_ocr() {
        let doc = MockDocument::new(vec![
            MockPage::text(&long_text()),
            MockPage::text_error("broken content stream"),
        ]);
        let ocr = MockOcrEngine::new("never", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::TextExtraction);

        assert_eq!(report.pages[1].source, PageSource::Direct);
        assert!(report.pages[1].is_failed());
        assert!(report.assemble().ends_with("--- Page 2 (failed) ---"));
        assert_eq!(ocr.calls(), 0);
    }

    #[test]
    fn text_error_under_ocr_falls_back_to_recognition() {
        let doc = MockDocument::new(vec![MockPage::text_error("no layer").with_image(scan())]);
        let ocr = MockOcrEngine::new("recognized", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);
        assert_eq!(report.pages[0].source, PageSource::Ocr);
        assert!(report.pages[0].has_text());
    }

    #[test]
    fn document_read_in_one_pass_per_kind() {
        let pages = vec![
            MockPage::text(&long_text()),
            MockPage::scanned(scan()),
            MockPage::text(&long_text()),
            MockPage::scanned(scan()),
        ];
        let doc = MockDocument::new(pages);
        let ocr = MockOcrEngine::new("text", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);

        assert_eq!(doc.text_passes(), 1);
        assert_eq!(doc.render_passes(), 1);
        let sources: Vec<_> = report.pages.iter().map(|p| p.source).collect();
        assert_eq!(
            sources,
            vec![PageSource::Direct, PageSource::Ocr, PageSource::Direct, PageSource::Ocr]
        );
    }

    #[test]
    fn born_digital_never_renders() {
        let doc = MockDocument::new(vec![MockPage::text(&long_text()); 3]);
        let ocr = MockOcrEngine::new("x", 0.9);
        ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::TextExtraction);
        assert_eq!(doc.render_passes(), 0);
    }

    #[test]
    fn empty_document_yields_empty_report() {
        let doc = MockDocument::new(vec![]);
        let ocr = MockOcrEngine::new("x", 0.9);
        let report = ExtractionPipeline::new(&ocr, &ImprovedPolicy, request())
            .run(&doc, ExtractionMethod::OcrSimple);
        assert!(report.pages.is_empty());
        assert!(!report.has_usable_text());
        assert_eq!(report.assemble(), "");
    }
}
