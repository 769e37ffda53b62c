use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use super::classifier::QualityClassifier;
use super::confidence::{low_confidence_pages, mean_ocr_confidence, thresholds};
use super::correction::{CorrectionEngine, CorrectionReport, TEXT_TOO_SHORT};
use super::diagnostic::{diagnose, diagnose_many, DiagnosisBatch, DocumentDiagnosis};
use super::pipeline::{ExtractionPipeline, PipelineReport};
use super::policy::ExtractionPolicy;
use super::summary::{summarize, BatchSummary};
use super::types::{
    ClassificationResult, DocumentSource, ExtractionOutcome, OcrEngine, OutcomeError,
    RecognitionRequest,
};
use crate::config::ExtractionConfig;

/// Classify-and-extract entry point.
/// Uses trait objects for document access and OCR, enabling dependency injection.
///
/// Holds no per-document state: every call opens, processes and releases its
/// own document, so one router can serve several threads.
pub struct ExtractionRouter {
    source: Box<dyn DocumentSource + Send + Sync>,
    ocr_engine: Box<dyn OcrEngine + Send + Sync>,
    policy: Box<dyn ExtractionPolicy + Send + Sync>,
    classifier: QualityClassifier,
    corrector: CorrectionEngine,
    config: ExtractionConfig,
}

impl ExtractionRouter {
    pub fn new(
        source: Box<dyn DocumentSource + Send + Sync>,
        ocr_engine: Box<dyn OcrEngine + Send + Sync>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            source,
            ocr_engine,
            policy: config.policy.build(config.page_cap),
            classifier: QualityClassifier::new(config.thresholds),
            corrector: CorrectionEngine::new(config.min_text_chars),
            config,
        }
    }

    /// Replace the configured policy.
    pub fn with_policy(mut self, policy: Box<dyn ExtractionPolicy + Send + Sync>) -> Self {
        self.policy = policy;
        self
    }

    /// Classification only. Unreadable documents get the degraded fail-safe.
    pub fn classify(&self, path: &Path) -> ClassificationResult {
        match self.source.open(path) {
            Ok(document) => self.classifier.classify(document.as_ref()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot open document for classification");
                self.classifier.fail_safe(e.to_string())
            }
        }
    }

    pub fn classify_batch<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<ClassificationResult> {
        paths.iter().map(|p| self.classify(p.as_ref())).collect()
    }

    /// Classify, extract and correct one document. Never fails: problems are
    /// reported inside the outcome.
    pub fn process(&self, path: &Path) -> ExtractionOutcome {
        self.run(path).1
    }

    /// Process every path, plus counts over their classifications.
    pub fn process_batch<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> (Vec<ExtractionOutcome>, BatchSummary) {
        let (classifications, outcomes): (Vec<_>, Vec<_>) =
            paths.iter().map(|p| self.run(p.as_ref())).unzip();
        let summary = summarize(&classifications);
        tracing::info!(
            total = summary.total,
            direct = summary.direct_extraction,
            ocr = summary.ocr_required,
            "Batch processed"
        );
        (outcomes, summary)
    }

    pub fn diagnose(&self, path: &Path) -> DocumentDiagnosis {
        diagnose(self.source.as_ref(), &self.classifier, path)
    }

    pub fn diagnose_batch<P: AsRef<Path>>(&self, paths: &[P]) -> DiagnosisBatch {
        diagnose_many(self.source.as_ref(), &self.classifier, paths)
    }

    fn run(&self, path: &Path) -> (ClassificationResult, ExtractionOutcome) {
        let started = Instant::now();
        let document_id = document_id_for(path);

        tracing::info!(
            document_id = %document_id,
            path = %path.display(),
            policy = self.policy.kind().as_str(),
            "Starting extraction"
        );

        let document = match self.source.open(path) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(document_id = %document_id, error = %e, "Document unreadable");
                let classification = self.classifier.fail_safe(e.to_string());
                let outcome = self.outcome(
                    path,
                    document_id,
                    &classification,
                    PipelineReport::default(),
                    String::new(),
                    CorrectionReport::default(),
                    Some(OutcomeError::Unreadable {
                        reason: e.to_string(),
                    }),
                    started,
                );
                return (classification, outcome);
            }
        };

        let classification = self.classifier.classify(document.as_ref());
        tracing::info!(
            document_id = %document_id,
            tier = %classification.tier,
            method = %classification.method,
            confidence = classification.confidence,
            "Document classified"
        );

        let request = RecognitionRequest::new(&self.config.languages, self.config.segmentation);
        let report = ExtractionPipeline::new(self.ocr_engine.as_ref(), self.policy.as_ref(), request)
            .run(document.as_ref(), classification.method);
        drop(document);

        let (corrected, corrections) = self.corrector.apply(&report.assemble());
        let (text, error) = if !report.has_usable_text() || corrected.is_insufficient() {
            (TEXT_TOO_SHORT.to_string(), Some(OutcomeError::NoUsableText))
        } else {
            (corrected.into_text(), None)
        };

        let outcome = self.outcome(
            path,
            document_id,
            &classification,
            report,
            text,
            corrections,
            error,
            started,
        );
        (classification, outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn outcome(
        &self,
        path: &Path,
        document_id: Uuid,
        classification: &ClassificationResult,
        report: PipelineReport,
        assembled_text: String,
        corrections: CorrectionReport,
        error: Option<OutcomeError>,
        started: Instant,
    ) -> ExtractionOutcome {
        let ocr_confidence = mean_ocr_confidence(&report.pages);
        let shaky = low_confidence_pages(&report.pages, thresholds::LOW);
        if !shaky.is_empty() {
            tracing::warn!(document_id = %document_id, pages = ?shaky, "Low OCR confidence");
        }
        if ocr_confidence.is_some_and(|c| c < thresholds::VERY_LOW) {
            tracing::warn!(document_id = %document_id, ?ocr_confidence, "Recognition likely failed");
        }

        let outcome = ExtractionOutcome {
            document_id,
            source: path.to_path_buf(),
            policy: self.policy.kind(),
            method: classification.method,
            tier: classification.tier,
            confidence: classification.confidence,
            assembled_text,
            page_count: report.page_count,
            pages_processed: report.pages_processed,
            pages_skipped: report.pages_skipped,
            total_chars: report.total_chars,
            page_stats: report.pages,
            ocr_confidence,
            corrections,
            classification_degraded: classification.degraded.clone(),
            error,
            processed_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            document_id = %outcome.document_id,
            method = %outcome.method,
            pages_processed = outcome.pages_processed,
            pages_skipped = outcome.pages_skipped,
            total_chars = outcome.total_chars,
            corrections = outcome.corrections.total(),
            error = ?outcome.error,
            elapsed_ms = outcome.elapsed_ms,
            "Extraction complete"
        );
        outcome
    }
}

/// Stable id for a source path.
pub fn document_id_for(path: &Path) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.to_string_lossy().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ocr::{MockOcrEngine, UnavailableOcrEngine};
    use crate::extraction::pdfium::{MockDocumentSource, MockPage};
    use crate::extraction::policy::{BaselinePolicy, PolicyKind};
    use crate::extraction::types::{ExtractionMethod, PageSegmentation, PageSource, QualityTier};
    use image::{GrayImage, Luma};
    use std::path::PathBuf;

    fn sharp_scan() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            Luma([if (x / 2 + y / 2) % 2 == 0 { 0 } else { 255 }])
        })
    }

    fn born_digital_page(n: usize) -> MockPage {
        MockPage::text(&format!("Page {n} of the order. ").repeat(20))
    }

    fn router_with(source: MockDocumentSource, ocr: MockOcrEngine) -> ExtractionRouter {
        ExtractionRouter::new(Box::new(source), Box::new(ocr), ExtractionConfig::default())
    }

    // ── End-to-end scenarios ──

    #[test]
    fn born_digital_document() {
        let source = MockDocumentSource::new().with_document(
            "/in/order.pdf",
            vec![born_digital_page(1), born_digital_page(2), born_digital_page(3)],
        );
        let router = router_with(source, MockOcrEngine::new("unused", 0.9));
        let outcome = router.process(Path::new("/in/order.pdf"));

        assert!(outcome.is_ok());
        assert_eq!(outcome.tier, QualityTier::A);
        assert_eq!(outcome.method, ExtractionMethod::TextExtraction);
        assert!((outcome.confidence - 0.95).abs() < 1e-6);

        let markers: Vec<_> = outcome
            .assembled_text
            .lines()
            .filter(|l| l.starts_with("--- Page"))
            .collect();
        assert_eq!(markers, vec!["--- Page 1 ---", "--- Page 2 ---", "--- Page 3 ---"]);
        assert!(outcome.ocr_confidence.is_none());
    }

    #[test]
    fn sharp_scanned_page() {
        let source = MockDocumentSource::new()
            .with_document("/in/scan.pdf", vec![MockPage::scanned(sharp_scan())]);
        let router = router_with(source, MockOcrEngine::new("ПРИКАЗ № 15 от 2О11 года", 0.88));
        let outcome = router.process(Path::new("/in/scan.pdf"));

        assert_eq!(outcome.tier, QualityTier::B);
        assert_eq!(outcome.method, ExtractionMethod::OcrSimple);
        assert_eq!(outcome.page_stats[0].source, PageSource::Ocr);
        assert_eq!(
            outcome.assembled_text,
            "--- Page 1 (OCR) ---\nПРИКАЗ № 15 от 2011 года"
        );
        assert_eq!(outcome.corrections.digit_repairs, 1);
        let confidence = outcome.ocr_confidence.unwrap();
        assert!((confidence - 0.88).abs() < 1e-4, "confidence {confidence}");
    }

    #[test]
    fn one_failed_page_does_not_fail_document() {
        let pages = (0..5).map(|_| MockPage::scanned(sharp_scan())).collect();
        let source = MockDocumentSource::new().with_document("/in/five.pdf", pages);
        let router = router_with(source, MockOcrEngine::new("recognized text", 0.9).failing_on(4));
        let outcome = router.process(Path::new("/in/five.pdf"));

        assert!(outcome.is_ok());
        assert_eq!(outcome.pages_processed, 5);
        assert_eq!(outcome.page_stats.iter().filter(|p| p.has_text()).count(), 4);
        assert!(outcome.page_stats[3].is_failed());
        assert!(outcome.assembled_text.contains("--- Page 4 (OCR failed) ---"));
    }

    #[test]
    fn unreadable_document_reports_error() {
        let source = MockDocumentSource::new().with_corrupt("/in/bad.pdf", "trailer not found");
        let router = router_with(source, MockOcrEngine::new("x", 0.9));
        let outcome = router.process(Path::new("/in/bad.pdf"));

        assert!(matches!(outcome.error, Some(OutcomeError::Unreadable { .. })));
        assert_eq!(outcome.tier, QualityTier::D);
        assert!(outcome.classification_degraded.is_some());
        assert!(outcome.page_stats.is_empty());
    }

    #[test]
    fn missing_file_reports_error() {
        let router = router_with(MockDocumentSource::new(), MockOcrEngine::new("x", 0.9));
        let outcome = router.process(Path::new("/in/nowhere.pdf"));
        assert!(matches!(outcome.error, Some(OutcomeError::Unreadable { .. })));
    }

    #[test]
    fn no_text_anywhere_is_no_usable_text() {
        let source = MockDocumentSource::new()
            .with_document("/in/blank.pdf", vec![MockPage::scanned(sharp_scan()); 2]);
        let router = ExtractionRouter::new(
            Box::new(source),
            Box::new(UnavailableOcrEngine::new("no backend")),
            ExtractionConfig::default(),
        );
        let outcome = router.process(Path::new("/in/blank.pdf"));

        assert_eq!(outcome.error, Some(OutcomeError::NoUsableText));
        assert_eq!(outcome.assembled_text, TEXT_TOO_SHORT);
        assert!(outcome.page_stats.iter().all(|p| p.is_failed()));
    }

    #[test]
    fn document_released_on_every_path() {
        let source = MockDocumentSource::new()
            .with_document("/in/a.pdf", vec![born_digital_page(1)])
            .with_document("/in/b.pdf", vec![MockPage::scanned(sharp_scan())])
            .with_document("/in/c.pdf", vec![MockPage::render_error()]);
        let handle = source.clone();
        let router = router_with(source, MockOcrEngine::new("text", 0.9));

        for path in ["/in/a.pdf", "/in/b.pdf", "/in/c.pdf"] {
            router.process(Path::new(path));
            router.classify(Path::new(path));
        }
        assert_eq!(handle.opened(), 6);
        assert_eq!(handle.released(), 6);
    }

    #[test]
    fn page_cap_reported() {
        let pages = (0..60).map(|_| MockPage::scanned(sharp_scan())).collect();
        let source = MockDocumentSource::new().with_document("/in/long.pdf", pages);
        let router = router_with(source, MockOcrEngine::new("text", 0.9));
        let outcome = router.process(Path::new("/in/long.pdf"));

        assert_eq!(outcome.page_count, 60);
        assert_eq!(outcome.pages_processed, 50);
        assert_eq!(outcome.pages_skipped, 10);
        assert!(outcome.is_ok());
    }

    #[test]
    fn baseline_policy_caps_lower() {
        let pages = (0..12).map(|_| MockPage::scanned(sharp_scan())).collect();
        let source = MockDocumentSource::new().with_document("/in/long.pdf", pages);
        let router = router_with(source, MockOcrEngine::new("text", 0.9))
            .with_policy(Box::new(BaselinePolicy));
        let outcome = router.process(Path::new("/in/long.pdf"));
        assert_eq!(outcome.pages_processed, 10);
        assert_eq!(outcome.policy, PolicyKind::Baseline);
    }

    #[test]
    fn configured_recognition_settings_reach_backend() {
        let source = MockDocumentSource::new()
            .with_document("/in/scan.pdf", vec![MockPage::scanned(sharp_scan())]);
        let config = ExtractionConfig {
            languages: vec!["ukr".into()],
            segmentation: PageSegmentation::Auto,
            ..Default::default()
        };
        let ocr = std::sync::Arc::new(MockOcrEngine::new("text", 0.9));
        struct Shared(std::sync::Arc<MockOcrEngine>);
        impl OcrEngine for Shared {
            fn recognize(
                &self,
                image_png: &[u8],
                request: &RecognitionRequest,
            ) -> Result<crate::extraction::types::OcrPageResult, crate::extraction::ExtractionError>
            {
                self.0.recognize(image_png, request)
            }
        }
        let router = ExtractionRouter::new(
            Box::new(source),
            Box::new(Shared(std::sync::Arc::clone(&ocr))),
            config,
        );
        router.process(Path::new("/in/scan.pdf"));
        let seen = ocr.last_request().unwrap();
        assert_eq!(seen.language_spec(), "ukr");
        assert_eq!(seen.segmentation, PageSegmentation::Auto);
    }

    #[test]
    fn document_id_stable_per_path() {
        let a = document_id_for(Path::new("/in/a.pdf"));
        assert_eq!(a, document_id_for(&PathBuf::from("/in/a.pdf")));
        assert_ne!(a, document_id_for(Path::new("/in/b.pdf")));
    }

    #[test]
    fn batch_summary_counts() {
        let source = MockDocumentSource::new()
            .with_document("/in/a.pdf", vec![born_digital_page(1); 3])
            .with_document("/in/b.pdf", vec![MockPage::scanned(sharp_scan())]);
        let router = router_with(source, MockOcrEngine::new("text", 0.9));
        let (outcomes, summary) =
            router.process_batch(&["/in/a.pdf", "/in/b.pdf", "/in/missing.pdf"]);

        assert_eq!(outcomes.len(), 3);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.direct_extraction, 1);
        assert_eq!(summary.ocr_required, 2);
        assert_eq!(summary.degraded, 1);
    }

    #[test]
    fn outcome_serializes() {
        let source = MockDocumentSource::new()
            .with_document("/in/a.pdf", vec![born_digital_page(1); 3]);
        let router = router_with(source, MockOcrEngine::new("text", 0.9));
        let outcome = router.process(Path::new("/in/a.pdf"));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["method"], "text_extraction");
        assert_eq!(json["tier"], "A");
        assert_eq!(json["policy"], "improved");
        assert_eq!(json["page_stats"][0]["status"], "extracted");
    }

    #[test]
    fn router_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExtractionRouter>();
    }
}
