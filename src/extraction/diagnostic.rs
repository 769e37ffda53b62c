//! Quick per-file diagnosis: document facts plus a direct-vs-OCR verdict,
//! without running the extraction pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::classifier::QualityClassifier;
use super::types::{trimmed_char_count, ClassificationResult, DocumentSource, PdfDocument};
use super::ExtractionError;

/// Pages sampled for the extractable-text estimate.
const DIAGNOSIS_SAMPLE_PAGES: usize = 3;

/// Fewer extractable chars than this over the sample means OCR is needed.
pub const OCR_REQUIRED_BELOW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosisVerdict {
    DirectExtraction,
    OcrRequired,
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDiagnosis {
    pub path: PathBuf,
    pub filename: String,
    pub pages: usize,
    pub encrypted: bool,
    pub metadata: BTreeMap<String, String>,
    pub extractable_chars: usize,
    pub requires_ocr: bool,
    pub quality: Option<ClassificationResult>,
    pub verdict: DiagnosisVerdict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisBatch {
    pub total_files: usize,
    pub direct_extraction: usize,
    pub ocr_required: usize,
    pub errors: usize,
    pub files: Vec<DocumentDiagnosis>,
}

fn filename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn sample_chars(document: &dyn PdfDocument) -> usize {
    document
        .page_texts(0..DIAGNOSIS_SAMPLE_PAGES.min(document.page_count()))
        .into_iter()
        .enumerate()
        .map(|(index, text)| match text {
            Ok(text) => trimmed_char_count(&text),
            Err(e) => {
                warn!(page = index, error = %e, "Skipping unreadable page in diagnosis");
                0
            }
        })
        .sum()
}

/// Diagnose one file. Unreadable files get an `Error` verdict.
pub fn diagnose(
    source: &dyn DocumentSource,
    classifier: &QualityClassifier,
    path: &Path,
) -> DocumentDiagnosis {
    let filename = filename_of(path);
    let document = match source.open(path) {
        Ok(document) => document,
        Err(e) => {
            warn!(file = %filename, error = %e, "Diagnosis could not open file");
            return DocumentDiagnosis {
                path: path.to_path_buf(),
                filename,
                pages: 0,
                encrypted: matches!(e, ExtractionError::PdfEncrypted),
                metadata: BTreeMap::new(),
                extractable_chars: 0,
                requires_ocr: true,
                quality: None,
                verdict: DiagnosisVerdict::Error {
                    reason: e.to_string(),
                },
            };
        }
    };

    let info = document.info().clone();
    let extractable_chars = sample_chars(document.as_ref());
    let requires_ocr = extractable_chars < OCR_REQUIRED_BELOW_CHARS;
    let quality = classifier.classify(document.as_ref());
    drop(document);

    info!(
        file = %filename,
        pages = info.page_count,
        extractable_chars,
        requires_ocr,
        tier = %quality.tier,
        "Diagnosed document"
    );

    DocumentDiagnosis {
        path: path.to_path_buf(),
        filename,
        pages: info.page_count,
        encrypted: info.encrypted,
        metadata: info.metadata,
        extractable_chars,
        requires_ocr,
        quality: Some(quality),
        verdict: if requires_ocr {
            DiagnosisVerdict::OcrRequired
        } else {
            DiagnosisVerdict::DirectExtraction
        },
    }
}

pub fn diagnose_many<P: AsRef<Path>>(
    source: &dyn DocumentSource,
    classifier: &QualityClassifier,
    paths: &[P],
) -> DiagnosisBatch {
    let files: Vec<_> = paths
        .iter()
        .map(|p| diagnose(source, classifier, p.as_ref()))
        .collect();

    let mut batch = DiagnosisBatch {
        total_files: files.len(),
        ..Default::default()
    };
    for file in &files {
        match file.verdict {
            DiagnosisVerdict::DirectExtraction => batch.direct_extraction += 1,
            DiagnosisVerdict::OcrRequired => batch.ocr_required += 1,
            DiagnosisVerdict::Error { .. } => batch.errors += 1,
        }
    }
    batch.files = files;
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::pdfium::{MockDocument, MockDocumentSource, MockPage};
    use crate::extraction::types::QualityTier;
    use image::{GrayImage, Luma};

    fn source() -> MockDocumentSource {
        MockDocumentSource::new()
            .with_document(
                "/docs/digital.pdf",
                vec![MockPage::text(&"Born digital order text. ".repeat(10)); 4],
            )
            .with_document(
                "/docs/scan.pdf",
                vec![MockPage::scanned(GrayImage::from_pixel(20, 20, Luma([250])))],
            )
            .with_encrypted("/docs/locked.pdf")
    }

    #[test]
    fn digital_file_needs_no_ocr() {
        let d = diagnose(&source(), &QualityClassifier::default(), Path::new("/docs/digital.pdf"));
        assert_eq!(d.filename, "digital.pdf");
        assert_eq!(d.pages, 4);
        assert!(!d.requires_ocr);
        assert_eq!(d.verdict, DiagnosisVerdict::DirectExtraction);
        assert_eq!(d.quality.unwrap().tier, QualityTier::A);
    }

    #[test]
    fn scanned_file_needs_ocr() {
        let d = diagnose(&source(), &QualityClassifier::default(), Path::new("/docs/scan.pdf"));
        assert_eq!(d.extractable_chars, 0);
        assert!(d.requires_ocr);
        assert!(d.quality.unwrap().method.is_ocr());
    }

    #[test]
    fn encrypted_file_is_error() {
        let d = diagnose(&source(), &QualityClassifier::default(), Path::new("/docs/locked.pdf"));
        assert!(d.encrypted);
        assert!(d.requires_ocr);
        assert!(matches!(d.verdict, DiagnosisVerdict::Error { .. }));
    }

    #[test]
    fn reports_metadata_and_permissions() {
        let source = MockDocumentSource::new().with_mock(
            "/docs/restricted.pdf",
            MockDocument::new(vec![MockPage::text(&"Текст приказа. ".repeat(10))])
                .with_metadata("author", "Минздрав")
                .encrypted(),
        );
        let d = diagnose(&source, &QualityClassifier::default(), Path::new("/docs/restricted.pdf"));
        assert!(d.encrypted);
        assert_eq!(d.metadata.get("author").map(String::as_str), Some("Минздрав"));
        assert_eq!(d.verdict, DiagnosisVerdict::DirectExtraction);
    }

    #[test]
    fn batch_counts() {
        let src = source();
        let batch = diagnose_many(
            &src,
            &QualityClassifier::default(),
            &["/docs/digital.pdf", "/docs/scan.pdf", "/docs/locked.pdf", "/docs/missing.pdf"],
        );
        assert_eq!(batch.total_files, 4);
        assert_eq!(batch.direct_extraction, 1);
        assert_eq!(batch.ocr_required, 1);
        assert_eq!(batch.errors, 2);
        assert_eq!(src.released(), src.opened());
    }
}
