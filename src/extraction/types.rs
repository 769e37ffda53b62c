use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::correction::CorrectionReport;
use super::policy::PolicyKind;
use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Quality tiers
// ═══════════════════════════════════════════════════════════

/// Document quality tier, ordered best (A) to worst (D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    A,
    B,
    C,
    D,
}

/// Presentation data for a tier. Kept apart from classification logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierDisplay {
    pub label: &'static str,
    pub badge: &'static str,
    pub description: &'static str,
}

const TIER_DISPLAY: [TierDisplay; 4] = [
    TierDisplay {
        label: "excellent",
        badge: "🟢",
        description: "Born-digital text layer",
    },
    TierDisplay {
        label: "good",
        badge: "🟡",
        description: "Clean scan",
    },
    TierDisplay {
        label: "medium",
        badge: "🟠",
        description: "Average scan",
    },
    TierDisplay {
        label: "poor",
        badge: "🔴",
        description: "Degraded scan",
    },
];

impl QualityTier {
    pub const ALL: [QualityTier; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub fn display(self) -> &'static TierDisplay {
        &TIER_DISPLAY[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════
// Extraction methods
// ═══════════════════════════════════════════════════════════

/// How a document's text is recovered. A pure function of its tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    TextExtraction,
    OcrSimple,
    OcrEnhanced,
    OcrAdvanced,
}

impl ExtractionMethod {
    pub const ALL: [ExtractionMethod; 4] = [
        Self::TextExtraction,
        Self::OcrSimple,
        Self::OcrEnhanced,
        Self::OcrAdvanced,
    ];

    pub fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::A => Self::TextExtraction,
            QualityTier::B => Self::OcrSimple,
            QualityTier::C => Self::OcrEnhanced,
            QualityTier::D => Self::OcrAdvanced,
        }
    }

    pub fn is_ocr(self) -> bool {
        !matches!(self, Self::TextExtraction)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextExtraction => "text_extraction",
            Self::OcrSimple => "ocr_simple",
            Self::OcrEnhanced => "ocr_enhanced",
            Self::OcrAdvanced => "ocr_advanced",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════

/// Verdict of the quality classifier for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tier: QualityTier,
    pub confidence: f32,
    pub method: ExtractionMethod,
    pub sampled_pages: usize,
    pub sampled_chars: usize,
    pub has_text_layer: bool,
    /// Averaged image score of the rendered samples, when rendering was needed.
    pub image_score: Option<f32>,
    /// Set when the fail-safe floor was used because something went wrong.
    pub degraded: Option<String>,
}

impl ClassificationResult {
    pub fn new(tier: QualityTier, confidence: f32) -> Self {
        Self {
            tier,
            confidence: confidence.clamp(0.0, 1.0),
            method: ExtractionMethod::for_tier(tier),
            sampled_pages: 0,
            sampled_chars: 0,
            has_text_layer: false,
            image_score: None,
            degraded: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

// ═══════════════════════════════════════════════════════════
// Per-page results
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    Direct,
    Ocr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    Extracted,
    Empty,
    Failed { reason: String },
}

/// Outcome of extracting one page. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based page index.
    pub index: usize,
    /// 1-based page number, as shown in page markers.
    pub page_number: usize,
    pub source: PageSource,
    #[serde(flatten)]
    pub status: PageStatus,
    pub text: String,
    pub char_count: usize,
    pub ocr_confidence: Option<f32>,
}

impl PageResult {
    pub fn direct(index: usize, text: String) -> Self {
        Self::build(index, PageSource::Direct, text, None)
    }

    pub fn ocr(index: usize, text: String, confidence: f32) -> Self {
        Self::build(index, PageSource::Ocr, text, Some(confidence))
    }

    pub fn failed(index: usize, source: PageSource, reason: impl Into<String>) -> Self {
        Self {
            index,
            page_number: index + 1,
            source,
            status: PageStatus::Failed {
                reason: reason.into(),
            },
            text: String::new(),
            char_count: 0,
            ocr_confidence: None,
        }
    }

    fn build(index: usize, source: PageSource, text: String, confidence: Option<f32>) -> Self {
        let char_count = trimmed_char_count(&text);
        let status = if char_count == 0 {
            PageStatus::Empty
        } else {
            PageStatus::Extracted
        };
        Self {
            index,
            page_number: index + 1,
            source,
            status,
            text,
            char_count,
            ocr_confidence: confidence,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, PageStatus::Failed { .. })
    }

    pub fn has_text(&self) -> bool {
        self.status == PageStatus::Extracted
    }
}

/// Character count of text after trimming surrounding whitespace.
pub fn trimmed_char_count(text: &str) -> usize {
    text.trim().chars().count()
}

// ═══════════════════════════════════════════════════════════
// Document outcome
// ═══════════════════════════════════════════════════════════

/// Document-level failure carried inside an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeError {
    Unreadable { reason: String },
    NoUsableText,
}

/// Everything downstream formatting needs about one processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub document_id: Uuid,
    pub source: PathBuf,
    pub policy: PolicyKind,
    pub method: ExtractionMethod,
    pub tier: QualityTier,
    pub confidence: f32,
    pub assembled_text: String,
    pub page_stats: Vec<PageResult>,
    pub page_count: usize,
    pub pages_processed: usize,
    pub pages_skipped: usize,
    pub total_chars: usize,
    pub ocr_confidence: Option<f32>,
    pub corrections: CorrectionReport,
    pub classification_degraded: Option<String>,
    pub error: Option<OutcomeError>,
    pub processed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ExtractionOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// ═══════════════════════════════════════════════════════════
// Collaborator traits
// ═══════════════════════════════════════════════════════════

/// Static facts about an opened document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub encrypted: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Opens documents by path.
pub trait DocumentSource {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, ExtractionError>;
}

/// An opened document. Dropping the handle releases it.
pub trait PdfDocument {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    /// Direct text-layer extraction for one page (0-based).
    fn page_text(&self, index: usize) -> Result<String, ExtractionError>;

    /// Render one page (0-based) at `scale` x its natural size, as PNG bytes.
    fn render(&self, index: usize, scale: f32) -> Result<Vec<u8>, ExtractionError>;

    /// Text layers of `pages`, in order. Backends that parse the file on
    /// every call override this to parse once.
    fn page_texts(&self, pages: Range<usize>) -> Vec<Result<String, ExtractionError>> {
        pages.map(|index| self.page_text(index)).collect()
    }

    /// Render `pages` in the given order, handing each PNG to `visit`.
    /// Only one raster is alive at a time.
    fn render_each(
        &self,
        pages: &[usize],
        scale: f32,
        visit: &mut dyn FnMut(usize, Result<Vec<u8>, ExtractionError>),
    ) {
        for &index in pages {
            visit(index, self.render(index, scale));
        }
    }
}

/// Tesseract page segmentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegmentation {
    Auto,
    #[default]
    UniformBlock,
}

impl PageSegmentation {
    pub fn psm(self) -> &'static str {
        match self {
            Self::Auto => "3",
            Self::UniformBlock => "6",
        }
    }
}

impl FromStr for PageSegmentation {
    type Err = ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "3" => Ok(Self::Auto),
            "block" | "uniform_block" | "6" => Ok(Self::UniformBlock),
            other => Err(ExtractionError::Config(format!(
                "unknown page segmentation '{other}' (expected 'auto' or 'block')"
            ))),
        }
    }
}

/// Parameters for one recognition call. The backend always runs in its
/// default engine mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionRequest {
    pub languages: Vec<String>,
    pub segmentation: PageSegmentation,
}

impl RecognitionRequest {
    pub fn new(languages: &[String], segmentation: PageSegmentation) -> Self {
        Self {
            languages: languages.to_vec(),
            segmentation,
        }
    }

    /// Tesseract language string, e.g. "rus+eng".
    pub fn language_spec(&self) -> String {
        self.languages.join("+")
    }
}

/// Raw result from the recognition backend
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPageResult {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine {
    fn recognize(
        &self,
        image_png: &[u8],
        request: &RecognitionRequest,
    ) -> Result<OcrPageResult, ExtractionError>;
}
