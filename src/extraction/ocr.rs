use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::types::{OcrEngine, OcrPageResult, RecognitionRequest};
use super::ExtractionError;

/// Tesseract OCR engine backed by a tessdata directory.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractEngine {
    tessdata_dir: std::path::PathBuf,
}

#[cfg(feature = "ocr")]
impl TesseractEngine {
    pub fn new(tessdata_dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.is_dir() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
        })
    }

    /// Every requested language needs its traineddata file.
    fn check_languages(&self, request: &RecognitionRequest) -> Result<(), ExtractionError> {
        let missing: Vec<_> = request
            .languages
            .iter()
            .filter(|lang| {
                !self
                    .tessdata_dir
                    .join(format!("{lang}.traineddata"))
                    .exists()
            })
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ExtractionError::OcrInit(format!(
                "traineddata missing in {} for: {}",
                self.tessdata_dir.display(),
                missing.join(", ")
            )))
        }
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractEngine {
    fn recognize(
        &self,
        image_png: &[u8],
        request: &RecognitionRequest,
    ) -> Result<OcrPageResult, ExtractionError> {
        self.check_languages(request)?;

        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;
        let lang = request.language_spec();

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(&lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let tess = tess
            .set_variable("tessedit_pageseg_mode", request.segmentation.psm())
            .map_err(|e| ExtractionError::OcrConfig(format!("Failed to set page segmentation: {e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_png)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        tracing::debug!(
            lang = %lang,
            psm = request.segmentation.psm(),
            chars = text.len(),
            confidence,
            "Tesseract recognized page"
        );

        Ok(OcrPageResult { text, confidence })
    }
}

/// Stand-in when no recognition backend is compiled in or configured.
/// Every call fails, so OCR pages come out as failed pages.
pub struct UnavailableOcrEngine {
    reason: String,
}

impl UnavailableOcrEngine {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl OcrEngine for UnavailableOcrEngine {
    fn recognize(
        &self,
        _image_png: &[u8],
        _request: &RecognitionRequest,
    ) -> Result<OcrPageResult, ExtractionError> {
        Err(ExtractionError::OcrInit(self.reason.clone()))
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    /// 1-based call number that fails, if any.
    fail_on: Option<usize>,
    calls: AtomicUsize,
    last_request: Mutex<Option<RecognitionRequest>>,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            fail_on: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RecognitionRequest> {
        self.last_request.lock().ok().and_then(|slot| slot.clone())
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(
        &self,
        _image_png: &[u8],
        request: &RecognitionRequest,
    ) -> Result<OcrPageResult, ExtractionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut slot) = self.last_request.lock() {
            *slot = Some(request.clone());
        }
        if self.fail_on == Some(call) {
            return Err(ExtractionError::OcrProcessing(format!(
                "mock failure on call {call}"
            )));
        }
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}
