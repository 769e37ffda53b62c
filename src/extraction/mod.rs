pub mod types;
pub mod quality;
pub mod preprocess;
pub mod classifier;
pub mod policy;
pub mod pipeline;
pub mod rules;
pub mod correction;
pub mod confidence;
pub mod summary;
pub mod diagnostic;
pub mod pdfium;
pub mod ocr;
pub mod orchestrator;

pub use types::*;
pub use classifier::*;
pub use policy::*;
pub use pipeline::*;
pub use correction::*;
pub use summary::*;
pub use diagnostic::*;
pub use ocr::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF could not be loaded: {0}")]
    PdfLoad(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("Rendering page {page} failed: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("Reading text of page {page} failed: {reason}")]
    PageText { page: usize, reason: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("Tesseract OCR configuration error: {0}")]
    OcrConfig(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Output serialization failed: {0}")]
    Output(#[from] serde_json::Error),
}
