//! PDF access via Google PDFium: text layer, page rendering, document facts.
//!
//! `PdfiumSource` is stateless (`Send + Sync`). Each operation creates a
//! fresh `Pdfium` instance because the upstream type is `!Send`. The OS
//! caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.
//!
//! An opened `PdfiumDocument` owns the file bytes; dropping it releases them.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{GrayImage, ImageOutputFormat, Luma};
use pdfium_render::prelude::{
    PdfDocument as ParsedPdf, PdfDocumentMetadataTagType, PdfRenderConfig,
    PdfSecurityHandlerRevision, Pdfium, PdfiumError,
};
use tracing::{debug, warn};

use super::preprocess::encode_png;
use super::types::{DocumentInfo, DocumentSource, PdfDocument};
use super::ExtractionError;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd scale factors.
const MAX_DIMENSION_PX: u32 = 4096;

const METADATA_TAGS: [(&str, PdfDocumentMetadataTagType); 8] = [
    ("title", PdfDocumentMetadataTagType::Title),
    ("author", PdfDocumentMetadataTagType::Author),
    ("subject", PdfDocumentMetadataTagType::Subject),
    ("keywords", PdfDocumentMetadataTagType::Keywords),
    ("creator", PdfDocumentMetadataTagType::Creator),
    ("producer", PdfDocumentMetadataTagType::Producer),
    ("creation_date", PdfDocumentMetadataTagType::CreationDate),
    ("modification_date", PdfDocumentMetadataTagType::ModificationDate),
];

/// Opens PDF files with PDFium.
pub struct PdfiumSource;

impl PdfiumSource {
    /// Create a new source, verifying the PDFium library is loadable.
    ///
    /// Discovery order:
    /// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
    /// 2. Alongside the running executable
    /// 3. System library search paths
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfLoad(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let candidates = [
                exe_dir.to_path_buf(),
                exe_dir.join("pdfium").join("lib"),
                exe_dir.join("..").join("lib"),
            ];

            for dir in &candidates {
                let lib_path = Pdfium::pdfium_platform_library_name_at_path(
                    dir.to_string_lossy().as_ref(),
                );
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::PdfLoad(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors, singling out encrypted documents.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = format!("{e}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfLoad(format!("Failed to load PDF: {e}"))
    }
}

/// Pixel dimensions for rendering at `scale`, capped to MAX_DIMENSION_PX.
///
/// Both sides are at least 1px. Aspect ratio is preserved when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, scale: f32) -> (u32, u32) {
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

fn page_index(index: usize) -> Result<u16, String> {
    u16::try_from(index).map_err(|_| format!("Page index {index} exceeds u16 maximum"))
}

impl DocumentSource for PdfiumSource {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let pdfium = load_pdfium()?;
        let info = {
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(map_load_error)?;

            let encrypted = !matches!(
                document.permissions().security_handler_revision(),
                Ok(PdfSecurityHandlerRevision::Unprotected) | Err(_)
            );

            let metadata = METADATA_TAGS
                .iter()
                .filter_map(|(key, tag)| {
                    document
                        .metadata()
                        .get(*tag)
                        .map(|t| t.value().trim().to_string())
                        .filter(|v| !v.is_empty())
                        .map(|v| (key.to_string(), v))
                })
                .collect::<BTreeMap<_, _>>();

            DocumentInfo {
                page_count: document.pages().len() as usize,
                encrypted,
                metadata,
            }
        };

        debug!(
            path = %path.display(),
            pages = info.page_count,
            encrypted = info.encrypted,
            size = bytes.len(),
            "Opened PDF"
        );

        Ok(Box::new(PdfiumDocument {
            path: path.to_path_buf(),
            bytes,
            info,
        }))
    }
}

/// A PDF opened through PDFium. Holds the file bytes; every operation parses
/// them once and serves all the pages it needs from that parse.
pub struct PdfiumDocument {
    path: PathBuf,
    bytes: Vec<u8>,
    info: DocumentInfo,
}

impl PdfiumDocument {
    fn with_parsed<T>(&self, f: impl FnOnce(&ParsedPdf<'_>) -> T) -> Result<T, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(map_load_error)?;
        debug!(path = %self.path.display(), "Parsed PDF");
        Ok(f(&document))
    }
}

fn page_text_of(document: &ParsedPdf<'_>, index: usize) -> Result<String, ExtractionError> {
    let text_error = |reason: String| ExtractionError::PageText {
        page: index,
        reason,
    };

    let page = document
        .pages()
        .get(page_index(index).map_err(text_error)?)
        .map_err(|e| text_error(format!("Page out of range: {e}")))?;
    let text = page
        .text()
        .map_err(|e| text_error(format!("Text layer unreadable: {e}")))?;
    Ok(text.all())
}

fn render_page(document: &ParsedPdf<'_>, index: usize, scale: f32) -> Result<Vec<u8>, ExtractionError> {
    let render_error = |reason: String| ExtractionError::PdfRendering {
        page: index,
        reason,
    };

    let pages = document.pages();
    let page = pages
        .get(page_index(index).map_err(render_error)?)
        .map_err(|_| {
            render_error(format!(
                "Page {index} out of range (document has {} pages)",
                pages.len()
            ))
        })?;

    let width_points = page.width().value;
    let height_points = page.height().value;
    let (target_w, target_h) = compute_render_dimensions(width_points, height_points, scale);

    let uncapped_w = (width_points * scale) as u32;
    let uncapped_h = (height_points * scale) as u32;
    if target_w != uncapped_w || target_h != uncapped_h {
        warn!(
            page = index,
            raw_width = uncapped_w,
            raw_height = uncapped_h,
            capped_width = target_w,
            capped_height = target_h,
            "Page dimensions capped to {MAX_DIMENSION_PX}px",
        );
    }

    let config = PdfRenderConfig::new()
        .set_target_width(target_w as i32)
        .set_maximum_height(target_h as i32);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| render_error(format!("Rendering failed: {e}")))?;

    let mut cursor = Cursor::new(Vec::new());
    bitmap
        .as_image()
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

    let png_bytes = cursor.into_inner();
    debug!(
        page = index,
        width = target_w,
        height = target_h,
        png_size = png_bytes.len(),
        "Rendered PDF page to PNG"
    );
    Ok(png_bytes)
}

impl PdfDocument for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_text(&self, index: usize) -> Result<String, ExtractionError> {
        self.with_parsed(|document| page_text_of(document, index))?
    }

    fn render(&self, index: usize, scale: f32) -> Result<Vec<u8>, ExtractionError> {
        self.with_parsed(|document| render_page(document, index, scale))?
    }

    fn page_texts(&self, pages: Range<usize>) -> Vec<Result<String, ExtractionError>> {
        let wanted = pages.clone();
        match self.with_parsed(|document| wanted.map(|index| page_text_of(document, index)).collect()) {
            Ok(texts) => texts,
            Err(e) => {
                let reason = e.to_string();
                pages
                    .map(|page| {
                        Err(ExtractionError::PageText {
                            page,
                            reason: reason.clone(),
                        })
                    })
                    .collect()
            }
        }
    }

    fn render_each(
        &self,
        pages: &[usize],
        scale: f32,
        visit: &mut dyn FnMut(usize, Result<Vec<u8>, ExtractionError>),
    ) {
        let parsed = self.with_parsed(|document| {
            for &index in pages {
                visit(index, render_page(document, index, scale));
            }
        });
        if let Err(e) = parsed {
            let reason = e.to_string();
            for &page in pages {
                visit(
                    page,
                    Err(ExtractionError::PdfRendering {
                        page,
                        reason: reason.clone(),
                    }),
                );
            }
        }
    }
}

impl Drop for PdfiumDocument {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Released PDF");
    }
}

// ── Mocks for testing ─────────────────────────────────────

/// One page of a mock document.
#[derive(Debug, Clone)]
pub struct MockPage {
    text: Result<String, String>,
    image: Option<GrayImage>,
    render_fails: bool,
}

impl MockPage {
    /// A page with a text layer. Renders as a blank white page.
    pub fn text(text: &str) -> Self {
        Self {
            text: Ok(text.to_string()),
            image: None,
            render_fails: false,
        }
    }

    /// A scanned page: no text layer, renders as `image`.
    pub fn scanned(image: GrayImage) -> Self {
        Self::text("").with_image(image)
    }

    /// A page whose text layer cannot be read.
    pub fn text_error(reason: &str) -> Self {
        Self {
            text: Err(reason.to_string()),
            image: None,
            render_fails: false,
        }
    }

    /// A page with no text that cannot be rendered.
    pub fn render_error() -> Self {
        Self {
            render_fails: true,
            ..Self::text("")
        }
    }

    pub fn with_image(mut self, image: GrayImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// In-memory document for tests. Records which pages were touched and how
/// many batch reads were made.
pub struct MockDocument {
    info: DocumentInfo,
    pages: Vec<MockPage>,
    touched: RefCell<Vec<usize>>,
    text_passes: Cell<usize>,
    render_passes: Cell<usize>,
    released: Option<Arc<AtomicUsize>>,
}

impl MockDocument {
    pub fn new(pages: Vec<MockPage>) -> Self {
        Self {
            info: DocumentInfo {
                page_count: pages.len(),
                ..Default::default()
            },
            pages,
            touched: RefCell::new(Vec::new()),
            text_passes: Cell::new(0),
            render_passes: Cell::new(0),
            released: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.info.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.info.encrypted = true;
        self
    }

    /// Calls to `page_texts`.
    pub fn text_passes(&self) -> usize {
        self.text_passes.get()
    }

    /// Calls to `render_each`.
    pub fn render_passes(&self) -> usize {
        self.render_passes.get()
    }

    /// Number of text or render accesses to pages at index `limit` or later.
    pub fn accesses_beyond(&self, limit: usize) -> usize {
        self.touched.borrow().iter().filter(|&&i| i >= limit).count()
    }

    fn page(&self, index: usize) -> Option<&MockPage> {
        self.touched.borrow_mut().push(index);
        self.pages.get(index)
    }
}

impl PdfDocument for MockDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_text(&self, index: usize) -> Result<String, ExtractionError> {
        let page = self.page(index).ok_or_else(|| ExtractionError::PageText {
            page: index,
            reason: "out of range".into(),
        })?;
        page.text.clone().map_err(|reason| ExtractionError::PageText {
            page: index,
            reason,
        })
    }

    fn render(&self, index: usize, _scale: f32) -> Result<Vec<u8>, ExtractionError> {
        let page = self.page(index).ok_or_else(|| ExtractionError::PdfRendering {
            page: index,
            reason: "out of range".into(),
        })?;
        if page.render_fails {
            return Err(ExtractionError::PdfRendering {
                page: index,
                reason: "mock render failure".into(),
            });
        }
        match &page.image {
            Some(image) => encode_png(image),
            None => encode_png(&GrayImage::from_pixel(32, 32, Luma([255u8]))),
        }
    }

    fn page_texts(&self, pages: Range<usize>) -> Vec<Result<String, ExtractionError>> {
        self.text_passes.set(self.text_passes.get() + 1);
        pages.map(|index| self.page_text(index)).collect()
    }

    fn render_each(
        &self,
        pages: &[usize],
        scale: f32,
        visit: &mut dyn FnMut(usize, Result<Vec<u8>, ExtractionError>),
    ) {
        self.render_passes.set(self.render_passes.get() + 1);
        for &index in pages {
            visit(index, self.render(index, scale));
        }
    }
}

impl Drop for MockDocument {
    fn drop(&mut self) {
        if let Some(released) = &self.released {
            released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Debug, Clone)]
enum MockEntry {
    Document {
        info: DocumentInfo,
        pages: Vec<MockPage>,
    },
    Encrypted,
    Corrupt(String),
}

/// Document source serving `MockDocument`s by path.
#[derive(Debug, Clone, Default)]
pub struct MockDocumentSource {
    entries: HashMap<PathBuf, MockEntry>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, path: impl Into<PathBuf>, pages: Vec<MockPage>) -> Self {
        self.with_mock(path, MockDocument::new(pages))
    }

    /// Serve copies of `document`, keeping its metadata and flags.
    pub fn with_mock(mut self, path: impl Into<PathBuf>, document: MockDocument) -> Self {
        let entry = MockEntry::Document {
            info: document.info.clone(),
            pages: document.pages.clone(),
        };
        self.entries.insert(path.into(), entry);
        self
    }

    pub fn with_encrypted(mut self, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(path.into(), MockEntry::Encrypted);
        self
    }

    pub fn with_corrupt(mut self, path: impl Into<PathBuf>, reason: &str) -> Self {
        self.entries
            .insert(path.into(), MockEntry::Corrupt(reason.to_string()));
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl DocumentSource for MockDocumentSource {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, ExtractionError> {
        match self.entries.get(path) {
            None => Err(ExtractionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))),
            Some(MockEntry::Encrypted) => Err(ExtractionError::PdfEncrypted),
            Some(MockEntry::Corrupt(reason)) => Err(ExtractionError::PdfLoad(reason.clone())),
            Some(MockEntry::Document { info, pages }) => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                let mut document = MockDocument::new(pages.clone());
                document.info = info.clone();
                document.released = Some(Arc::clone(&self.released));
                Ok(Box::new(document))
            }
        }
    }
}
