//! Document payloads and the file-to-payload encoder.
//!
//! The core never looks inside document bytes. A media payload is carried as
//! one data URI per page image and only split into (MIME type, base64 data)
//! for the backend. PDFs are rendered to page images here, before they reach
//! the pipeline.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::pdf::{render_pages, PdfPageRenderer, PdfiumRenderer, MAX_PDF_PAGES};
use super::StructuringError;

const PDF_MIME: &str = "application/pdf";

/// Largest file the encoder accepts (20 MB).
pub const MAX_PAYLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Opaque reference to the submitted content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DocumentPayload {
    /// `data:<mime>;base64,<data>`
    DataUri(String),
    /// One image data URI per page of a multi-page document.
    Pages(Vec<String>),
    Text(String),
}

/// A media payload split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef<'a> {
    pub mime_type: &'a str,
    pub base64_data: &'a str,
}

impl DocumentPayload {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::DataUri(uri) | Self::Text(uri) => uri.trim().is_empty(),
            Self::Pages(pages) => pages.iter().all(|p| p.trim().is_empty()),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::DataUri(_) => "data_uri",
            Self::Pages(_) => "pages",
            Self::Text(_) => "text",
        }
    }

    /// Split a single data URI. Only base64-encoded images are accepted.
    pub fn media(&self) -> Result<MediaRef<'_>, StructuringError> {
        match self {
            Self::DataUri(uri) => parse_image_uri(uri),
            Self::Pages(_) => Err(StructuringError::Composition(
                "expected a single image, got several pages".into(),
            )),
            Self::Text(_) => Err(StructuringError::Composition(
                "a document file is required, got free text".into(),
            )),
        }
    }

    /// Every page image of a media payload, in order.
    pub fn media_pages(&self) -> Result<Vec<MediaRef<'_>>, StructuringError> {
        match self {
            Self::DataUri(uri) => Ok(vec![parse_image_uri(uri)?]),
            Self::Pages(pages) if pages.is_empty() => {
                Err(StructuringError::Composition("document has no pages".into()))
            }
            Self::Pages(pages) => pages.iter().map(|uri| parse_image_uri(uri)).collect(),
            Self::Text(_) => Err(StructuringError::Composition(
                "a document file is required, got free text".into(),
            )),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::DataUri(_) | Self::Pages(_) => None,
        }
    }
}

fn parse_image_uri(uri: &str) -> Result<MediaRef<'_>, StructuringError> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| StructuringError::Composition("payload is not a data URI".into()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| StructuringError::Composition("data URI has no data section".into()))?;

    let mut parts = header.split(';');
    let mime_type = parts.next().unwrap_or_default().trim();
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(StructuringError::Composition(
            "data URI must be base64-encoded".into(),
        ));
    }
    if mime_type.eq_ignore_ascii_case(PDF_MIME) {
        return Err(StructuringError::Composition(
            "PDF documents must be rendered to page images first".into(),
        ));
    }
    if !mime_type.starts_with("image/") {
        return Err(StructuringError::Composition(format!(
            "unsupported document type '{mime_type}', expected an image"
        )));
    }
    if data.trim().is_empty() {
        return Err(StructuringError::Composition("data URI is empty".into()));
    }

    Ok(MediaRef {
        mime_type,
        base64_data: data.trim(),
    })
}

/// Render a PDF to a `Pages` payload of PNG data URIs.
pub fn pdf_to_pages(
    pdf_bytes: &[u8],
    renderer: &dyn PdfPageRenderer,
    max_pages: usize,
) -> Result<DocumentPayload, StructuringError> {
    let engine = base64::engine::general_purpose::STANDARD;
    let pages = render_pages(renderer, pdf_bytes, max_pages)?
        .iter()
        .map(|png| format!("data:image/png;base64,{}", engine.encode(png)))
        .collect();
    Ok(DocumentPayload::Pages(pages))
}

/// Replace a PDF data URI with its rendered pages. Other payloads pass through.
pub fn render_pdf_payload(
    payload: DocumentPayload,
    renderer: &dyn PdfPageRenderer,
) -> Result<DocumentPayload, StructuringError> {
    let DocumentPayload::DataUri(uri) = &payload else {
        return Ok(payload);
    };
    let Some((header, data)) = uri.trim().strip_prefix("data:").and_then(|r| r.split_once(',')) else {
        return Ok(payload);
    };
    let mut parts = header.split(';');
    let is_pdf = parts
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(PDF_MIME));
    if !is_pdf || !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Ok(payload);
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| StructuringError::Composition(format!("PDF data is not valid base64: {e}")))?;
    pdf_to_pages(&bytes, renderer, MAX_PDF_PAGES)
}

/// Turns a user-selected file into a payload.
pub trait PayloadEncoder {
    fn encode(&self, path: &Path) -> Result<DocumentPayload, StructuringError>;
}

/// Reads files from disk. Text files become text payloads, PDFs are rendered
/// to page images, everything else becomes a data URI.
#[derive(Clone)]
pub struct FileEncoder {
    max_bytes: u64,
    max_pages: usize,
    renderer: Arc<dyn PdfPageRenderer + Send + Sync>,
}

impl FileEncoder {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            max_pages: MAX_PDF_PAGES,
            renderer: Arc::new(PdfiumRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PdfPageRenderer + Send + Sync>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

impl Default for FileEncoder {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_BYTES)
    }
}

impl PayloadEncoder for FileEncoder {
    fn encode(&self, path: &Path) -> Result<DocumentPayload, StructuringError> {
        let unreadable =
            |e: std::io::Error| StructuringError::Composition(format!("cannot read file: {e}"));

        let size = std::fs::metadata(path).map_err(unreadable)?.len();
        if size == 0 {
            return Err(StructuringError::Composition("file is empty".into()));
        }
        if size > self.max_bytes {
            return Err(StructuringError::Composition(format!(
                "file is too large ({size} bytes, max {})",
                self.max_bytes
            )));
        }

        let bytes = std::fs::read(path).map_err(unreadable)?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        if mime.type_() == mime_guess::mime::TEXT {
            let text = String::from_utf8(bytes).map_err(|_| {
                StructuringError::Composition("text file is not valid UTF-8".into())
            })?;
            return Ok(DocumentPayload::Text(text));
        }
        if mime.essence_str() == PDF_MIME {
            return pdf_to_pages(&bytes, self.renderer.as_ref(), self.max_pages);
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(DocumentPayload::DataUri(format!(
            "data:{};base64,{encoded}",
            mime.essence_str()
        )))
    }
}
