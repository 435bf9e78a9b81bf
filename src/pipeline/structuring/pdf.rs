//! PDF page rendering via Google PDFium.
//!
//! Vision models only read images, so an uploaded PDF is rendered to one PNG
//! per page before it becomes a payload. `PdfiumRenderer` is stateless: the
//! upstream `Pdfium` type is `!Send`, so each call binds the library afresh
//! (the OS caches the `dlopen`).

use std::io::Cursor;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;

use super::StructuringError;

/// Largest rendered width or height.
const MAX_DIMENSION_PX: u32 = 4096;

/// Rendering DPI for vision-model input.
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// Pages rendered per document. Later pages are ignored with a warning.
pub const MAX_PDF_PAGES: usize = 10;

const POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages to PNG bytes.
pub trait PdfPageRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, StructuringError>;

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, StructuringError>;
}

/// Render up to `max_pages` pages of a PDF.
pub fn render_pages(
    renderer: &dyn PdfPageRenderer,
    pdf_bytes: &[u8],
    max_pages: usize,
) -> Result<Vec<Vec<u8>>, StructuringError> {
    let count = renderer.page_count(pdf_bytes)?;
    if count == 0 {
        return Err(StructuringError::Composition("PDF has no pages".into()));
    }
    if count > max_pages {
        tracing::warn!(pages = count, rendered = max_pages, "PDF truncated to first pages");
    }
    (0..count.min(max_pages))
        .map(|page| renderer.render_page(pdf_bytes, page, DEFAULT_RENDER_DPI))
        .collect()
}

/// Renders with the PDFium shared library.
///
/// Lookup order: `PDFIUM_DYNAMIC_LIB_PATH`, the executable's directory, then
/// the system library path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRenderer;

fn render_error(page: usize, reason: impl std::fmt::Display) -> StructuringError {
    StructuringError::Composition(format!("cannot render PDF page {page}: {reason}"))
}

fn load_pdfium() -> Result<Pdfium, StructuringError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        tracing::debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            StructuringError::Composition(format!("failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                tracing::debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        StructuringError::Composition(format!(
            "PDF support unavailable: PDFium library not found (set PDFIUM_DYNAMIC_LIB_PATH): {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> StructuringError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        StructuringError::Composition("PDF is password-protected".into())
    } else {
        StructuringError::Composition(format!("cannot open PDF: {msg}"))
    }
}

/// Pixel size for a page, both sides clamped to `[1, MAX_DIMENSION_PX]`
/// with the aspect ratio kept.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
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

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, StructuringError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, StructuringError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();

        let page_index = u16::try_from(page_number)
            .map_err(|_| render_error(page_number, "page index out of range"))?;
        let page = pages
            .get(page_index)
            .map_err(|_| render_error(page_number, format!("document has {} pages", pages.len())))?;

        let (target_w, target_h) =
            compute_render_dimensions(page.width().value, page.height().value, dpi);
        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| render_error(page_number, e))?;

        let mut cursor = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| render_error(page_number, format!("PNG encoding failed: {e}")))?;
        let png_bytes = cursor.into_inner();

        tracing::debug!(
            page = page_number,
            width = target_w,
            height = target_h,
            png_size = png_bytes.len(),
            "Rendered PDF page"
        );
        Ok(png_bytes)
    }
}

/// Returns a 1x1 PNG for each page; no PDFium needed.
pub struct MockPdfPageRenderer {
    page_count: usize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, StructuringError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, StructuringError> {
        if page_number >= self.page_count {
            return Err(render_error(page_number, "out of range"));
        }
        Ok(MINIMAL_PNG.to_vec())
    }
}

/// 1x1 white RGB pixel.
const MINIMAL_PNG: [u8; 69] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, // 8-bit RGB + CRC
    0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, // IDAT
    0x08, 0xD7, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, // compressed
    0x00, 0x02, 0x00, 0x01, 0xE2, 0x21, 0xBC, 0x33, // CRC
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, // IEND
    0xAE, 0x42, 0x60, 0x82,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_at_default_dpi() {
        let (w, h) = compute_render_dimensions(595.0, 842.0, DEFAULT_RENDER_DPI);
        assert!(w > 1600 && w < 1700, "A4 width: got {w}");
        assert!(h > 2300 && h < 2400, "A4 height: got {h}");
    }

    #[test]
    fn oversized_page_is_capped_keeping_ratio() {
        let (w, h) = compute_render_dimensions(5000.0, 10000.0, DEFAULT_RENDER_DPI);
        assert!(w <= MAX_DIMENSION_PX && h <= MAX_DIMENSION_PX);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 2.0).abs() < 0.15, "ratio {ratio}");
    }

    #[test]
    fn zero_size_page_is_clamped() {
        let (w, h) = compute_render_dimensions(0.0, 0.0, DEFAULT_RENDER_DPI);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn renders_every_page_up_to_cap() {
        let pages = render_pages(&MockPdfPageRenderer::new(3), b"%PDF-1.4", MAX_PDF_PAGES).unwrap();
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.starts_with(&[0x89, 0x50, 0x4E, 0x47])));

        let capped = render_pages(&MockPdfPageRenderer::new(15), b"%PDF-1.4", 4).unwrap();
        assert_eq!(capped.len(), 4);
    }

    #[test]
    fn empty_pdf_is_composition_error() {
        let err = render_pages(&MockPdfPageRenderer::new(0), b"%PDF-1.4", MAX_PDF_PAGES).unwrap_err();
        assert!(matches!(err, StructuringError::Composition(_)));
    }

    #[test]
    fn mock_rejects_out_of_range_page() {
        assert!(MockPdfPageRenderer::new(2).render_page(&[], 2, 200).is_err());
    }
}
