//! Shared state for the API router.

use std::sync::Arc;

use crate::pipeline::structuring::{ExtractionPipeline, PdfPageRenderer, PdfiumRenderer};

/// Shared context for all API routes. Cheap to clone.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<ExtractionPipeline>,
    /// Turns uploaded PDFs into page images before extraction.
    pub pdf_renderer: Arc<dyn PdfPageRenderer + Send + Sync>,
}

impl ApiContext {
    pub fn new(pipeline: ExtractionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            pdf_renderer: Arc::new(PdfiumRenderer),
        }
    }

    pub fn with_pdf_renderer(mut self, renderer: Arc<dyn PdfPageRenderer + Send + Sync>) -> Self {
        self.pdf_renderer = renderer;
        self
    }
}
