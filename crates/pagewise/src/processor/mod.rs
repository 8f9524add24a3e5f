//! Page processing: document resolution, rasterization, payload reduction
//! and the per-page inference run.

pub mod image;
pub mod page;
pub mod pdf;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use self::image::{EncodedImage, ImageError, PayloadLimits};
pub use page::{Degradation, PageProcessor, PageRun, ProcessorSettings};
pub use pdf::PdfNormalizer;

/// A document the normalizer can rasterize page by page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    /// The caller's file id.
    pub file_id: String,
    pub location: PathBuf,
    pub page_count: u32,
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse document: {0}")]
    Parse(String),

    #[error("Failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },
}

/// Turns a caller's file id into a page-addressable document.
#[async_trait]
pub trait DocumentNormalizer: Send + Sync {
    async fn resolve(&self, file_id: &str) -> Result<DocumentHandle, NormalizeError>;

    /// Renders one 1-based page as PNG bytes.
    async fn rasterize(
        &self,
        doc: &DocumentHandle,
        page: u32,
        dpi: u32,
    ) -> Result<Vec<u8>, NormalizeError>;
}
