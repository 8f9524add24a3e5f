use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn, Instrument};

use crate::processor::{DocumentHandle, DocumentNormalizer, NormalizeError};
use crate::sanitize::redact_path;

/// Resolves file ids to PDFs inside an upload directory and renders pages
/// with poppler's `pdftoppm`.
pub struct PdfNormalizer {
    upload_dir: PathBuf,
    pdftoppm: String,
}

impl PdfNormalizer {
    pub fn new(upload_dir: impl Into<PathBuf>, pdftoppm: impl Into<String>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            pdftoppm: pdftoppm.into(),
        }
    }

    /// File ids are plain file names; anything that could escape the
    /// upload directory is treated as unknown.
    fn locate(&self, file_id: &str) -> Result<PathBuf, NormalizeError> {
        let candidate = Path::new(file_id);
        let is_plain_name = candidate.components().count() == 1
            && candidate.file_name().is_some_and(|n| n == candidate.as_os_str());
        if file_id.is_empty() || !is_plain_name {
            return Err(NormalizeError::NotFound(file_id.to_string()));
        }

        let path = self.upload_dir.join(file_id);
        if !path.is_file() {
            return Err(NormalizeError::NotFound(file_id.to_string()));
        }

        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(NormalizeError::UnsupportedFormat(file_id.to_string()));
        }

        Ok(path)
    }
}

#[async_trait]
impl DocumentNormalizer for PdfNormalizer {
    async fn resolve(&self, file_id: &str) -> Result<DocumentHandle, NormalizeError> {
        let path = self.locate(file_id)?;
        let span = tracing::info_span!("normalizer.resolve", file = %redact_path(&path));

        async move {
            let page_count = match count_pages_lopdf(&path).await {
                Ok(count) => count,
                Err(e) => {
                    // lopdf rejects some damaged cross-reference tables that
                    // poppler still reads.
                    warn!(error = %e, "lopdf could not parse document, asking pdfinfo");
                    count_pages_pdfinfo(&path).await?
                }
            };

            if page_count == 0 {
                return Err(NormalizeError::Parse("document has no pages".to_string()));
            }

            debug!(page_count, "Resolved document");
            Ok(DocumentHandle {
                file_id: file_id.to_string(),
                location: path,
                page_count,
            })
        }
        .instrument(span)
        .await
    }

    async fn rasterize(
        &self,
        doc: &DocumentHandle,
        page: u32,
        dpi: u32,
    ) -> Result<Vec<u8>, NormalizeError> {
        if page == 0 || page > doc.page_count {
            return Err(NormalizeError::PageOutOfRange {
                page,
                page_count: doc.page_count,
            });
        }

        let prefix = std::env::temp_dir().join(format!("pagewise_page_{}", uuid::Uuid::new_v4()));
        let output_path = prefix.with_extension("png");
        let render_err = |reason: String| NormalizeError::Render { page, reason };

        let output = Command::new(&self.pdftoppm)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(&doc.location)
            .arg(&prefix)
            .output()
            .await
            .map_err(|e| {
                render_err(format!(
                    "failed to run {}: {}. Make sure poppler-utils is installed.",
                    self.pdftoppm, e
                ))
            })?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(render_err(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let bytes = tokio::fs::read(&output_path)
            .await
            .map_err(|e| render_err(format!("failed to read rendered image: {}", e)))?;
        let _ = tokio::fs::remove_file(&output_path).await;

        debug!(page, dpi, bytes = bytes.len(), "Rendered page");
        Ok(bytes)
    }
}

async fn count_pages_lopdf(path: &Path) -> Result<u32, NormalizeError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let doc = lopdf::Document::load(&path).map_err(|e| NormalizeError::Parse(e.to_string()))?;
        Ok(doc.get_pages().len() as u32)
    })
    .await
    .map_err(|e| NormalizeError::Parse(format!("page count task failed: {}", e)))?
}

async fn count_pages_pdfinfo(path: &Path) -> Result<u32, NormalizeError> {
    let output = Command::new("pdfinfo")
        .arg(path)
        .output()
        .await
        .map_err(|e| {
            NormalizeError::Parse(format!(
                "failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(NormalizeError::Parse(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| NormalizeError::Parse("pdfinfo reported no page count".to_string()))
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .filter_map(|line| line.strip_prefix("Pages:"))
        .find_map(|count| count.trim().parse().ok())
}
