use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use super::destination::{Destination, RemoteTarget, Resolved};
use super::local::LocalStaging;
use super::pool::UploadPool;
use super::remote::{self, RemoteConnector, RemoteError};
use super::session::SessionCache;
use super::xlsx;
use super::ExportError;
use crate::aggregate::{chunk_count, ExportRow};
use crate::config::ExportConfig;
use crate::job::JobId;
use crate::sanitize::redact_url;

/// What is being exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    Job { job_id: JobId, stem: String },
    Batch,
}

impl ExportScope {
    pub fn is_batch(&self) -> bool {
        matches!(self, ExportScope::Batch)
    }

    /// Local sub-directory: the job id, or a fresh id per batch export.
    fn sub_id(&self) -> String {
        match self {
            ExportScope::Job { job_id, .. } => job_id.to_string(),
            ExportScope::Batch => uuid::Uuid::new_v4().to_string(),
        }
    }

    fn local_filename(&self) -> String {
        match self {
            ExportScope::Job { stem, .. } => format!("{}_pdf_output.xlsx", stem),
            ExportScope::Batch => "batch_pdf_output.xlsx".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Local,
    Remote,
}

/// Outcome of an export. A fallback is a successful export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub destination_used: Delivery,
    pub fallback: bool,
    pub fallback_reason: Option<String>,
    /// Relative download path for local exports, remote location otherwise.
    pub location: String,
    pub row_count: usize,
    pub chunk_count: u32,
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub upload_timeout: Duration,
    pub upload_workers: usize,
    pub session_ttl: Duration,
}

impl From<&ExportConfig> for RouterSettings {
    fn from(config: &ExportConfig) -> Self {
        Self {
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            upload_workers: config.upload_workers,
            session_ttl: Duration::from_secs(config.session_ttl_secs),
        }
    }
}

struct RemoteUploads {
    sessions: Arc<SessionCache>,
    pool: UploadPool,
    timeout: Duration,
}

/// Writes workbooks to their destination, falling back to local staging
/// when a remote upload cannot complete.
pub struct ExportRouter {
    local: LocalStaging,
    remote: Option<RemoteUploads>,
}

impl ExportRouter {
    pub fn new(
        local: LocalStaging,
        connector: Option<Arc<dyn RemoteConnector>>,
        settings: &RouterSettings,
    ) -> Self {
        let remote = connector.map(|connector| RemoteUploads {
            sessions: Arc::new(SessionCache::new(connector, settings.session_ttl)),
            pool: UploadPool::new(settings.upload_workers),
            timeout: settings.upload_timeout,
        });
        Self { local, remote }
    }

    pub fn export_dir(&self) -> &std::path::Path {
        self.local.export_dir()
    }

    pub async fn export(
        &self,
        rows: &[ExportRow],
        destination: &Destination,
        scope: &ExportScope,
    ) -> Result<ExportReceipt, ExportError> {
        let span = info_span!("export", destination = destination.kind(), rows = rows.len());
        self.export_inner(rows, destination, scope)
            .instrument(span)
            .await
    }

    async fn export_inner(
        &self,
        rows: &[ExportRow],
        destination: &Destination,
        scope: &ExportScope,
    ) -> Result<ExportReceipt, ExportError> {
        let resolved = destination
            .resolve()
            .map_err(|_| ExportError::DeferredDestination)?;

        let batch = scope.is_batch();
        let owned_rows = rows.to_vec();
        let workbook = tokio::task::spawn_blocking(move || xlsx::write_workbook(&owned_rows, batch))
            .await
            .map_err(|e| ExportError::Task(e.to_string()))??;

        let chunks = rows.iter().map(|r| r.chunk_id).collect::<Vec<_>>();
        let receipt = |destination_used, location, fallback_reason: Option<String>| ExportReceipt {
            destination_used,
            fallback: fallback_reason.is_some(),
            fallback_reason,
            location,
            row_count: rows.len(),
            chunk_count: chunk_count(&chunks),
        };

        let fallback_reason = match resolved {
            Resolved::Local => None,
            Resolved::LocalFallback { reason } => {
                info!(%reason, "Templated destination incomplete, exporting locally");
                Some(reason)
            }
            Resolved::Remote(target) => match self.upload(target, workbook.clone()).await {
                Ok(location) => {
                    info!(location = %redact_url(&location), "Uploaded export");
                    return Ok(receipt(Delivery::Remote, location, None));
                }
                Err(reason) => {
                    warn!(%reason, "Remote upload failed, falling back to local export");
                    Some(reason)
                }
            },
        };

        let local = self.local.clone();
        let sub_id = scope.sub_id();
        let filename = scope.local_filename();
        let artifact =
            tokio::task::spawn_blocking(move || local.write(&sub_id, &filename, &workbook))
                .await
                .map_err(|e| ExportError::Task(e.to_string()))??;

        info!(path = %artifact.download_path, fallback = fallback_reason.is_some(), "Staged export locally");
        Ok(receipt(Delivery::Local, artifact.download_path, fallback_reason))
    }

    /// Uploads on the pool and waits at most the configured timeout.
    /// Every failure is reported as text for the fallback reason.
    async fn upload(&self, target: RemoteTarget, workbook: Vec<u8>) -> Result<String, String> {
        let Some(uploads) = &self.remote else {
            return Err("no remote store connector is configured".to_string());
        };

        let sessions = Arc::clone(&uploads.sessions);
        let pending = uploads
            .pool
            .submit(move || -> Result<String, RemoteError> {
                let store = sessions.get(&target.site_url)?;
                let delivered = remote::deliver(store.as_ref(), &target, &workbook);
                if let Err(RemoteError::Unauthorized { .. }) = &delivered {
                    sessions.invalidate(&target.site_url);
                }
                delivered
            })
            .map_err(|e| e.to_string())?;

        match tokio::time::timeout(uploads.timeout, pending).await {
            Ok(Ok(Ok(location))) => Ok(location),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(_)) => Err("upload task ended without a result".to_string()),
            Err(_) => Err(format!(
                "upload timed out after {}s",
                uploads.timeout.as_secs_f64()
            )),
        }
    }
}
