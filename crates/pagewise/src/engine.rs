//! The job engine: job creation, per-page processing, completion and batch
//! finalization on top of [`JobStore`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::aggregate::aggregate;
use crate::config::Config;
use crate::error::{EngineError, Result, ValidationError};
use crate::export::{Destination, ExportReceipt, ExportRouter, ExportScope};
use crate::inference::PageInference;
use crate::job::{filename_stem, Job, JobId, JobStatus, NewJob, PageSelection, PromptFields};
use crate::processor::{
    Degradation, DocumentHandle, DocumentNormalizer, NormalizeError, PageProcessor,
    ProcessorSettings,
};
use crate::sanitize::redact_path;
use crate::store::{JobStore, NewPrompt, PromptFilter, SavedPrompt, StoreError};

/// Engine-level knobs that are not owned by a component.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Characters per chunk when aggregating.
    pub chunk_target: usize,
    /// Model used when a job is created without one.
    pub default_model: String,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            chunk_target: config.aggregate.chunk_target,
            default_model: config.inference.default_model.clone(),
        }
    }
}

/// What `process_page` hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PageOutcome {
    pub job_id: JobId,
    pub page: u32,
    pub text: String,
    pub image_size_bytes: u64,
    /// True only for the numeric maximum of the job's selection.
    pub is_last_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
    /// Set when this call completed the job and exported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportReceipt>,
}

pub struct Engine {
    store: JobStore,
    normalizer: Arc<dyn DocumentNormalizer>,
    processor: PageProcessor,
    router: ExportRouter,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: JobStore,
        normalizer: Arc<dyn DocumentNormalizer>,
        inference: Arc<dyn PageInference>,
        processor_settings: ProcessorSettings,
        router: ExportRouter,
        settings: EngineSettings,
    ) -> Self {
        let processor = PageProcessor::new(normalizer.clone(), inference, processor_settings);
        Self {
            store,
            normalizer,
            processor,
            router,
            settings,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validates the request against the source document and persists a
    /// `ready` job.
    pub async fn create_job(&self, new_job: NewJob) -> Result<JobId> {
        new_job.destination.validate()?;

        let doc = self.resolve_document(&new_job.source_ref).await?;
        let pages = PageSelection::within(new_job.pages, doc.page_count)?;

        let model = match new_job.model.trim() {
            "" => self.settings.default_model.clone(),
            model => model.to_string(),
        };
        let original_filename = new_job
            .original_filename
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| new_job.source_ref.clone());

        let now = Utc::now();
        let job = Job {
            id: JobId::generate(),
            source_ref: new_job.source_ref,
            model,
            prompt: new_job.prompt.compose(),
            is_batch: new_job.destination.is_batch(),
            destination: new_job.destination,
            status: JobStatus::Ready,
            error: None,
            filename_stem: filename_stem(&original_filename),
            original_filename,
            pages,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
        };

        self.store.create(&job).await?;
        info!(
            job_id = %job.id,
            source = %redact_path(&doc.location),
            pages = job.pages.len(),
            destination = job.destination.kind(),
            "Created job"
        );
        Ok(job.id)
    }

    /// Page count of a source document, for building a selection.
    pub async fn document_page_count(&self, source_ref: &str) -> Result<u32> {
        Ok(self.resolve_document(source_ref).await?.page_count)
    }

    async fn resolve_document(&self, source_ref: &str) -> Result<DocumentHandle> {
        self.normalizer
            .resolve(source_ref)
            .await
            .map_err(|e| match e {
                NormalizeError::NotFound(_) | NormalizeError::UnsupportedFormat(_) => {
                    EngineError::from(ValidationError::UnknownDocument(source_ref.to_string()))
                }
                other => EngineError::from(other),
            })
    }

    /// Processes one page of a job and stores its result.
    ///
    /// Inference and image failures are stored as sentinel text and reported
    /// through `degradation`. Once every page of the selection has a result
    /// the job is completed, and non-batch jobs are exported and removed.
    pub async fn process_page(&self, job_id: &JobId, page: u32) -> Result<PageOutcome> {
        let span = info_span!("process_page", job_id = %job_id, page);
        self.process_page_inner(job_id, page).instrument(span).await
    }

    async fn process_page_inner(&self, job_id: &JobId, page: u32) -> Result<PageOutcome> {
        let job = self.load_job(job_id).await?;
        if job.status.is_finished() {
            return Err(ValidationError::JobFinished {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            }
            .into());
        }
        if !job.pages.contains(page) {
            return Err(ValidationError::PageNotInSelection {
                job_id: job_id.to_string(),
                page,
            }
            .into());
        }

        if let Err(e) = self.store.touch_processing_started(job_id).await {
            self.mark_error(job_id, &e.to_string()).await;
            return Err(e.into());
        }

        let run = self.processor.run(&job, page).await;
        if let Some(degradation) = &run.degradation {
            warn!(?degradation, attempts = run.attempts, "Page degraded");
        }

        if let Err(e) = self
            .store
            .append_page_result(job_id, page, &run.text, run.image_size_bytes)
            .await
        {
            self.mark_error(job_id, &e.to_string()).await;
            return Err(e.into());
        }

        let is_last_page = job.pages.is_last(page);
        let pending = self.store.pending_pages(&job).await?;
        let export = if pending.is_empty() {
            if self.store.claim_completion(job_id).await? {
                self.complete(&job).await?
            } else {
                debug!("Completion already claimed by another call");
                None
            }
        } else {
            if is_last_page {
                warn!(?pending, "Last page stored with pages still pending, completion deferred");
            }
            None
        };

        debug!(
            image_size_bytes = run.image_size_bytes,
            attempts = run.attempts,
            is_last_page,
            "Page stored"
        );

        Ok(PageOutcome {
            job_id: job_id.clone(),
            page,
            text: run.text,
            image_size_bytes: run.image_size_bytes,
            is_last_page,
            degradation: run.degradation,
            export,
        })
    }

    async fn complete(&self, job: &Job) -> Result<Option<ExportReceipt>> {
        if job.is_batch {
            self.finish(&job.id).await?;
            info!("Batch job complete, results kept for finalization");
            return Ok(None);
        }

        let receipt = match self.export_job(job).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.mark_error(&job.id, &e.to_string()).await;
                return Err(e);
            }
        };

        self.finish(&job.id).await?;
        self.store.delete_job(&job.id).await;
        info!(
            destination = ?receipt.destination_used,
            fallback = receipt.fallback,
            rows = receipt.row_count,
            chunks = receipt.chunk_count,
            "Job complete"
        );
        Ok(Some(receipt))
    }

    async fn export_job(&self, job: &Job) -> Result<ExportReceipt> {
        let rows = aggregate(
            &self.store,
            std::slice::from_ref(&job.id),
            false,
            self.settings.chunk_target,
        )
        .await?;
        let scope = ExportScope::Job {
            job_id: job.id.clone(),
            stem: job.filename_stem.clone(),
        };
        Ok(self.router.export(&rows, &job.destination, &scope).await?)
    }

    async fn finish(&self, job_id: &JobId) -> Result<()> {
        if !self
            .store
            .set_status(job_id, JobStatus::Completed, None)
            .await?
        {
            warn!(job_id = %job_id, "Job was not running when it completed");
        }
        Ok(())
    }

    async fn mark_error(&self, job_id: &JobId, message: &str) {
        match self
            .store
            .set_status(job_id, JobStatus::Error, Some(message))
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(job_id = %job_id, "Job already finished, error not recorded"),
            Err(e) => warn!(job_id = %job_id, error = %e, "Failed to mark job as errored"),
        }
    }

    /// Combines completed batch jobs into one workbook.
    ///
    /// The jobs are deleted only if the export succeeds. Duplicate ids are
    /// ignored; otherwise the given order is kept.
    pub async fn finalize_batch(
        &self,
        job_ids: &[JobId],
        destination: &Destination,
    ) -> Result<ExportReceipt> {
        let span = info_span!("finalize_batch", jobs = job_ids.len(), destination = destination.kind());
        self.finalize_batch_inner(job_ids, destination)
            .instrument(span)
            .await
    }

    async fn finalize_batch_inner(
        &self,
        job_ids: &[JobId],
        destination: &Destination,
    ) -> Result<ExportReceipt> {
        if job_ids.is_empty() {
            return Err(ValidationError::EmptyJobList.into());
        }
        if destination.is_batch() {
            return Err(ValidationError::DeferredDestination.into());
        }
        destination.validate()?;

        let mut ids: Vec<JobId> = Vec::with_capacity(job_ids.len());
        for id in job_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }

        for id in &ids {
            let job = self.load_job(id).await?;
            if !job.is_batch {
                return Err(ValidationError::NotBatchJob(id.to_string()).into());
            }
            if job.status != JobStatus::Completed {
                return Err(ValidationError::IncompleteBatchJob {
                    job_id: id.to_string(),
                    status: job.status.to_string(),
                }
                .into());
            }
        }

        let rows = aggregate(&self.store, &ids, true, self.settings.chunk_target).await?;
        let receipt = self
            .router
            .export(&rows, destination, &ExportScope::Batch)
            .await?;

        for id in &ids {
            self.store.delete_job(id).await;
        }
        info!(
            destination = ?receipt.destination_used,
            fallback = receipt.fallback,
            rows = receipt.row_count,
            "Batch finalized"
        );
        Ok(receipt)
    }

    pub async fn job(&self, job_id: &JobId) -> Result<Job> {
        self.load_job(job_id).await
    }

    /// Pages of the job's selection that have no stored result yet.
    pub async fn pending_pages(&self, job_id: &JobId) -> Result<Vec<u32>> {
        let job = self.load_job(job_id).await?;
        Ok(self.store.pending_pages(&job).await?)
    }

    /// Removes jobs not updated within `older_than`, whatever their status.
    pub async fn sweep_stale_jobs(&self, older_than: Duration) -> Result<u64> {
        let removed = self.store.sweep_stale(older_than).await?;
        if removed > 0 {
            info!(removed, older_than_secs = older_than.as_secs(), "Swept stale jobs");
        }
        Ok(removed)
    }

    pub async fn save_prompt(&self, prompt: &NewPrompt) -> Result<i64> {
        Ok(self.store.save_prompt(prompt).await?)
    }

    pub async fn search_prompts(&self, filter: &PromptFilter) -> Result<Vec<SavedPrompt>> {
        Ok(self.store.search_prompts(filter).await?)
    }

    /// Loads a saved prompt's sections for use in a [`NewJob`].
    pub async fn prompt_fields(&self, prompt_id: i64) -> Result<PromptFields> {
        let prompt = self.store.get_prompt(prompt_id).await?;
        Ok(PromptFields::from(&prompt))
    }

    pub async fn delete_prompt(&self, prompt_id: i64) -> Result<()> {
        Ok(self.store.delete_prompt(prompt_id).await?)
    }

    async fn load_job(&self, job_id: &JobId) -> Result<Job> {
        match self.store.get(job_id).await {
            Ok(job) => Ok(job),
            Err(StoreError::NotFound(_)) => {
                Err(ValidationError::UnknownJob(job_id.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
