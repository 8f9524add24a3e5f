//! Persistent job store.
//!
//! Wraps the repositories in [`crate::db`] with domain types and a bounded
//! retry loop for SQLite busy/locked conditions. All job state lives here;
//! nothing about a job is kept in memory between calls.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::db::job_repo::{self, JobRow};
use crate::db::page_repo::{self, PageResultRow};
use crate::db::prompt_repo::{self, NewPromptRow};
use crate::db::{Database, DatabaseError};
use crate::export::Destination;
use crate::job::{Job, JobId, JobStatus, PageSelection, PromptFields};

pub use crate::db::prompt_repo::{PromptField, PromptFilter, PromptRow as SavedPrompt};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store stayed busy for {attempts} attempts during {operation}")]
    Contention {
        operation: &'static str,
        attempts: u32,
    },

    #[error("{0}")]
    Fatal(#[from] DatabaseError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Retry behaviour for busy/locked conditions.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl From<&StoreConfig> for RetryPolicy {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// One stored page result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    pub page_number: u32,
    pub text: String,
    pub image_size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Input for [`JobStore::save_prompt`].
#[derive(Debug, Clone, Default)]
pub struct NewPrompt {
    pub name: String,
    pub description: Option<String>,
    pub fields: PromptFields,
    pub created_by: Option<String>,
    pub tags: Option<String>,
}

/// Contention-tolerant store for jobs, page results and saved prompts.
#[derive(Clone)]
pub struct JobStore {
    db: Database,
    retry: RetryPolicy,
}

impl JobStore {
    pub fn new(db: Database, retry: RetryPolicy) -> Self {
        Self { db, retry }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Runs `op`, retrying while SQLite reports busy/locked.
    async fn with_retry<T, F>(&self, operation: &'static str, op: F) -> Result<T, StoreError>
    where
        F: Fn(&Database) -> Result<T, DatabaseError>,
    {
        let db = &self.db;
        let op = &op;
        retry_busy(self.retry, operation, move || async move { op(db) }).await
    }

    /// Persists a new job. Fails with `AlreadyExists` on id collision.
    pub async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let row = job_to_row(job)?;
        match self.with_retry("create", |db| job_repo::insert(db, &row)).await {
            Err(StoreError::Fatal(e)) if e.is_constraint_violation() => {
                Err(StoreError::AlreadyExists(job.id.to_string()))
            }
            other => other,
        }
    }

    pub async fn get(&self, id: &JobId) -> Result<Job, StoreError> {
        let row = self
            .with_retry("get", |db| job_repo::find_by_id(db, id.as_str()))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(row_to_job(row)?)
    }

    /// Moves the job to `status` if the transition is allowed from its
    /// current status. Returns `false` (and changes nothing) otherwise.
    pub async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let from: Vec<&str> = status.predecessors().iter().map(|s| s.as_str()).collect();
        let now = timestamp(Utc::now());
        self.with_retry("set_status", |db| {
            job_repo::update_status(db, id.as_str(), &from, status.as_str(), error, &now)
        })
        .await
    }

    /// Sets the first-processing timestamp if unset and moves `ready` to
    /// `running`. Returns the stored timestamp.
    pub async fn touch_processing_started(
        &self,
        id: &JobId,
    ) -> Result<DateTime<Utc>, StoreError> {
        let now = timestamp(Utc::now());
        let stored = self
            .with_retry("touch_processing_started", |db| {
                job_repo::touch_processing_started(db, id.as_str(), &now)
            })
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(parse_timestamp("processing_started_at", &stored)?)
    }

    /// Claims the right to complete a job. Only the first caller gets `true`.
    pub async fn claim_completion(&self, id: &JobId) -> Result<bool, StoreError> {
        let now = timestamp(Utc::now());
        self.with_retry("claim_completion", |db| {
            job_repo::claim_completion(db, id.as_str(), &now)
        })
        .await
    }

    /// Idempotent upsert of one page result.
    pub async fn append_page_result(
        &self,
        job_id: &JobId,
        page: u32,
        text: &str,
        image_size_bytes: u64,
    ) -> Result<(), StoreError> {
        let row = PageResultRow {
            job_id: job_id.to_string(),
            page_number: page,
            text: text.to_string(),
            image_size_bytes,
            created_at: timestamp(Utc::now()),
        };
        match self
            .with_retry("append_page_result", |db| page_repo::upsert(db, &row))
            .await
        {
            // The foreign key only fails when the job row is gone.
            Err(StoreError::Fatal(e)) if e.is_constraint_violation() => {
                Err(StoreError::NotFound(job_id.to_string()))
            }
            other => other,
        }
    }

    /// All results of a job, ordered by page number.
    pub async fn all_page_results(&self, job_id: &JobId) -> Result<Vec<PageResult>, StoreError> {
        let rows = self
            .with_retry("all_page_results", |db| {
                page_repo::list_by_job(db, job_id.as_str())
            })
            .await?;
        rows.into_iter()
            .map(|row| -> Result<PageResult, DatabaseError> {
                Ok(PageResult {
                    page_number: row.page_number,
                    text: row.text,
                    image_size_bytes: row.image_size_bytes,
                    created_at: parse_timestamp("created_at", &row.created_at)?,
                })
            })
            .collect::<Result<Vec<_>, DatabaseError>>()
            .map_err(StoreError::from)
    }

    /// Pages of the job's selection that have no stored result yet.
    pub async fn pending_pages(&self, job: &Job) -> Result<Vec<u32>, StoreError> {
        let stored = self
            .with_retry("pending_pages", |db| {
                page_repo::stored_pages(db, job.id.as_str())
            })
            .await?;
        Ok(job
            .pages
            .as_slice()
            .iter()
            .copied()
            .filter(|p| stored.binary_search(p).is_err())
            .collect())
    }

    /// Best-effort delete of a job and its results. Failures are logged.
    pub async fn delete_job(&self, id: &JobId) -> bool {
        match self
            .with_retry("delete_job", |db| job_repo::delete(db, id.as_str()))
            .await
        {
            Ok(deleted) => {
                debug!(job_id = %id, deleted, "Deleted job state");
                deleted
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Failed to delete job state");
                false
            }
        }
    }

    /// Best-effort delete of a job's results, keeping the job row.
    pub async fn delete_page_results(&self, id: &JobId) -> u64 {
        match self
            .with_retry("delete_page_results", |db| {
                page_repo::delete_by_job(db, id.as_str())
            })
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                warn!(job_id = %id, error = %e, "Failed to delete page results");
                0
            }
        }
    }

    /// Removes jobs (and their results) not updated within `older_than`.
    pub async fn sweep_stale(&self, older_than: Duration) -> Result<u64, StoreError> {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff = timestamp(cutoff);
        self.with_retry("sweep_stale", |db| {
            job_repo::delete_updated_before(db, &cutoff)
        })
        .await
    }

    pub async fn count_by_status(&self, status: JobStatus) -> Result<u64, StoreError> {
        self.with_retry("count_by_status", |db| {
            job_repo::count_by_status(db, status.as_str())
        })
        .await
    }

    /// Saves a prompt under a unique name and returns its id.
    pub async fn save_prompt(&self, prompt: &NewPrompt) -> Result<i64, StoreError> {
        let row = NewPromptRow {
            name: prompt.name.trim().to_string(),
            description: prompt.description.clone(),
            role_prompt: prompt.fields.role.clone(),
            task_prompt: prompt.fields.task.clone(),
            context_prompt: prompt.fields.context.clone(),
            format_prompt: prompt.fields.format.clone(),
            constraints_prompt: prompt.fields.constraints.clone(),
            created_at: timestamp(Utc::now()),
            created_by: prompt.created_by.clone(),
            tags: prompt.tags.clone(),
        };
        match self
            .with_retry("save_prompt", |db| prompt_repo::insert(db, &row))
            .await
        {
            Err(StoreError::Fatal(e)) if e.is_constraint_violation() => {
                Err(StoreError::AlreadyExists(row.name.clone()))
            }
            other => other,
        }
    }

    pub async fn search_prompts(&self, filter: &PromptFilter) -> Result<Vec<SavedPrompt>, StoreError> {
        self.with_retry("search_prompts", |db| prompt_repo::search(db, filter))
            .await
    }

    /// Fetches a prompt and records the use.
    pub async fn get_prompt(&self, id: i64) -> Result<SavedPrompt, StoreError> {
        let now = timestamp(Utc::now());
        self.with_retry("get_prompt", |db| {
            prompt_repo::get_and_mark_used(db, id, &now)
        })
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("prompt {}", id)))
    }

    pub async fn delete_prompt(&self, id: i64) -> Result<(), StoreError> {
        let deleted = self
            .with_retry("delete_prompt", |db| prompt_repo::delete(db, id))
            .await?;
        if deleted {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("prompt {}", id)))
        }
    }
}

impl From<&SavedPrompt> for PromptFields {
    fn from(prompt: &SavedPrompt) -> Self {
        Self {
            role: prompt.role_prompt.clone(),
            task: prompt.task_prompt.clone(),
            context: prompt.context_prompt.clone(),
            format: prompt.format_prompt.clone(),
            constraints: prompt.constraints_prompt.clone(),
        }
    }
}

/// Retries `attempt` while it fails with a busy/locked error, waiting
/// `base_delay * n` after the n-th failure.
async fn retry_busy<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DatabaseError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for n in 1..=max_attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_busy() => {
                warn!(operation, attempt = n, max_attempts, "Store busy, retrying");
                if n < max_attempts {
                    tokio::time::sleep(policy.base_delay * n).await;
                }
            }
            Err(e) => return Err(StoreError::Fatal(e)),
        }
    }
    Err(StoreError::Contention {
        operation,
        attempts: max_attempts,
    })
}

/// Fixed-width UTC timestamps so that text comparison in SQL orders them.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode {
            column,
            reason: e.to_string(),
        })
}

fn job_to_row(job: &Job) -> Result<JobRow, DatabaseError> {
    let encode = |column: &'static str, e: serde_json::Error| DatabaseError::Decode {
        column,
        reason: e.to_string(),
    };
    Ok(JobRow {
        id: job.id.to_string(),
        source_ref: job.source_ref.clone(),
        model: job.model.clone(),
        prompt: job.prompt.clone(),
        pages: serde_json::to_string(&job.pages).map_err(|e| encode("pages", e))?,
        destination: serde_json::to_string(&job.destination)
            .map_err(|e| encode("destination", e))?,
        status: job.status.as_str().to_string(),
        error: job.error.clone(),
        original_filename: job.original_filename.clone(),
        filename_stem: job.filename_stem.clone(),
        is_batch: job.is_batch,
        created_at: timestamp(job.created_at),
        updated_at: timestamp(job.updated_at),
        processing_started_at: job.processing_started_at.map(timestamp),
    })
}

fn row_to_job(row: JobRow) -> Result<Job, DatabaseError> {
    let pages: PageSelection =
        serde_json::from_str(&row.pages).map_err(|e| DatabaseError::Decode {
            column: "pages",
            reason: e.to_string(),
        })?;
    let destination: Destination =
        serde_json::from_str(&row.destination).map_err(|e| DatabaseError::Decode {
            column: "destination",
            reason: e.to_string(),
        })?;
    let status: JobStatus = row
        .status
        .parse()
        .map_err(|reason| DatabaseError::Decode {
            column: "status",
            reason,
        })?;

    Ok(Job {
        id: JobId::from(row.id),
        source_ref: row.source_ref,
        model: row.model,
        prompt: row.prompt,
        pages,
        destination,
        status,
        error: row.error,
        original_filename: row.original_filename,
        filename_stem: row.filename_stem,
        is_batch: row.is_batch,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        processing_started_at: row
            .processing_started_at
            .as_deref()
            .map(|s| parse_timestamp("processing_started_at", s))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::SubsecRound;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_store() -> JobStore {
        JobStore::new(
            Database::open_in_memory().unwrap(),
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    fn sample_job(pages: Vec<u32>, destination: Destination) -> Job {
        let now = Utc::now();
        Job {
            id: JobId::generate(),
            source_ref: "upload-1".to_string(),
            model: "gpt-4.1".to_string(),
            prompt: "Task:\nTranscribe".to_string(),
            pages: PageSelection::new(pages).unwrap(),
            is_batch: destination.is_batch(),
            destination,
            status: JobStatus::Ready,
            error: None,
            original_filename: "report.pdf".to_string(),
            filename_stem: "report".to_string(),
            created_at: now,
            updated_at: now,
            processing_started_at: None,
        }
    }

    fn busy() -> DatabaseError {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let store = test_store();
        let job = sample_job(
            vec![2, 4, 7],
            Destination::ExplicitRemote {
                site_url: "https://example.sharepoint.com/sites/ops".to_string(),
                folder: "Shared Documents/out".to_string(),
                filename: "out.xlsx".to_string(),
            },
        );
        store.create(&job).await.unwrap();

        let loaded = store.get(&job.id).await.unwrap();
        assert_eq!(loaded.pages.as_slice(), &[2, 4, 7]);
        assert_eq!(loaded.destination, job.destination);
        assert_eq!(loaded.status, JobStatus::Ready);
        assert_eq!(loaded.created_at, job.created_at.trunc_subsecs(6));
    }

    #[tokio::test]
    async fn test_create_duplicate_is_already_exists() {
        let store = test_store();
        let job = sample_job(vec![1], Destination::LocalDownload);
        store.create(&job).await.unwrap();
        assert!(matches!(
            store.create(&job).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = test_store();
        assert!(matches!(
            store.get(&JobId::from("ghost")).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_touch_is_set_once_and_starts_job() {
        let store = test_store();
        let job = sample_job(vec![1, 2], Destination::LocalDownload);
        store.create(&job).await.unwrap();

        let first = store.touch_processing_started(&job.id).await.unwrap();
        let second = store.touch_processing_started(&job.id).await.unwrap();
        assert_eq!(first, second);

        let loaded = store.get(&job.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        assert_eq!(loaded.processing_started_at, Some(first));
    }

    #[tokio::test]
    async fn test_set_status_never_moves_backward() {
        let store = test_store();
        let job = sample_job(vec![1], Destination::LocalDownload);
        store.create(&job).await.unwrap();

        assert!(!store
            .set_status(&job.id, JobStatus::Completed, None)
            .await
            .unwrap());
        assert!(store
            .set_status(&job.id, JobStatus::Running, None)
            .await
            .unwrap());
        assert!(store
            .set_status(&job.id, JobStatus::Completed, None)
            .await
            .unwrap());
        assert!(!store
            .set_status(&job.id, JobStatus::Running, None)
            .await
            .unwrap());
        assert!(!store
            .set_status(&job.id, JobStatus::Error, Some("late"))
            .await
            .unwrap());

        let loaded = store.get(&job.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.error.is_none());
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_second_text() {
        let store = test_store();
        let job = sample_job(vec![1, 2], Destination::LocalDownload);
        store.create(&job).await.unwrap();

        store.append_page_result(&job.id, 1, "first", 10).await.unwrap();
        store.append_page_result(&job.id, 1, "second", 20).await.unwrap();

        let results = store.all_page_results(&job.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "second");
        assert_eq!(results[0].image_size_bytes, 20);
    }

    #[tokio::test]
    async fn test_append_for_missing_job_is_not_found() {
        let store = test_store();
        assert!(matches!(
            store
                .append_page_result(&JobId::from("ghost"), 1, "x", 1)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_pages() {
        let store = test_store();
        let job = sample_job(vec![2, 4, 7], Destination::LocalDownload);
        store.create(&job).await.unwrap();
        store.append_page_result(&job.id, 4, "x", 1).await.unwrap();

        assert_eq!(store.pending_pages(&job).await.unwrap(), vec![2, 7]);
    }

    #[tokio::test]
    async fn test_delete_job_cascades_and_is_best_effort() {
        let store = test_store();
        let job = sample_job(vec![1], Destination::LocalDownload);
        store.create(&job).await.unwrap();
        store.append_page_result(&job.id, 1, "x", 1).await.unwrap();

        assert!(store.delete_job(&job.id).await);
        assert!(!store.delete_job(&job.id).await);
        assert!(store.all_page_results(&job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_page_results_keeps_job() {
        let store = test_store();
        let job = sample_job(vec![1, 2], Destination::Batch);
        store.create(&job).await.unwrap();
        store.append_page_result(&job.id, 1, "x", 1).await.unwrap();
        store.append_page_result(&job.id, 2, "y", 1).await.unwrap();

        assert_eq!(store.delete_page_results(&job.id).await, 2);
        assert_eq!(store.pending_pages(&job).await.unwrap(), vec![1, 2]);
        assert_eq!(store.count_by_status(JobStatus::Ready).await.unwrap(), 1);
        assert_eq!(store.count_by_status(JobStatus::Error).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_completion_has_one_winner() {
        let store = test_store();
        let job = sample_job(vec![1], Destination::LocalDownload);
        store.create(&job).await.unwrap();
        store.touch_processing_started(&job.id).await.unwrap();

        assert!(store.claim_completion(&job.id).await.unwrap());
        assert!(!store.claim_completion(&job.id).await.unwrap());
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_sweep_stale_removes_old_jobs_only() {
        let store = test_store();
        let mut old = sample_job(vec![1], Destination::LocalDownload);
        old.updated_at = Utc::now() - chrono::Duration::days(3);
        store.create(&old).await.unwrap();
        let fresh = sample_job(vec![1], Destination::LocalDownload);
        store.create(&fresh).await.unwrap();

        let removed = store
            .sweep_stale(Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&fresh.id).await.is_ok());
        assert!(matches!(
            store.get(&old.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_busy() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
        };
        let value = retry_busy(policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(busy())
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_with_contention() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<(), _> = retry_busy(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(busy()) }
        })
        .await;
        assert!(matches!(
            result,
            Err(StoreError::Contention { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_busy(RetryPolicy::default(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DatabaseError::LockPoisoned) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prompt_library() {
        let store = test_store();
        let prompt = NewPrompt {
            name: "invoices".to_string(),
            description: Some("Invoice lines".to_string()),
            fields: PromptFields {
                role: "You are an accountant.".to_string(),
                task: "List line items.".to_string(),
                ..Default::default()
            },
            created_by: Some("ops".to_string()),
            tags: Some("finance".to_string()),
        };
        let id = store.save_prompt(&prompt).await.unwrap();
        assert!(matches!(
            store.save_prompt(&prompt).await,
            Err(StoreError::AlreadyExists(_))
        ));

        let found = store
            .search_prompts(&PromptFilter {
                text: Some("accountant".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let fetched = store.get_prompt(id).await.unwrap();
        assert_eq!(fetched.use_count, 1);

        store.delete_prompt(id).await.unwrap();
        assert!(matches!(
            store.get_prompt(id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_prompt(id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
