//! Turns stored page results into export rows.

pub mod chunk;
pub mod clean;

use thiserror::Error;
use tracing::debug;

use crate::job::{Job, JobId};
use crate::store::{JobStore, PageResult, StoreError};

pub use chunk::{assign_chunks, chunk_count};
pub use clean::clean_text;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("No page results to export")]
    NoRows,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One spreadsheet row. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub chunk_id: u32,
    /// Stem of the originating job; set for batch exports only.
    pub source_stem: Option<String>,
    pub data_reference: String,
    pub description: String,
    pub source_filename: String,
    pub page_number: u32,
    pub text: String,
}

/// A job together with its stored results.
#[derive(Debug, Clone)]
pub struct JobResults {
    pub job: Job,
    pub results: Vec<PageResult>,
}

/// Builds rows in input order, then page order, and assigns chunk ids.
///
/// Jobs without results are skipped. Fails with `NoRows` if nothing is
/// left.
pub fn build_rows(
    sources: &[JobResults],
    batch: bool,
    chunk_target: usize,
) -> Result<Vec<ExportRow>, AggregateError> {
    let mut rows = Vec::new();
    for source in sources {
        let mut results: Vec<&PageResult> = source.results.iter().collect();
        results.sort_by_key(|r| r.page_number);

        for result in results {
            let job = &source.job;
            rows.push(ExportRow {
                chunk_id: 0,
                source_stem: batch.then(|| job.filename_stem.clone()),
                data_reference: format!("{}_page_{}", job.filename_stem, result.page_number),
                description: format!("Page {}", result.page_number),
                source_filename: job.original_filename.clone(),
                page_number: result.page_number,
                text: clean_text(&result.text),
            });
        }
    }

    if rows.is_empty() {
        return Err(AggregateError::NoRows);
    }

    let lengths: Vec<usize> = rows.iter().map(|r| r.text.chars().count()).collect();
    for (row, chunk_id) in rows.iter_mut().zip(assign_chunks(&lengths, chunk_target)) {
        row.chunk_id = chunk_id;
    }

    Ok(rows)
}

/// Loads and aggregates the listed jobs in the given order.
pub async fn aggregate(
    store: &JobStore,
    job_ids: &[JobId],
    batch: bool,
    chunk_target: usize,
) -> Result<Vec<ExportRow>, AggregateError> {
    let mut sources = Vec::with_capacity(job_ids.len());
    for id in job_ids {
        let job = store.get(id).await?;
        let results = store.all_page_results(id).await?;
        if results.is_empty() {
            debug!(job_id = %id, "Job has no page results, skipping");
            continue;
        }
        sources.push(JobResults { job, results });
    }

    let rows = build_rows(&sources, batch, chunk_target)?;
    debug!(
        jobs = sources.len(),
        rows = rows.len(),
        chunks = rows.last().map(|r| r.chunk_id).unwrap_or(0),
        "Aggregated results"
    );
    Ok(rows)
}
