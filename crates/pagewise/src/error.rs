use std::path::PathBuf;
use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::export::ExportError;
use crate::processor::NormalizeError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Document error: {0}")]
    Document(#[from] NormalizeError),
}

/// Caller mistakes. Raised before any job state is mutated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Page {page} is not part of job {job_id}'s selection")]
    PageNotInSelection { job_id: String, page: u32 },

    #[error("Page selection is empty")]
    EmptySelection,

    #[error("Page numbers start at 1")]
    PageZero,

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Invalid page selection '{input}': {reason}")]
    InvalidSelection { input: String, reason: String },

    #[error("Job {job_id} is already {status}")]
    JobFinished { job_id: String, status: String },

    #[error("Job {0} is not a batch job")]
    NotBatchJob(String),

    #[error("Batch job {job_id} is not completed (status: {status})")]
    IncompleteBatchJob { job_id: String, status: String },

    #[error("The batch destination cannot be exported directly; use finalize_batch")]
    DeferredDestination,

    #[error("No job ids supplied")]
    EmptyJobList,

    #[error("Destination field '{field}' must not be blank")]
    BlankDestinationField { field: &'static str },

    #[error("Source document not found: {0}")]
    UnknownDocument(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
