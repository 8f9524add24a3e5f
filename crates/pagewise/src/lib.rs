pub mod aggregate;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod inference;
pub mod job;
pub mod processor;
pub mod sanitize;
pub mod secrets;
pub mod store;
pub mod telemetry;

pub use config::{load_config, Config};
pub use engine::{Engine, EngineSettings, PageOutcome};
pub use error::{ConfigError, EngineError, Result, ValidationError};
pub use export::{Destination, ExportReceipt};
pub use job::{Job, JobId, JobStatus, NewJob, PageSelection, PromptFields};
pub use processor::Degradation;
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use store::{JobStore, RetryPolicy, StoreError};
