//! Export routing: workbook generation, local staging and remote upload
//! with fallback.

pub mod destination;
pub mod local;
pub mod pool;
pub mod remote;
pub mod router;
pub mod session;
pub mod xlsx;

use std::path::PathBuf;

use thiserror::Error;

pub use destination::{Destination, RemoteTarget, Resolved};
pub use local::{LocalArtifact, LocalStaging};
pub use pool::{PoolError, UploadPool};
pub use remote::{RemoteConnector, RemoteError, RemoteStore, SharePointConnector};
pub use router::{Delivery, ExportReceipt, ExportRouter, ExportScope, RouterSettings};
pub use session::SessionCache;
pub use xlsx::WorkbookError;

/// Export failures. Remote upload problems are not here: they end in a
/// local fallback.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("The batch destination cannot be exported directly; use finalize_batch")]
    DeferredDestination,

    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error("Failed to create export directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write export file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Export task failed: {0}")]
    Task(String),
}
