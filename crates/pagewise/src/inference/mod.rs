//! The page-inference seam.
//!
//! [`PageInference`] takes one page image with its instructions and returns
//! text. Failures are classified so the page processor can decide between
//! shrinking the image, recording a sentinel, or giving up.

pub mod azure;

use async_trait::async_trait;
use thiserror::Error;

pub use azure::AzureOpenAiClient;

/// One vision request.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub system: String,
    pub user: String,
    /// JPEG bytes.
    pub image_jpeg: Vec<u8>,
    pub model: String,
    pub temperature: f32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceFailure {
    /// The request did not finish in time, or the payload was too large to
    /// be accepted. Retried with a smaller image.
    #[error("Inference request timed out")]
    Timeout,

    #[error("Inference content was rejected: {0}")]
    ContentRejected(String),

    #[error("Inference is not configured: {0}")]
    ConfigMissing(String),

    #[error("Inference request failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait PageInference: Send + Sync {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceFailure>;
}
