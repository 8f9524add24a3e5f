//! One page, start to finish: render, reduce, infer.
//!
//! [`PageProcessor::run`] never fails. Anything that goes wrong between the
//! document and the inference service ends up as a [`Degradation`] whose
//! sentinel text is stored in place of the page's output.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};

use super::image::{self as payload, EncodedImage, ImageError, PayloadLimits};
use super::DocumentNormalizer;
use crate::config::{InferenceConfig, ProcessingConfig};
use crate::inference::{InferenceFailure, InferenceRequest, PageInference};
use crate::job::Job;

/// Tunables for a [`PageProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub dpi: u32,
    pub limits: PayloadLimits,
    /// JPEG quality used when halving after a timeout.
    pub retry_quality: u8,
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub system_prompt: String,
    pub temperature: f32,
}

impl ProcessorSettings {
    pub fn from_config(processing: &ProcessingConfig, inference: &InferenceConfig) -> Self {
        Self {
            dpi: processing.dpi,
            limits: PayloadLimits {
                max_bytes: processing.max_image_bytes,
                min_edge_px: processing.min_edge_px,
            },
            retry_quality: processing.retry_quality,
            attempt_timeout: Duration::from_secs(inference.request_timeout_secs),
            max_attempts: inference.max_attempts.max(1),
            system_prompt: inference.system_prompt.clone(),
            temperature: inference.temperature,
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default(), &InferenceConfig::default())
    }
}

/// Why a page's stored text is a sentinel instead of model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Every attempt timed out, each with a smaller image than the last.
    Timeout { attempts: u32 },
    ContentRejected { reason: String },
    /// No endpoint or credentials.
    ConfigMissing,
    Failed { reason: String },
}

impl Degradation {
    /// Text stored for the page.
    pub fn sentinel(&self, page: u32) -> String {
        match self {
            Degradation::Timeout { attempts } => format!(
                "[Page {}: processing timed out after {} attempts]",
                page, attempts
            ),
            Degradation::ContentRejected { .. } => format!(
                "[Page {}: content was rejected by the inference service]",
                page
            ),
            Degradation::ConfigMissing => "API key not available".to_string(),
            Degradation::Failed { .. } => format!("[Page {}: could not be processed]", page),
        }
    }
}

/// Result of one page run, ready to store.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRun {
    pub text: String,
    /// Size of the last image sent, or 0 if none was produced.
    pub image_size_bytes: u64,
    pub degradation: Option<Degradation>,
    /// Inference calls made.
    pub attempts: u32,
}

impl PageRun {
    fn degraded(page: u32, degradation: Degradation, image_size_bytes: u64, attempts: u32) -> Self {
        Self {
            text: degradation.sentinel(page),
            image_size_bytes,
            degradation: Some(degradation),
            attempts,
        }
    }
}

pub struct PageProcessor {
    normalizer: Arc<dyn DocumentNormalizer>,
    inference: Arc<dyn PageInference>,
    settings: ProcessorSettings,
}

impl PageProcessor {
    pub fn new(
        normalizer: Arc<dyn DocumentNormalizer>,
        inference: Arc<dyn PageInference>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            normalizer,
            inference,
            settings,
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Renders `page` of the job's document and runs inference on it,
    /// halving the image after each timeout.
    pub async fn run(&self, job: &Job, page: u32) -> PageRun {
        let span = info_span!("page.run", job_id = %job.id, page);
        self.run_inner(job, page).instrument(span).await
    }

    async fn run_inner(&self, job: &Job, page: u32) -> PageRun {
        let mut image = match self.render(&job.source_ref, page).await {
            Ok(image) => image,
            Err(reason) => {
                warn!(%reason, "Page could not be prepared");
                return PageRun::degraded(page, Degradation::Failed { reason }, 0, 0);
            }
        };

        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let request = InferenceRequest {
                system: self.settings.system_prompt.clone(),
                user: job.prompt.clone(),
                image_jpeg: image.bytes.clone(),
                model: job.model.clone(),
                temperature: self.settings.temperature,
            };
            let size = image.len() as u64;

            let outcome = tokio::time::timeout(
                self.settings.attempt_timeout,
                self.inference.infer(&request),
            )
            .await
            .unwrap_or(Err(InferenceFailure::Timeout));

            match outcome {
                Ok(text) => {
                    debug!(attempt, image_bytes = size, "Page inference succeeded");
                    return PageRun {
                        text,
                        image_size_bytes: size,
                        degradation: None,
                        attempts: attempt,
                    };
                }
                Err(InferenceFailure::Timeout) => {
                    warn!(attempt, max_attempts, image_bytes = size, "Page inference timed out");
                    if attempt == max_attempts {
                        return PageRun::degraded(
                            page,
                            Degradation::Timeout { attempts: attempt },
                            size,
                            attempt,
                        );
                    }
                    image = match self.shrink(image).await {
                        Ok(smaller) => smaller,
                        Err(e) => {
                            return PageRun::degraded(
                                page,
                                Degradation::Failed {
                                    reason: e.to_string(),
                                },
                                size,
                                attempt,
                            );
                        }
                    };
                }
                Err(InferenceFailure::ContentRejected(reason)) => {
                    warn!(%reason, "Page content rejected");
                    return PageRun::degraded(
                        page,
                        Degradation::ContentRejected { reason },
                        size,
                        attempt,
                    );
                }
                Err(InferenceFailure::ConfigMissing(reason)) => {
                    warn!(%reason, "Inference not configured");
                    return PageRun::degraded(page, Degradation::ConfigMissing, size, attempt);
                }
                Err(InferenceFailure::Failed(reason)) => {
                    warn!(%reason, "Page inference failed");
                    return PageRun::degraded(page, Degradation::Failed { reason }, size, attempt);
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        PageRun::degraded(
            page,
            Degradation::Timeout {
                attempts: max_attempts,
            },
            image.len() as u64,
            max_attempts,
        )
    }

    async fn render(&self, source_ref: &str, page: u32) -> Result<EncodedImage, String> {
        let doc = self
            .normalizer
            .resolve(source_ref)
            .await
            .map_err(|e| e.to_string())?;
        let png = self
            .normalizer
            .rasterize(&doc, page, self.settings.dpi)
            .await
            .map_err(|e| e.to_string())?;

        let limits = self.settings.limits;
        let encoded = tokio::task::spawn_blocking(move || payload::prepare_payload(&png, &limits))
            .await
            .map_err(|e| format!("image task failed: {}", e))?
            .map_err(|e| e.to_string())?;

        debug!(
            width = encoded.width,
            height = encoded.height,
            quality = encoded.quality,
            grayscale = encoded.grayscale,
            bytes = encoded.len(),
            "Prepared page payload"
        );
        Ok(encoded)
    }

    async fn shrink(&self, image: EncodedImage) -> Result<EncodedImage, ImageError> {
        let quality = self.settings.retry_quality;
        tokio::task::spawn_blocking(move || payload::halve(&image, quality))
            .await
            .map_err(|e| ImageError::Encode(format!("image task failed: {}", e)))?
    }
}
