//! Azure OpenAI chat-completions adapter.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{InferenceFailure, InferenceRequest, PageInference};
use crate::config::InferenceConfig;
use crate::error::ConfigError;
use crate::sanitize::{preview, redact_url};

/// Longest error body kept in a failure message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Sends one page per request to a vision deployment.
///
/// A missing endpoint or key is not a construction error; every call then
/// reports [`InferenceFailure::ConfigMissing`] so pages degrade instead of
/// failing the job.
pub struct AzureOpenAiClient {
    client: Client,
    endpoint: Option<String>,
    api_version: String,
    api_key: Option<SecretString>,
}

impl AzureOpenAiClient {
    pub fn from_config(config: &InferenceConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.resolve_optional()?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Validation {
                message: format!("failed to build inference HTTP client: {}", e),
            })?;

        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| e.trim_end_matches('/').to_string());

        if endpoint.is_none() || api_key.is_none() {
            warn!("Inference endpoint or API key not configured; pages will be marked unavailable");
        }

        Ok(Self {
            client,
            endpoint,
            api_version: config.api_version.clone(),
            api_key,
        })
    }

    fn completions_url(&self, endpoint: &str, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint, deployment, self.api_version
        )
    }
}

#[async_trait]
impl PageInference for AzureOpenAiClient {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceFailure> {
        let (Some(endpoint), Some(api_key)) = (self.endpoint.as_deref(), self.api_key.as_ref())
        else {
            return Err(InferenceFailure::ConfigMissing(
                "API key not available".to_string(),
            ));
        };

        let url = self.completions_url(endpoint, &request.model);
        debug!(
            url = %redact_url(&url),
            image_bytes = request.image_jpeg.len(),
            "Sending page to inference"
        );

        let response = self
            .client
            .post(&url)
            .header("api-key", api_key.expose_secret())
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        parse_completion(&body)
    }
}

fn request_body(request: &InferenceRequest) -> serde_json::Value {
    let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(&request.image_jpeg));
    json!({
        "messages": [
            { "role": "system", "content": request.system },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": request.user },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }
        ],
        "temperature": request.temperature,
    })
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn parse_completion(body: &str) -> Result<String, InferenceFailure> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| InferenceFailure::Failed(format!("invalid completion response: {}", e)))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceFailure::Failed("completion had no choices".to_string()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(InferenceFailure::ContentRejected(
            "response was filtered".to_string(),
        ));
    }

    Ok(choice.message.and_then(|m| m.content).unwrap_or_default())
}

fn classify_status(status: StatusCode, body: &str) -> InferenceFailure {
    let error = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let code = error.as_ref().and_then(|e| e.code.as_deref());
    let message = error
        .as_ref()
        .and_then(|e| e.message.as_deref())
        .map(|m| preview(m, MAX_ERROR_BODY_CHARS))
        .unwrap_or_else(|| preview(body, MAX_ERROR_BODY_CHARS));

    if code == Some("content_filter") {
        return InferenceFailure::ContentRejected(message);
    }

    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT | StatusCode::PAYLOAD_TOO_LARGE => {
            InferenceFailure::Timeout
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            InferenceFailure::ConfigMissing(format!("{}: {}", status, message))
        }
        _ => InferenceFailure::Failed(format!("{}: {}", status, message)),
    }
}

fn classify_transport(err: &reqwest::Error) -> InferenceFailure {
    if err.is_timeout() {
        InferenceFailure::Timeout
    } else {
        InferenceFailure::Failed(err.to_string())
    }
}
