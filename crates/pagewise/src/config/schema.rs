use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secrets::SecretSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// SQLite file; `~/.pagewise/data/pagewise.db` when unset.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Directory the document normalizer resolves file ids in.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Staging root for local-download workbooks.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn pagewise_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".pagewise"))
        .unwrap_or_else(|| std::env::temp_dir().join("pagewise"))
}

fn default_upload_dir() -> String {
    pagewise_home().join("uploads").to_string_lossy().into_owned()
}

fn default_export_dir() -> String {
    pagewise_home().join("exports").to_string_lossy().into_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            database_path: None,
            upload_dir: default_upload_dir(),
            export_dir: default_export_dir(),
            processing: ProcessingConfig::default(),
            inference: InferenceConfig::default(),
            aggregate: AggregateConfig::default(),
            export: ExportConfig::default(),
            store: StoreConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}

/// Rasterization and payload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Ceiling on the encoded image sent for inference.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    /// Geometric downscaling stops at this edge length.
    #[serde(default = "default_min_edge_px")]
    pub min_edge_px: u32,
    /// JPEG quality used when re-encoding a halved image after a timeout.
    #[serde(default = "default_retry_quality")]
    pub retry_quality: u8,
    /// Path or name of the `pdftoppm` binary.
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
}

fn default_dpi() -> u32 {
    200
}

fn default_max_image_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_min_edge_px() -> u32 {
    256
}

fn default_retry_quality() -> u8 {
    85
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            max_image_bytes: default_max_image_bytes(),
            min_edge_px: default_min_edge_px(),
            retry_quality: default_retry_quality(),
            pdftoppm: default_pdftoppm(),
        }
    }
}

/// Azure OpenAI chat-completions settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_api_key")]
    pub api_key: SecretSource,
    /// Deployment used when a job does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total attempts per page, including the first.
    #[serde(default = "default_inference_attempts")]
    pub max_attempts: u32,
}

fn default_api_version() -> String {
    "2024-12-01-preview".to_string()
}

fn default_api_key() -> SecretSource {
    SecretSource::from_env("AZURE_OPENAI_API_KEY")
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_system_prompt() -> String {
    "You are a careful document analyst. You receive one page of a document as an image. \
     Follow the user's instructions for that page only and answer with the requested content."
        .to_string()
}

fn default_request_timeout() -> u64 {
    180
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_inference_attempts() -> u32 {
    3
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_version: default_api_version(),
            api_key: default_api_key(),
            default_model: default_model(),
            system_prompt: default_system_prompt(),
            temperature: 0.0,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_attempts: default_inference_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Target character count per export chunk.
    #[serde(default = "default_chunk_target")]
    pub chunk_target: usize,
}

fn default_chunk_target() -> usize {
    26_140
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            chunk_target: default_chunk_target(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,
    /// How long a remote-store session is reused.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Remote document store; uploads fall back to local download without it.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_upload_workers() -> usize {
    2
}

fn default_session_ttl() -> u64 {
    50 * 60
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            upload_timeout_secs: default_upload_timeout(),
            upload_workers: default_upload_workers(),
            session_ttl_secs: default_session_ttl(),
            remote: None,
        }
    }
}

/// SharePoint REST access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_token")]
    pub access_token: SecretSource,
    #[serde(default = "default_remote_timeout")]
    pub request_timeout_secs: u64,
}

fn default_remote_token() -> SecretSource {
    SecretSource::from_env("SHAREPOINT_ACCESS_TOKEN")
}

fn default_remote_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            access_token: default_remote_token(),
            request_timeout_secs: default_remote_timeout(),
        }
    }
}

/// Busy/locked retry settings for the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_store_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_store_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Jobs untouched for longer than this are removed by `sweep`.
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u64,
}

fn default_stale_after_hours() -> u64 {
    24
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: default_stale_after_hours(),
        }
    }
}

impl Config {
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(crate::secrets::expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        PathBuf::from(crate::secrets::expand_home(&self.upload_dir))
    }

    pub fn export_dir(&self) -> PathBuf {
        PathBuf::from(crate::secrets::expand_home(&self.export_dir))
    }
}
