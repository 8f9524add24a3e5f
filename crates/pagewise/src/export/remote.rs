//! Remote document store seam and the SharePoint adapter.
//!
//! All calls are blocking. They run on [`super::pool::UploadPool`] threads,
//! never on the async runtime.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::destination::RemoteTarget;
use crate::sanitize::{preview, redact_url};

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote store is not configured: {0}")]
    NotConfigured(String),

    #[error("Remote store rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("Remote store returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Remote store request failed: {0}")]
    Transport(String),
}

/// One site's document library.
pub trait RemoteStore: Send + Sync {
    fn folder_exists(&self, folder: &str) -> Result<bool, RemoteError>;

    /// Creates `folder` and any missing parents. Creating an existing
    /// folder is not an error.
    fn create_folder(&self, folder: &str) -> Result<(), RemoteError>;

    /// Uploads `content`, replacing any existing file. Returns the file's
    /// location as reported by the store.
    fn upload_overwrite(
        &self,
        folder: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<String, RemoteError>;
}

/// Opens a [`RemoteStore`] session for a site URL.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, site_url: &str) -> Result<Arc<dyn RemoteStore>, RemoteError>;
}

/// Ensures the target folder exists, then uploads with overwrite.
pub fn deliver(
    store: &dyn RemoteStore,
    target: &RemoteTarget,
    content: &[u8],
) -> Result<String, RemoteError> {
    if !store.folder_exists(&target.folder)? {
        debug!(folder = %target.folder, "Creating remote folder");
        store.create_folder(&target.folder)?;
    }
    store.upload_overwrite(&target.folder, &target.filename, content)
}

/// Creates [`SharePointStore`] sessions authenticated with a bearer token.
pub struct SharePointConnector {
    access_token: SecretString,
    request_timeout: Duration,
}

impl SharePointConnector {
    pub fn new(access_token: SecretString, request_timeout: Duration) -> Self {
        Self {
            access_token,
            request_timeout,
        }
    }
}

impl RemoteConnector for SharePointConnector {
    fn connect(&self, site_url: &str) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        let site_url = site_url.trim().trim_end_matches('/');
        if site_url.is_empty() {
            return Err(RemoteError::NotConfigured("site URL is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.access_token.expose_secret());
        let mut auth_value = HeaderValue::from_str(&auth)
            .map_err(|_| RemoteError::NotConfigured("access token is not a valid header".to_string()))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json;odata=nometadata"));

        let client = Client::builder()
            .timeout(self.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        debug!(site = %redact_url(site_url), "Opened remote store session");
        Ok(Arc::new(SharePointStore {
            client,
            site_url: site_url.to_string(),
        }))
    }
}

/// SharePoint REST client for one site.
pub struct SharePointStore {
    client: Client,
    site_url: String,
}

#[derive(Debug, Deserialize)]
struct ExistsResponse {
    value: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddedFile {
    #[serde(default)]
    server_relative_url: Option<String>,
}

impl SharePointStore {
    fn api(&self, path: &str) -> String {
        format!("{}/_api/web/{}", self.site_url, path)
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<String, RemoteError> {
        let response = request
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        check_status(status, &body)?;
        Ok(body)
    }
}

impl RemoteStore for SharePointStore {
    fn folder_exists(&self, folder: &str) -> Result<bool, RemoteError> {
        let request = self
            .client
            .get(self.api("GetFolderByServerRelativePath(decodedurl=@u)/Exists"))
            .query(&[("@u", odata_string(folder))]);

        match self.send(request) {
            Ok(body) => serde_json::from_str::<ExistsResponse>(&body)
                .map(|r| r.value)
                .map_err(|e| RemoteError::Transport(format!("unexpected response: {}", e))),
            Err(RemoteError::Http { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn create_folder(&self, folder: &str) -> Result<(), RemoteError> {
        // Folders/AddUsingPath does not create parents.
        for prefix in folder_prefixes(folder) {
            if self.folder_exists(&prefix)? {
                continue;
            }
            let request = self
                .client
                .post(self.api("Folders/AddUsingPath(decodedurl=@u)"))
                .query(&[("@u", odata_string(&prefix))]);
            self.send(request)?;
        }
        Ok(())
    }

    fn upload_overwrite(
        &self,
        folder: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<String, RemoteError> {
        let request = self
            .client
            .post(self.api(
                "GetFolderByServerRelativePath(decodedurl=@u)/Files/AddUsingPath(decodedurl=@f,overwrite=true)",
            ))
            .query(&[("@u", odata_string(folder)), ("@f", odata_string(filename))])
            .body(content.to_vec());

        let body = self.send(request)?;
        let location = serde_json::from_str::<AddedFile>(&body)
            .ok()
            .and_then(|f| f.server_relative_url)
            .unwrap_or_else(|| format!("{}/{}/{}", self.site_url, folder, filename));
        Ok(location)
    }
}

fn check_status(status: StatusCode, body: &str) -> Result<(), RemoteError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized {
            status: status.as_u16(),
        }),
        _ => Err(RemoteError::Http {
            status: status.as_u16(),
            message: preview(body.trim(), MAX_ERROR_BODY_CHARS),
        }),
    }
}

/// Quotes a value for an OData alias parameter.
fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `a/b/c` → `["a", "a/b", "a/b/c"]`, ignoring empty segments.
fn folder_prefixes(folder: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = String::new();
    for segment in folder.split('/').filter(|s| !s.trim().is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}
