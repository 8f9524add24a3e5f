//! Per-site remote store sessions with a time-to-live.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::debug;

use super::remote::{RemoteConnector, RemoteError, RemoteStore};
use crate::sanitize::redact_url;

const MAX_SITES: u64 = 64;

/// Caches one [`RemoteStore`] per site URL.
///
/// Concurrent misses for the same site share a single `connect` call;
/// misses for different sites do not wait on each other. A failed connect
/// is not cached.
pub struct SessionCache {
    connector: Arc<dyn RemoteConnector>,
    sessions: Cache<String, Arc<dyn RemoteStore>>,
}

impl SessionCache {
    pub fn new(connector: Arc<dyn RemoteConnector>, ttl: Duration) -> Self {
        Self {
            connector,
            sessions: Cache::builder()
                .max_capacity(MAX_SITES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, site_url: &str) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        self.sessions
            .try_get_with(site_url.to_string(), || {
                debug!(site = %redact_url(site_url), "Connecting to remote store");
                self.connector.connect(site_url)
            })
            .map_err(|e| (*e).clone())
    }

    pub fn invalidate(&self, site_url: &str) {
        self.sessions.invalidate(site_url);
    }
}
