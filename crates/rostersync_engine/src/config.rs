//! Configuration for the sync engine.

use crate::engine::MAX_WRITE_ATTEMPTS;
use std::time::Duration;

/// Configuration for one sync client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL.
    pub server_url: String,
    /// Name used in logs to tell clients apart.
    pub client_name: String,
    /// Per-request timeout handed to the HTTP client.
    pub request_timeout: Duration,
    /// Whether a cache-served load also starts a background refresh.
    pub refresh_on_load: bool,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            client_name: "client".into(),
            request_timeout: Duration::from_secs(10),
            refresh_on_load: true,
        }
    }

    /// Sets the client name.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets whether a cache-served load starts a background refresh.
    pub fn with_refresh_on_load(mut self, refresh: bool) -> Self {
        self.refresh_on_load = refresh;
        self
    }

    /// Maximum write attempts per edit: the first try plus one retry after
    /// a forced resync. Not configurable.
    pub const fn max_write_attempts(&self) -> u32 {
        MAX_WRITE_ATTEMPTS
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:4000")
    }
}
