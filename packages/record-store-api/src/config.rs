//! Server and client settings.

use std::time::Duration;

/// Server-side settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bearer token required on every request except `/health`; `None` disables auth
    pub token: Option<String>,
    /// Request body read timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            token: None,
            request_timeout_ms: 5000,
        }
    }
}

/// Client-side settings for [`RestStore`](crate::RestStore).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the record store, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with no token and a 30 second timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}
