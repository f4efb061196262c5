//! Centralized configuration for wirecall.
//!
//! Wire constants shared by server and client, plus the tunable client
//! configuration.

use std::time::Duration;

/// Wire and server configuration.
pub struct RpcConfig;

impl RpcConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_BASE_PATH: &'static str = "/";

    /// HTTP status written for `status = OK` responses.
    pub const STATUS_OK_CODE: u16 = 200;
    /// HTTP status written for `status = error` responses.
    pub const STATUS_ERROR_CODE: u16 = 599;

    pub const CONTENT_TYPE: &'static str = "application/json";
    pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024; // 16MB

    /// Default bound on a client round trip.
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "wirecall/0.1";
}

/// Client-side configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on a full request/response round trip.
    pub timeout: Duration,
    pub user_agent: String,
    /// Path prefix the server mounted its endpoints under.
    pub base_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: RpcConfig::CALL_TIMEOUT,
            user_agent: RpcConfig::USER_AGENT.to_string(),
            base_path: RpcConfig::DEFAULT_BASE_PATH.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }
}

/// Normalize a mount path to the `/prefix/` form (or `/` for the root).
pub(crate) fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
