use std::time::Duration;

use axum::http::HeaderName;
use url::Url;

use vaultdeck_protocol::constants::{
    ACCESS_KEY_COOKIE, ACCESS_KEY_HEADER, PROXY_ALLOWED_PREFIXES, PROXY_MAX_BODY_BYTES,
    PROXY_MOUNT_PREFIX, PROXY_STREAMING_PATHS, PROXY_TIMEOUT,
};

/// Immutable per-process proxy settings.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Backend base URL. Backend-relative paths are appended to it.
    pub backend_url: Url,
    /// Inbound path prefix the proxy is mounted under, without trailing slash.
    pub mount_prefix: String,
    /// A backend path must start with one of these.
    pub allowed_prefixes: Vec<String>,
    /// POST targets that may answer with an event stream.
    pub streaming_paths: Vec<String>,
    /// Cookie carrying the access key.
    pub access_key_cookie: String,
    /// Header the access key is forwarded in.
    pub access_key_header: HeaderName,
    /// Wall-clock budget per request, headers and body included.
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

impl ProxyConfig {
    pub fn new(backend_url: Url) -> Self {
        Self {
            backend_url,
            mount_prefix: PROXY_MOUNT_PREFIX.to_string(),
            allowed_prefixes: PROXY_ALLOWED_PREFIXES.iter().map(|p| p.to_string()).collect(),
            streaming_paths: PROXY_STREAMING_PATHS.iter().map(|p| p.to_string()).collect(),
            access_key_cookie: ACCESS_KEY_COOKIE.to_string(),
            access_key_header: HeaderName::from_static(ACCESS_KEY_HEADER),
            timeout: PROXY_TIMEOUT,
            max_body_bytes: PROXY_MAX_BODY_BYTES,
        }
    }

    pub fn with_mount_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mount_prefix = normalize_mount(prefix.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

fn normalize_mount(prefix: String) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
