//! Gateway server configuration.
//!
//! Read from an optional TOML file, then overridden by environment
//! variables:
//! - `VAULTDECK_CONFIG`: path of the TOML file (default
//!   `~/.config/vaultdeck/gateway.toml`, skipped when absent)
//! - `VAULTDECK_BACKEND_URL`
//! - `VAULTDECK_LISTEN_ADDR`
//! - `VAULTDECK_MOUNT_PREFIX`
//! - `VAULTDECK_PROXY_TIMEOUT_SECS`

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use vaultdeck_gateway::ProxyConfig;
use vaultdeck_protocol::constants::{PROXY_MAX_BODY_BYTES, PROXY_MOUNT_PREFIX, PROXY_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    InvalidVar { name: &'static str, value: String },

    #[error("invalid backend URL {0:?}")]
    BackendUrl(String),
}

/// Gateway server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Appliance API base URL.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Inbound prefix the proxy is mounted under.
    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: String,

    /// Per-request budget in seconds, body included.
    #[serde(default = "default_timeout_secs")]
    pub proxy_timeout_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_mount_prefix() -> String {
    PROXY_MOUNT_PREFIX.into()
}

fn default_timeout_secs() -> u64 {
    PROXY_TIMEOUT.as_secs()
}

fn default_max_body_bytes() -> usize {
    PROXY_MAX_BODY_BYTES
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            listen_addr: default_listen_addr(),
            mount_prefix: default_mount_prefix(),
            proxy_timeout_secs: default_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl GatewayConfig {
    /// Loads the file named by `VAULTDECK_CONFIG` (or the default path)
    /// and applies the process environment on top.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("VAULTDECK_CONFIG")
            .map(PathBuf::from)
            .or_else(default_config_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value. Empty values are ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("VAULTDECK_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(addr) = var("VAULTDECK_LISTEN_ADDR") {
            self.listen_addr = addr.trim().parse().map_err(|_| ConfigError::InvalidVar {
                name: "VAULTDECK_LISTEN_ADDR",
                value: addr,
            })?;
        }
        if let Some(prefix) = var("VAULTDECK_MOUNT_PREFIX") {
            self.mount_prefix = prefix;
        }
        if let Some(secs) = var("VAULTDECK_PROXY_TIMEOUT_SECS") {
            self.proxy_timeout_secs = secs
                .trim()
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::InvalidVar {
                    name: "VAULTDECK_PROXY_TIMEOUT_SECS",
                    value: secs,
                })?;
        }
        Ok(())
    }

    pub fn proxy_config(&self) -> Result<ProxyConfig, ConfigError> {
        let backend_url = Url::parse(&self.backend_url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| ConfigError::BackendUrl(self.backend_url.clone()))?;
        Ok(ProxyConfig::new(backend_url)
            .with_mount_prefix(self.mount_prefix.clone())
            .with_timeout(Duration::from_secs(self.proxy_timeout_secs))
            .with_max_body_bytes(self.max_body_bytes))
    }
}

fn default_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let base = std::env::var_os("APPDATA").map(PathBuf::from);

    #[cfg(not(target_os = "windows"))]
    let base = std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config"));

    base.map(|b| b.join("vaultdeck").join("gateway.toml"))
}
