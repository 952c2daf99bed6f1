//! Feed credential store.
//!
//! Holds the token injected into every feed URL. Persisted as a small JSON
//! file so the CLI and console share one login.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors from credential persistence.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Process-wide token store.
///
/// Connections only read from it, once per connect attempt.
pub struct TokenStore {
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
}

impl TokenStore {
    /// Opens a file-backed store, loading the token if the file exists.
    pub fn new(path: PathBuf) -> Result<Self, CredentialError> {
        let token = load_token(&path)?;
        Ok(Self {
            path: Some(path),
            token: RwLock::new(token),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            path: None,
            token: RwLock::new(token),
        }
    }

    /// Returns the current token. Empty tokens count as absent.
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|t| !t.is_empty())
    }

    /// Replaces the token and persists it.
    pub fn save_token(&self, token: &str) -> Result<(), CredentialError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        self.persist()
    }

    /// Forgets the token (logout).
    pub fn clear(&self) -> Result<(), CredentialError> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.persist()
    }

    fn persist(&self) -> Result<(), CredentialError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = CredentialFile {
            token: self.token.read().unwrap_or_else(PoisonError::into_inner).clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "persisted feed credentials");
        Ok(())
    }
}

fn load_token(path: &Path) -> Result<Option<String>, CredentialError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let file: CredentialFile = serde_json::from_str(&data)?;
    debug!(path = %path.display(), present = file.token.is_some(), "loaded feed credentials");
    Ok(file.token)
}

/// Default location: `<config dir>/vaultdeck/credentials.json`.
pub fn default_credentials_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("vaultdeck").join("credentials.json"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}
