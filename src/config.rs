//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`ROOMKEY_BASE_URL`, `ROOMKEY_STORE_PATH`)
//! 2. TOML file passed explicitly by the embedding application
//! 3. `$XDG_CONFIG_HOME/roomkey/roomkey.toml` (or `~/.config/roomkey/roomkey.toml`)
//! 4. Built-in defaults

use crate::error::ConfigError;
use crate::store::{config_root_dir, default_store_path};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_API_BASE_URL: &str = "https://api.roomkey.app";
const DEFAULT_FEDERATED_PROVIDER: &str = "google";

/// Top-level runtime configuration for the session core.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub api: ApiSettings,
    pub storage: StorageSettings,
}

/// Backend connection settings used by the token exchange client.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    /// Path segment of the federated sign-in endpoint (`/auth/<provider>`).
    pub federated_provider: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            federated_provider: DEFAULT_FEDERATED_PROVIDER.into(),
        }
    }
}

/// Durable-storage settings for the credential store.
#[derive(Debug, Clone, Default)]
pub struct StorageSettings {
    /// Session-store file location. `None` means no durable storage is
    /// available and the session operates in-memory only.
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// TOML file shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api: FileApi,
    storage: FileStorage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileApi {
    base_url: Option<String>,
    federated_provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileStorage {
    path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration, optionally from an explicit TOML file.
pub fn load_config(explicit_path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let file = match explicit_path {
        Some(path) => Some(read_file_config(path)?),
        None => match default_config_path() {
            Some(path) if path.exists() => Some(read_file_config(&path)?),
            _ => None,
        },
    };

    let mut config = ClientConfig::default();
    config.storage.path = default_store_path();

    if let Some(file) = file {
        if let Some(base_url) = file.api.base_url {
            config.api.base_url = base_url;
        }
        if let Some(provider) = file.api.federated_provider {
            config.api.federated_provider = provider;
        }
        if let Some(path) = file.storage.path {
            config.storage.path = Some(path);
        }
    }

    if let Ok(base_url) = std::env::var("ROOMKEY_BASE_URL") {
        if !base_url.trim().is_empty() {
            config.api.base_url = base_url;
        }
    }
    if let Ok(store_path) = std::env::var("ROOMKEY_STORE_PATH") {
        if !store_path.trim().is_empty() {
            config.storage.path = Some(PathBuf::from(store_path));
        }
    }

    if config.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
    }
    if config.api.federated_provider.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "api.federated_provider must not be empty".into(),
        ));
    }
    Ok(config)
}

/// Default config file location (`~/.config/roomkey/roomkey.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    config_root_dir().map(|dir| dir.join("roomkey").join("roomkey.toml"))
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}
