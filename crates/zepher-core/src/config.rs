//! Client configuration.
//!
//! `ClientConfig` is what `ApiClient::new` consumes. `Settings` is the
//! user-editable form read from `~/.config/zepher/config.json`, with
//! environment variable overrides applied on load.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::CacheMode;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "zepher";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_APP_KEY: &str = "ZEPHER_APP_KEY";
const ENV_EXPORT_PATH: &str = "ZEPHER_EXPORT_PATH";
const ENV_INSECURE_TLS: &str = "ZEPHER_INSECURE_TLS";
const ENV_DATA_DIR: &str = "ZEPHER_DATA_DIR";
const ENV_CACHE_MODE: &str = "ZEPHER_CACHE_MODE";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application key or a previously issued session token.
    pub app_key: String,

    /// Where to write `var zepher = JSON.parse(...)` after each response.
    pub export_path: Option<PathBuf>,

    /// Verify the service's TLS certificate (default: true).
    pub verify_tls: bool,

    /// Directory for the session cookie and response store.
    /// `None` keeps the cookie in memory only and disables the store.
    pub data_dir: Option<PathBuf>,

    pub cache_mode: CacheMode,

    /// Request timeout; `None` leaves the transport default in place.
    pub timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            export_path: None,
            verify_tls: true,
            data_dir: None,
            cache_mode: CacheMode::default(),
            timeout_secs: None,
        }
    }

    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Accept any TLS certificate. Only for services behind self-signed certs.
    pub fn danger_accept_invalid_certs(mut self) -> Self {
        self.verify_tls = false;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub app_key: Option<String>,
    pub export_path: Option<PathBuf>,
    pub insecure_tls: bool,
    pub data_dir: Option<PathBuf>,
    pub cache_mode: CacheMode,
    pub timeout_secs: Option<u64>,
    /// Endpoint the CLI queries to refresh the environment.
    pub env_uri: Option<String>,
    /// Keychain profile holding the application key.
    pub profile: Option<String>,
}

impl Settings {
    /// Load settings from the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = var(ENV_APP_KEY).filter(|v| !v.is_empty()) {
            self.app_key = Some(key);
        }
        if let Some(path) = var(ENV_EXPORT_PATH).filter(|v| !v.is_empty()) {
            self.export_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = var(ENV_INSECURE_TLS) {
            self.insecure_tls = matches!(flag.trim(), "1" | "true" | "yes");
        }
        if let Some(dir) = var(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = var(ENV_CACHE_MODE) {
            self.cache_mode = CacheMode::parse(&mode)
                .with_context(|| format!("Invalid {} value: {}", ENV_CACHE_MODE, mode))?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Configured data directory, or the platform cache directory.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Build a client configuration around the given application key.
    pub fn client_config(&self, app_key: String) -> Result<ClientConfig> {
        Ok(ClientConfig {
            app_key,
            export_path: self.export_path.clone(),
            verify_tls: !self.insecure_tls,
            data_dir: Some(self.data_dir()?),
            cache_mode: self.cache_mode,
            timeout_secs: self.timeout_secs,
        })
    }
}
