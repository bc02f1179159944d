//! Configuration management and validation.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables, then command-line overrides applied by the CLI.

use crate::app::adapters::http::TransportConfig;
use crate::app::services::property_match::MatchRule;
use crate::constants::{
    APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_REMOTE_URL, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
    ENV_CACHE_ROOT, ENV_REMOTE_URL, ENV_TIMEOUT_SECS,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    pub fetch: FetchConfig,
    pub matching: MatchingConfig,
    pub logging: LoggingConfig,
}

/// Where station caches live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory holding one tree per provider
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: Config::default_cache_root(),
        }
    }
}

/// Entity store connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Service root, e.g. `https://host/FROST-Server/v1.1`
    pub base_url: String,

    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REMOTE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Source file downloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Source files can be large, so the default is generous
    pub timeout_secs: u64,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Property to datastream matching
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub rule: MatchRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/sensorthings-sync/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or_else(|| Error::configuration("Could not determine the user config directory"))
    }

    /// `<cache dir>/sensorthings-sync`, or a relative directory if the
    /// platform has no cache directory
    pub fn default_cache_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    /// Read a TOML file; absent sections and fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("Failed to read config file {}", path.display()), e)
        })?;
        toml::from_str(&text).map_err(|e| {
            Error::configuration(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    /// Defaults, then `config_file` if given, then the process environment
    pub fn load_layered(config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    ///
    /// `STA_SYNC_TIMEOUT_SECS` sets both the remote and fetch timeouts.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_CACHE_ROOT).filter(|v| !v.trim().is_empty()) {
            debug!("{} overrides cache root", ENV_CACHE_ROOT);
            self.cache.root = PathBuf::from(root);
        }
        if let Some(url) = lookup(ENV_REMOTE_URL).filter(|v| !v.trim().is_empty()) {
            debug!("{} overrides remote URL", ENV_REMOTE_URL);
            self.remote.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                Error::configuration(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_TIMEOUT_SECS, raw
                ))
            })?;
            self.remote.timeout_secs = secs;
            self.fetch.timeout_secs = secs;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.remote.base_url.trim().is_empty() {
            return Err(Error::configuration("Remote base URL cannot be empty"));
        }
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(Error::configuration(format!(
                "Remote base URL must be http(s): {}",
                self.remote.base_url
            )));
        }
        if self.remote.timeout_secs == 0 || self.fetch.timeout_secs == 0 {
            return Err(Error::configuration("Timeouts must be greater than zero"));
        }
        if self.cache.root.as_os_str().is_empty() {
            return Err(Error::configuration("Cache root cannot be empty"));
        }
        Ok(())
    }

    /// Transport settings for source downloads
    ///
    /// Compression stays off so lengths and range offsets are identity bytes.
    pub fn fetch_transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            user_agent: self.fetch.user_agent.clone(),
            decompress: false,
        }
    }

    /// Transport settings for entity store calls
    pub fn remote_transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.remote.timeout_secs),
            user_agent: self.fetch.user_agent.clone(),
            decompress: true,
        }
    }
}
