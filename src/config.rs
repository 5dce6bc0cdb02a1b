//! Client configuration loaded from `.mllab/config.toml`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs::{self, AppDirError};

/// Default filename used to store the client configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable overriding [`ClientConfig::base_url`].
pub const URL_ENV: &str = "MLLAB_URL";
/// Environment variable overriding [`ClientConfig::api_key`].
pub const API_KEY_ENV: &str = "MLLAB_API_KEY";

/// Errors that may occur while loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Dir(#[from] AppDirError),
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// The configured base URL is unusable.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL text.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Connection settings for the platform's public API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root URL of the platform, without the `/public/api` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key sent as the basic-auth user name.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Timeouts and limits applied by the HTTP transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_io_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Upper bound on any response body read into memory.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

/// Intervals used by the guess/train wait loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_guess_interval_ms")]
    pub guess_interval_ms: u64,
    #[serde(default = "default_train_interval_ms")]
    pub train_interval_ms: u64,
    /// Zero disables the deadline.
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Log filter and file retention for the command line driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default = "default_true")]
    pub to_file: bool,
    /// Number of run logs kept in the logs directory.
    #[serde(default = "default_keep_log_files")]
    pub keep_files: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            http: HttpSettings::default(),
            polling: PollingSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_io_timeout_secs(),
            write_timeout_secs: default_io_timeout_secs(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            guess_interval_ms: default_guess_interval_ms(),
            train_interval_ms: default_train_interval_ms(),
            timeout_secs: 0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            to_file: true,
            keep_files: default_keep_log_files(),
        }
    }
}

impl PollingSettings {
    /// Deadline for a single wait, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl ClientConfig {
    /// Replace fields with values found through `lookup` (usually the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|value| !value.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
    }

    /// Check that the base URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(self.base_url.trim()).map_err(|err| {
            ConfigError::InvalidUrl {
                url: self.base_url.clone(),
                reason: err.to_string(),
            }
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

/// Path of `config.toml`; the `.mllab` directory is created on the way.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from disk, returning defaults if missing, then apply
/// environment overrides.
pub fn load_or_default() -> Result<ClientConfig, ConfigError> {
    let mut config = load_from(&config_path()?)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file, returning defaults if it does not exist.
pub fn load_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

fn default_base_url() -> String {
    "http://localhost:11200".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_io_timeout_secs() -> u64 {
    30
}

fn default_max_response_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_guess_interval_ms() -> u64 {
    200
}

fn default_train_interval_ms() -> u64 {
    2000
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_keep_log_files() -> usize {
    10
}
