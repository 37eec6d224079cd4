//! Settings file management

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::errors::LogsError;
use crate::logging::LogLevel;
use crate::query::retry::RetryOptions;
use crate::viewer::history::PAGE_SIZE;

/// Default location of the settings file, relative to the home directory
pub const SETTINGS_FILE: &str = ".config/logtail/settings.json";

/// Viewer settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level of the diagnostics
    #[serde(default)]
    pub log_level: LogLevel,

    /// Write diagnostics as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Directory for a rolling diagnostics file
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// API token, overridden by the `LOGTAIL_TOKEN` environment variable
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,

    /// Organization whose quotas bound the log retention
    #[serde(default)]
    pub organization_id: Option<String>,

    /// Fixed retention in days, skips the quota lookup
    #[serde(default)]
    pub logs_retention_days: Option<u32>,

    /// History lines per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum number of cached history pages
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Retry policy of history queries
    #[serde(default)]
    pub retry: RetryOptions,
}

fn default_page_size() -> u32 {
    PAGE_SIZE
}

fn default_cache_capacity() -> u64 {
    64
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(SecretString::from))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            json_logs: false,
            log_dir: None,
            backend: BackendSettings::default(),
            token: None,
            organization_id: None,
            logs_retention_days: None,
            page_size: default_page_size(),
            cache_capacity: default_cache_capacity(),
            retry: RetryOptions::default(),
        }
    }
}

impl Settings {
    /// Parse settings from JSON
    pub fn from_json(contents: &str) -> Result<Self, LogsError> {
        let settings: Settings = serde_json::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load the settings file; a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self, LogsError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::from_json(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Default settings path
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_FILE)
    }

    fn validate(&self) -> Result<(), LogsError> {
        if self.page_size == 0 {
            return Err(LogsError::ConfigError("page_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Backend API settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the backend API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
