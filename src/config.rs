//! Configuration
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! environment variables. Command-line flags are applied last by the binary.

use crate::result_filter::SelectionThresholds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Name of the configuration file inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// The configuration file is not valid TOML for this schema
    #[error("Invalid config file {path}: {source}")]
    Invalid {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// An environment variable holds an unusable value
    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub transmission: TransmissionConfig,
    pub subtitles: SubtitleConfig,
    pub retry: RetryConfig,
    pub transfer: TransferConfig,
    pub http: HttpConfig,
}

/// Torrent index settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub thresholds: SelectionThresholds,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://thepiratebay.org".to_string(),
            thresholds: SelectionThresholds::default(),
        }
    }
}

/// Transmission RPC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9091/transmission/rpc".to_string(),
            username: Some("transmission".to_string()),
            password: Some("transmission".to_string()),
        }
    }
}

/// Subtitle source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub opensubtitles_url: String,
    /// Host serving OpenSubtitles archives
    pub opensubtitles_download_url: String,
    pub subscenter_url: String,
    /// Language served by the regional source
    pub regional_language: String,
    /// Language tried when the requested one has no match
    pub fallback_language: String,
    /// Minimum version similarity in `[0, 1]`; unset accepts the best match
    pub min_similarity: Option<f64>,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            opensubtitles_url: "https://www.opensubtitles.org".to_string(),
            opensubtitles_download_url: "https://dl.opensubtitles.org".to_string(),
            subscenter_url: "http://www.subscenter.org".to_string(),
            regional_language: "he".to_string(),
            fallback_language: "en".to_string(),
            min_similarity: None,
        }
    }
}

/// Retry behavior for unreachable search listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 60 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay (default: 15 minutes)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Transfer polling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Abandon a transfer after this long; unset waits forever
    #[serde(default = "default_transfer_timeout", with = "optional_duration_serde")]
    pub timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            timeout: default_transfer_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_transfer_timeout() -> Option<Duration> {
    Some(Duration::from_secs(12 * 60 * 60))
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Loads configuration from `path`, or from the platform config
    /// directory when no path is given, then applies environment overrides.
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parses a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(path = %path.display(), "loaded config file");

        toml::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Overrides Transmission settings from `TRANSMISSION_*` variables
    fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("TRANSMISSION_URL") {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidEnv {
                    name: "TRANSMISSION_URL",
                    reason: "must not be empty".to_string(),
                });
            }
            self.transmission.url = url;
        }
        if let Some(username) = lookup("TRANSMISSION_USERNAME") {
            self.transmission.username = Some(username);
        }
        if let Some(password) = lookup("TRANSMISSION_PASSWORD") {
            self.transmission.password = Some(password);
        }
        Ok(())
    }
}

/// `<platform config dir>/torrent_dd/config.toml`, if the platform has one
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "torrent_dd")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

// Durations are whole seconds in the file
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
