//! Configuration file parser for ~/.config/textpipe/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde but logged so typos do not go unnoticed.
//! The pipeline core never reads these defaults directly: it is handed a
//! [`RetryPolicy`] and a [`RunnerConfig`] built here.
use crate::pipeline::{RetryPolicy, RunnerConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FEED_URL: &str = "https://news.yahoo.co.jp/rss/categories/it.xml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_OVERALL_TIMEOUT_MULTIPLIER: u32 = 2;
pub const DEFAULT_INITIAL_DELAY_SECS: u64 = 5;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 3;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 100;

const KNOWN_KEYS: [&str; 10] = [
    "feed_url",
    "timeout_secs",
    "max_retries",
    "concurrency",
    "overall_timeout_multiplier",
    "initial_delay_secs",
    "retry_delay_secs",
    "rate_limit_ms",
    "jina_base_url",
    "jina_api_key",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

/// Top-level configuration.
///
/// Every field has a default so any subset of keys can be given.
/// `Debug` masks `jina_api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed scraped when `scrape` is run without `--url`.
    pub feed_url: String,

    /// Per-request client timeout in seconds.
    pub timeout_secs: u64,

    /// Transient-error retries per feed or reader request.
    pub max_retries: u32,

    /// Maximum simultaneous extractions in the bulk phase.
    pub concurrency: usize,

    /// A whole run may take `timeout_secs * overall_timeout_multiplier`.
    pub overall_timeout_multiplier: u32,

    /// Pause after the bulk phase, before failures are classified.
    pub initial_delay_secs: u64,

    /// Pause before the first sequential retry.
    pub retry_delay_secs: u64,

    /// Minimum spacing between bulk request starts, in milliseconds.
    pub rate_limit_ms: u64,

    /// Reader service deployment. `None` uses the public service.
    pub jina_base_url: Option<String>,

    /// Reader API key (alternative to the JINA_API_KEY env var).
    /// The env var takes precedence.
    pub jina_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            overall_timeout_multiplier: DEFAULT_OVERALL_TIMEOUT_MULTIPLIER,
            initial_delay_secs: DEFAULT_INITIAL_DELAY_SECS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            jina_base_url: None,
            jina_api_key: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("feed_url", &self.feed_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("concurrency", &self.concurrency)
            .field("overall_timeout_multiplier", &self.overall_timeout_multiplier)
            .field("initial_delay_secs", &self.initial_delay_secs)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("rate_limit_ms", &self.rate_limit_ms)
            .field("jina_base_url", &self.jina_base_url)
            .field(
                "jina_api_key",
                &self.jina_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Config {
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Over 1 MB → `Err(ConfigError::TooLarge)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            // Deleted between metadata and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            feed_url = %config.feed_url,
            timeout_secs = config.timeout_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn runner_config(&self, feed_url: &str) -> RunnerConfig {
        RunnerConfig {
            feed_url: feed_url.to_string(),
            client_timeout: self.client_timeout(),
            overall_timeout_multiplier: self.overall_timeout_multiplier,
        }
    }
}
