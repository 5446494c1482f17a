//! Fetcher configuration.
//!
//! Everything the fetcher needs (retry parameters, HTTP settings, which data
//! source to use, where the cache lives) is carried in one `FetcherConfig`
//! handed over at construction time. Nothing is read from or written to
//! process-wide defaults.
//!
//! Loaded from TOML; every field has a default, so an empty file is valid:
//!
//! ```toml
//! window_days = 365
//! auto_adjust = true
//!
//! [retry]
//! max_attempts = 3
//! backoff_secs = 2.0
//!
//! [http]
//! timeout_secs = 30
//!
//! [source]
//! kind = "yahoo"        # or "csv" (with dir = "...") or "synthetic"
//!
//! [cache]
//! enabled = true
//! dir = ".cache"
//! ```

use crate::data::cache::{CachedProvider, ParquetCache};
use crate::data::csv_file::CsvProvider;
use crate::data::provider::{DataError, DataProvider};
use crate::data::synthetic::SyntheticProvider;
use crate::data::window::{DateWindow, DEFAULT_WINDOW_DAYS};
use crate::data::yahoo::YahooProvider;
use crate::fetcher::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("build data source: {0}")]
    Provider(#[from] DataError),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Trailing window length in calendar days.
    pub window_days: u32,
    /// Scale OHLC by the adjusted close before returning.
    pub auto_adjust: bool,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub source: SourceConfig,
    pub cache: CacheConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            auto_adjust: true,
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
            source: SourceConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per fetch, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query2.finance.yahoo.com".into(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
            timeout_secs: 30,
        }
    }
}

/// Which upstream the fetcher talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    #[default]
    Yahoo,
    /// Directory of `{TICKER}_stock_data.csv` files.
    Csv { dir: PathBuf },
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from(".cache"),
        }
    }
}

impl FetcherConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_days == 0 {
            return Err(ConfigError::Invalid("window_days must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if DateWindow::trailing_from_today(self.window_days).is_none() {
            return Err(ConfigError::Invalid(format!(
                "window_days = {} reaches past the supported calendar range",
                self.window_days
            )));
        }
        self.retry_policy()?;
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Fails when `backoff_secs` is negative, NaN, or too large for a `Duration`.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let backoff = Duration::try_from_secs_f64(self.retry.backoff_secs).map_err(|e| {
            ConfigError::Invalid(format!(
                "retry.backoff_secs must be a non-negative number of seconds, got {}: {e}",
                self.retry.backoff_secs
            ))
        })?;
        Ok(RetryPolicy::new(self.retry.max_attempts, backoff))
    }
}

/// Construct the configured data source, wrapped in the cache when enabled.
pub fn build_provider(config: &FetcherConfig) -> Result<Box<dyn DataProvider>, ConfigError> {
    let base: Box<dyn DataProvider> = match &config.source {
        SourceConfig::Yahoo => Box::new(YahooProvider::new(&config.http)?),
        SourceConfig::Csv { dir } => Box::new(CsvProvider::new(dir.clone())),
        SourceConfig::Synthetic => Box::new(SyntheticProvider::new()),
    };

    if config.cache.enabled {
        let cache = ParquetCache::new(config.cache.dir.clone());
        Ok(Box::new(CachedProvider::new(base, cache)))
    } else {
        Ok(base)
    }
}
