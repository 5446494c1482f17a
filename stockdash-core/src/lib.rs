//! StockDash Core: fetch a trailing window of daily prices for one ticker.
//!
//! - Ticker, window and price series types
//! - `DataProvider` trait with Yahoo, CSV and synthetic sources
//! - Parquet read-through cache
//! - Retrying fetcher with a fixed backoff
//! - TOML configuration

pub mod config;
pub mod data;
pub mod fetcher;

pub use config::{build_provider, ConfigError, FetcherConfig, SourceConfig};
pub use fetcher::{fetch_stock_data, FetchError, Fetcher, RetryPolicy, Sleeper, ThreadSleeper};
