//! Retrying fetcher.
//!
//! Turns a single-shot `DataProvider` into a dependable source of one
//! ticker's trailing price history. Upstream flakiness shows up mostly as an
//! empty answer rather than an error, so both an empty row set and a
//! provider error count as a failed attempt. Failed attempts are logged and
//! retried after a fixed pause, up to a bounded number of attempts; only the
//! final `NoDataAvailable` reaches the caller.
//!
//! Attempts are strictly sequential and the pause blocks the calling thread.
//! The fetcher holds no mutable state between calls.

use crate::config::{ConfigError, FetcherConfig};
use crate::data::provider::DataProvider;
use crate::data::series::PriceSeries;
use crate::data::ticker::{EmptyTicker, TickerSymbol};
use crate::data::window::{DateWindow, DEFAULT_WINDOW_DAYS};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors that cross the fetcher boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt came back empty or failed. Terminal for this request.
    #[error("no data returned for ticker '{ticker}' after {attempts} attempts")]
    NoDataAvailable { ticker: String, attempts: u32 },

    #[error("invalid ticker: {0}")]
    InvalidTicker(#[from] EmptyTicker),

    #[error("window must span 1 day up to the calendar's range, got {days} days")]
    InvalidWindow { days: u32 },

    #[error("at least one attempt is required")]
    InvalidRetryCount,
}

impl FetchError {
    /// True when the request was well-formed but nothing came back, which a
    /// caller should present as "try a different ticker".
    pub fn is_no_data(&self) -> bool {
        matches!(self, FetchError::NoDataAvailable { .. })
    }
}

/// Bounded, fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between consecutive attempts. Not applied after the last one.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BACKOFF)
    }
}

/// Blocks between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Fetches a trailing window of daily prices with bounded retries.
pub struct Fetcher<P, S = ThreadSleeper> {
    provider: P,
    policy: RetryPolicy,
    window_days: u32,
    auto_adjust: bool,
    sleeper: S,
}

impl<P: DataProvider> Fetcher<P> {
    /// Fetcher with default settings: 365-day window, 3 attempts, 2 s backoff.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
            window_days: DEFAULT_WINDOW_DAYS,
            auto_adjust: true,
            sleeper: ThreadSleeper,
        }
    }

    /// Fetcher driven by an explicit config, which is validated first.
    pub fn from_config(provider: P, config: &FetcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            provider,
            policy: config.retry_policy()?,
            window_days: config.window_days,
            auto_adjust: config.auto_adjust,
            sleeper: ThreadSleeper,
        })
    }
}

impl<P: DataProvider, S: Sleeper> Fetcher<P, S> {
    /// Replace how backoff pauses are taken.
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> Fetcher<P, S2> {
        Fetcher {
            provider: self.provider,
            policy: self.policy,
            window_days: self.window_days,
            auto_adjust: self.auto_adjust,
            sleeper,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    pub fn with_auto_adjust(mut self, auto_adjust: bool) -> Self {
        self.auto_adjust = auto_adjust;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Fetch using the configured window and retry count.
    pub fn fetch(&self, ticker: &TickerSymbol) -> Result<PriceSeries, FetchError> {
        self.fetch_with(ticker, self.window_days, self.policy.max_attempts)
    }

    /// Caller-facing entry point taking a raw ticker string.
    pub fn fetch_stock_data(
        &self,
        ticker: &str,
        window_days: u32,
        max_retries: u32,
    ) -> Result<PriceSeries, FetchError> {
        let ticker = TickerSymbol::new(ticker)?;
        self.fetch_with(&ticker, window_days, max_retries)
    }

    /// Fetch `window_days` trailing from today with up to `max_attempts` attempts.
    pub fn fetch_with(
        &self,
        ticker: &TickerSymbol,
        window_days: u32,
        max_attempts: u32,
    ) -> Result<PriceSeries, FetchError> {
        let window = match DateWindow::trailing_from_today(window_days) {
            Some(window) if window_days > 0 => window,
            _ => return Err(FetchError::InvalidWindow { days: window_days }),
        };
        self.fetch_window(ticker, window, max_attempts)
    }

    /// The retry loop over an already resolved window.
    #[instrument(
        skip(self),
        fields(provider = self.provider.name(), start = %window.start, end = %window.end)
    )]
    pub fn fetch_window(
        &self,
        ticker: &TickerSymbol,
        window: DateWindow,
        max_attempts: u32,
    ) -> Result<PriceSeries, FetchError> {
        if max_attempts == 0 {
            return Err(FetchError::InvalidRetryCount);
        }

        for attempt in 1..=max_attempts {
            match self
                .provider
                .fetch_daily_prices(ticker.as_str(), window.start, window.end)
            {
                Ok(rows) => {
                    let series = PriceSeries::from_rows(ticker.clone(), rows);
                    if !series.is_empty() {
                        info!(attempt, rows = series.len(), "fetched price series");
                        return Ok(if self.auto_adjust {
                            series.auto_adjusted()
                        } else {
                            series
                        });
                    }
                    warn!(attempt, max_attempts, "provider returned no rows");
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "provider request failed");
                }
            }

            if attempt < max_attempts {
                debug!(backoff = ?self.policy.backoff, "waiting before next attempt");
                self.sleeper.sleep(self.policy.backoff);
            }
        }

        Err(FetchError::NoDataAvailable {
            ticker: ticker.to_string(),
            attempts: max_attempts,
        })
    }
}

/// One-shot fetch with all defaults: 365-day trailing window, 3 attempts,
/// 2 s fixed backoff.
pub fn fetch_stock_data<P: DataProvider>(
    provider: P,
    ticker: &str,
) -> Result<PriceSeries, FetchError> {
    Fetcher::new(provider).fetch_stock_data(
        ticker,
        DEFAULT_WINDOW_DAYS,
        RetryPolicy::DEFAULT_MAX_ATTEMPTS,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataError, DataSource, PriceRow};
    use crate::data::synthetic::SyntheticProvider;
    use chrono::NaiveDate;
    use std::cell::Cell;

    struct NeverCalled;

    impl DataProvider for NeverCalled {
        fn name(&self) -> &str {
            "never"
        }

        fn source(&self) -> DataSource {
            DataSource::Synthetic
        }

        fn fetch_daily_prices(
            &self,
            _symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceRow>, DataError> {
            panic!("provider must not be called");
        }
    }

    #[derive(Default)]
    struct CountingSleeper {
        count: Cell<u32>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&self, _duration: Duration) {
            self.count.set(self.count.get() + 1);
        }
    }

    #[test]
    fn defaults_match_documented_contract() {
        let fetcher = Fetcher::new(SyntheticProvider);
        assert_eq!(fetcher.window_days(), 365);
        assert_eq!(fetcher.policy(), RetryPolicy::default());
        assert_eq!(fetcher.policy().max_attempts, 3);
        assert_eq!(fetcher.policy().backoff, Duration::from_secs(2));
    }

    #[test]
    fn empty_ticker_is_rejected_before_any_request() {
        let err = Fetcher::new(NeverCalled)
            .fetch_stock_data("  ", 365, 3)
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidTicker(_)));
        assert!(!err.is_no_data());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = Fetcher::new(NeverCalled)
            .fetch_stock_data("GOOG", 365, 0)
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidRetryCount));
    }

    #[test]
    fn zero_day_window_is_rejected() {
        let err = Fetcher::new(NeverCalled)
            .fetch_stock_data("GOOG", 0, 3)
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidWindow { days: 0 }));
    }

    #[test]
    fn window_past_calendar_range_is_rejected() {
        let err = Fetcher::new(NeverCalled)
            .fetch_stock_data("GOOG", u32::MAX, 1)
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidWindow { days: u32::MAX }));
    }

    #[test]
    fn new_matches_default_config() {
        let from_config = Fetcher::from_config(NeverCalled, &FetcherConfig::default()).unwrap();
        let new = Fetcher::new(NeverCalled);
        assert_eq!(from_config.policy(), new.policy());
        assert_eq!(from_config.window_days(), new.window_days());
    }

    #[test]
    fn from_config_rejects_unvalidated_backoff() {
        let mut config = FetcherConfig::default();
        config.retry.backoff_secs = -1.0;
        assert!(Fetcher::from_config(NeverCalled, &config).is_err());

        config.retry.backoff_secs = 1e300;
        assert!(Fetcher::from_config(NeverCalled, &config).is_err());
    }

    #[test]
    fn synthetic_source_succeeds_without_pausing() {
        let sleeper = CountingSleeper::default();
        let fetcher = Fetcher::new(SyntheticProvider).with_sleeper(&sleeper);

        let series = fetcher.fetch_stock_data("GOOGL", 30, 3).unwrap();

        assert!(!series.is_empty());
        assert_eq!(series.ticker().as_str(), "GOOGL");
        assert_eq!(sleeper.count.get(), 0);
    }

    #[test]
    fn no_data_error_names_ticker_and_attempts() {
        let err = FetchError::NoDataAvailable {
            ticker: "ZZZZ".into(),
            attempts: 3,
        };
        assert!(err.is_no_data());
        assert_eq!(
            err.to_string(),
            "no data returned for ticker 'ZZZZ' after 3 attempts"
        );
    }
}
