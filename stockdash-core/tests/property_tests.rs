//! Property tests for fetcher and series invariants.
//!
//! Uses proptest to verify:
//! 1. Call count: for any mix of rows, empty answers and errors, the provider
//!    is asked min(first success, max attempts) times
//! 2. Pauses: always one fewer than the number of calls
//! 3. Series shape: any input row order yields ascending, unique dates

use chrono::{Duration as Days, NaiveDate};
use proptest::prelude::*;
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use stockdash_core::data::{
    DataError, DataProvider, DataSource, PriceRow, PriceSeries, TickerSymbol,
};
use stockdash_core::{FetchError, Fetcher, Sleeper};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Rows,
    Empty,
    Error,
}

struct Replay {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<u32>,
}

impl DataProvider for Replay {
    fn name(&self) -> &str {
        "replay"
    }

    fn source(&self) -> DataSource {
        DataSource::Synthetic
    }

    fn fetch_daily_prices(
        &self,
        _symbol: &str,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        *self.calls.lock().unwrap() += 1;
        match self.script.lock().unwrap().pop_front() {
            Some(Step::Rows) => Ok(vec![PriceRow::new(start, 1.0, 1.0, 1.0, 1.0, 1)]),
            Some(Step::Error) => Err(DataError::RateLimited {
                retry_after_secs: 60,
            }),
            Some(Step::Empty) | None => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
struct CountingSleeper(Cell<u32>);

impl Sleeper for CountingSleeper {
    fn sleep(&self, _duration: Duration) {
        self.0.set(self.0.get() + 1);
    }
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::Rows), Just(Step::Empty), Just(Step::Error)]
}

fn arb_script() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(arb_step(), 0..8)
}

fn arb_rows() -> impl Strategy<Value = Vec<PriceRow>> {
    prop::collection::vec((0i64..60, 1.0..500.0_f64), 0..40).prop_map(|cells| {
        cells
            .into_iter()
            .map(|(offset, close)| {
                PriceRow::new(
                    base_date() + Days::days(offset),
                    close,
                    close,
                    close,
                    close,
                    1_000,
                )
            })
            .collect()
    })
}

// ── 1 & 2. Call and pause counts ─────────────────────────────────────

proptest! {
    #[test]
    fn calls_and_pauses_follow_first_success(
        script in arb_script(),
        max_attempts in 1u32..6,
    ) {
        let first_success = script.iter().position(|s| *s == Step::Rows).map(|i| i as u32 + 1);
        let provider = Replay {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        };
        let sleeper = CountingSleeper::default();
        let fetcher = Fetcher::new(&provider).with_sleeper(&sleeper);

        let result = fetcher.fetch_stock_data("GOOG", 30, max_attempts);
        let calls = *provider.calls.lock().unwrap();

        match first_success {
            Some(n) if n <= max_attempts => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(calls, n);
            }
            _ => {
                let is_exhausted = matches!(
                    result,
                    Err(FetchError::NoDataAvailable { attempts, .. }) if attempts == max_attempts
                );
                prop_assert!(is_exhausted);
                prop_assert_eq!(calls, max_attempts);
            }
        }
        prop_assert_eq!(sleeper.0.get(), calls - 1);
    }
}

// ── 3. Series shape ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn series_dates_are_strictly_ascending(rows in arb_rows()) {
        let input_dates: std::collections::BTreeSet<NaiveDate> =
            rows.iter().map(|r| r.date).collect();
        let series = PriceSeries::from_rows(TickerSymbol::new("SPY").unwrap(), rows);

        for pair in series.rows().windows(2) {
            prop_assert!(pair[0].date < pair[1].date);
        }
        // Deduplication never drops a date entirely.
        prop_assert_eq!(series.len(), input_dates.len());
    }

    #[test]
    fn duplicate_dates_keep_first_occurrence(
        first in 1.0..500.0_f64,
        second in 1.0..500.0_f64,
    ) {
        let rows = vec![
            PriceRow::new(base_date(), first, first, first, first, 1),
            PriceRow::new(base_date(), second, second, second, second, 2),
        ];
        let series = PriceSeries::from_rows(TickerSymbol::new("SPY").unwrap(), rows);
        prop_assert_eq!(series.len(), 1);
        prop_assert_eq!(series.rows()[0].close, first);
    }
}
