//! Synthetic data provider for offline demos and tests.
//!
//! Produces a simple random walk from a starting price of 100.0, weekdays
//! only. The RNG is seeded from the symbol, so the same symbol and range always
//! yield the same rows. These are clearly fake and tagged as synthetic.

use super::provider::{DataError, DataProvider, DataSource, PriceRow};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }
}

/// Generate rows for every weekday in `start..=end`.
pub fn generate_rows(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<PriceRow> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut rows = Vec::new();
    let mut price = 100.0_f64;
    let mut current = start;

    while current <= end {
        if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            current += Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        rows.push(PriceRow::new(current, open, high, low, close, volume));

        price = close;
        current += Duration::days(1);
    }

    rows
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn source(&self) -> DataSource {
        DataSource::Synthetic
    }

    fn fetch_daily_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        Ok(generate_rows(symbol, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn synthetic_data_is_deterministic() {
        let a = generate_rows("SPY", d(2024, 1, 1), d(2024, 1, 31));
        let b = generate_rows("SPY", d(2024, 1, 1), d(2024, 1, 31));
        assert_eq!(a, b);
    }

    #[test]
    fn different_symbols_get_different_data() {
        let spy = generate_rows("SPY", d(2024, 1, 1), d(2024, 1, 31));
        let qqq = generate_rows("QQQ", d(2024, 1, 1), d(2024, 1, 31));
        assert_eq!(spy.len(), qqq.len());
        assert_ne!(spy[0].close, qqq[0].close);
    }

    #[test]
    fn skips_weekends_and_keeps_bars_consistent() {
        let rows = generate_rows("GOOG", d(2024, 1, 1), d(2024, 1, 14));
        assert_eq!(rows.len(), 10);
        for r in &rows {
            assert!(!matches!(r.date.weekday(), Weekday::Sat | Weekday::Sun));
            assert!(r.high >= r.open.max(r.close));
            assert!(r.low <= r.open.min(r.close));
        }
    }
}
