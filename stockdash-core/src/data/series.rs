//! Canonical daily price series for one ticker.

use super::provider::PriceRow;
use super::ticker::TickerSymbol;
use chrono::NaiveDate;
use serde::Serialize;

/// Rows for one ticker, sorted ascending by date with no duplicate dates.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    ticker: TickerSymbol,
    rows: Vec<PriceRow>,
}

impl PriceSeries {
    /// Canonicalize provider rows: stable sort by date, then drop repeated
    /// dates keeping the first occurrence.
    pub fn from_rows(ticker: TickerSymbol, mut rows: Vec<PriceRow>) -> Self {
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
        Self { ticker, rows }
    }

    pub fn ticker(&self) -> &TickerSymbol {
        &self.ticker
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<PriceRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&PriceRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&PriceRow> {
        self.rows.last()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last().map(|r| r.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    /// Dividend/split-adjusted view: open, high, low and close are scaled by
    /// `adj_close / close`. Rows without a finite positive factor are kept as-is.
    pub fn auto_adjusted(mut self) -> Self {
        for row in &mut self.rows {
            let factor = row.adj_close / row.close;
            if !factor.is_finite() || factor <= 0.0 {
                continue;
            }
            row.open *= factor;
            row.high *= factor;
            row.low *= factor;
            row.close = row.adj_close;
        }
        self
    }

    /// Headline numbers for display. `None` for an empty series.
    pub fn summary(&self) -> Option<SeriesSummary> {
        let first = self.first()?;
        let last = self.last()?;

        let high = self
            .rows
            .iter()
            .map(|r| r.high)
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::max);
        let low = self
            .rows
            .iter()
            .map(|r| r.low)
            .filter(|v| v.is_finite())
            .fold(f64::NAN, f64::min);

        let change_pct = if first.close.is_finite() && first.close != 0.0 {
            (last.close - first.close) / first.close * 100.0
        } else {
            f64::NAN
        };

        Some(SeriesSummary {
            ticker: self.ticker.to_string(),
            rows: self.rows.len(),
            first_date: first.date,
            last_date: last.date,
            first_close: first.close,
            last_close: last.close,
            change_pct,
            high,
            low,
        })
    }
}

/// Headline numbers for a fetched series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub ticker: String,
    pub rows: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub first_close: f64,
    pub last_close: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
}
