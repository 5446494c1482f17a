//! CSV export and import of daily price series.
//!
//! Layout matches the `{TICKER}_stock_data.csv` files the dashboard has always
//! written: `Date,Open,High,Low,Close,Adj Close,Volume` with ISO dates.

use super::provider::{DataError, DataProvider, DataSource, PriceRow};
use super::series::PriceSeries;
use super::ticker::TickerSymbol;
use super::window::DateWindow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct CsvRecord {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open")]
    open: Option<f64>,
    #[serde(rename = "High")]
    high: Option<f64>,
    #[serde(rename = "Low")]
    low: Option<f64>,
    #[serde(rename = "Close")]
    close: Option<f64>,
    #[serde(rename = "Adj Close", default)]
    adj_close: Option<f64>,
    #[serde(rename = "Volume")]
    volume: Option<u64>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl From<&PriceRow> for CsvRecord {
    fn from(row: &PriceRow) -> Self {
        Self {
            date: row.date,
            open: finite(row.open),
            high: finite(row.high),
            low: finite(row.low),
            close: finite(row.close),
            adj_close: finite(row.adj_close),
            volume: Some(row.volume),
        }
    }
}

impl From<CsvRecord> for PriceRow {
    fn from(rec: CsvRecord) -> Self {
        let close = rec.close.unwrap_or(f64::NAN);
        PriceRow {
            date: rec.date,
            open: rec.open.unwrap_or(f64::NAN),
            high: rec.high.unwrap_or(f64::NAN),
            low: rec.low.unwrap_or(f64::NAN),
            close,
            volume: rec.volume.unwrap_or(0),
            adj_close: rec.adj_close.unwrap_or(close),
        }
    }
}

/// `{TICKER}_stock_data.csv`
pub fn export_filename(ticker: &TickerSymbol) -> String {
    format!("{ticker}_stock_data.csv")
}

/// Write a series as CSV. Blank cells stand for missing prices.
pub fn write_series_csv(path: &Path, series: &PriceSeries) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| DataError::CsvError(format!("create {}: {e}", path.display())))?;
    for row in series.rows() {
        writer
            .serialize(CsvRecord::from(row))
            .map_err(|e| DataError::CsvError(format!("write row {}: {e}", row.date)))?;
    }
    writer
        .flush()
        .map_err(|e| DataError::CsvError(format!("flush {}: {e}", path.display())))?;
    Ok(())
}

/// Write `{dir}/{TICKER}_stock_data.csv`, creating `dir` if needed.
pub fn export_series(dir: &Path, series: &PriceSeries) -> Result<PathBuf, DataError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| DataError::CsvError(format!("create dir {}: {e}", dir.display())))?;
    let path = dir.join(export_filename(series.ticker()));
    write_series_csv(&path, series)?;
    Ok(path)
}

/// Read every row of a price CSV, in file order.
pub fn read_rows_csv(path: &Path) -> Result<Vec<PriceRow>, DataError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| DataError::CsvError(format!("open {}: {e}", path.display())))?;
    reader
        .deserialize::<CsvRecord>()
        .map(|rec| {
            rec.map(PriceRow::from)
                .map_err(|e| DataError::CsvError(format!("{}: {e}", path.display())))
        })
        .collect()
}

/// Provider backed by a directory of exported CSV files.
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}_stock_data.csv"))
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn source(&self) -> DataSource {
        DataSource::CsvImport
    }

    fn fetch_daily_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let window = DateWindow { start, end };
        let rows = read_rows_csv(&path)?;
        Ok(rows
            .into_iter()
            .filter(|r| window.contains(r.date))
            .collect())
    }
}
