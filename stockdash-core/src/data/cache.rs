//! Parquet cache layer with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema check, row count > 0)
//! - Quarantine for corrupt files ({filename}.quarantined)
//! - Metadata sidecar per symbol (requested range, hash, source)
//!
//! The cache is an optional layer: `CachedProvider` wraps any provider and
//! serves a request from disk only when an earlier fetch covered the whole
//! requested range.

use super::provider::{DataError, DataProvider, DataSource, PriceRow};
use super::window::DateWindow;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Metadata sidecar for a cached symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    /// Date of the first cached row.
    pub start_date: NaiveDate,
    /// Date of the last cached row.
    pub end_date: NaiveDate,
    /// Range that was asked of the provider when these rows were fetched.
    pub requested_start: NaiveDate,
    pub requested_end: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    pub source: String,
    pub cached_at: chrono::NaiveDateTime,
}

/// The Parquet cache.
#[derive(Debug, Clone)]
pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory for a specific symbol: `{cache_dir}/symbol={SYMBOL}/`
    ///
    /// Symbols that could name a path outside the cache dir are rejected.
    fn symbol_dir(&self, symbol: &str) -> Result<PathBuf, DataError> {
        if symbol.is_empty() || symbol.contains(['/', '\\']) || symbol.contains("..") {
            return Err(DataError::ValidationError(format!(
                "symbol '{symbol}' cannot be used as a cache key"
            )));
        }
        Ok(self.cache_dir.join(format!("symbol={symbol}")))
    }

    /// Path to the Parquet file for a symbol+year: `{cache_dir}/symbol={SYMBOL}/{year}.parquet`
    fn year_path(&self, symbol: &str, year: i32) -> Result<PathBuf, DataError> {
        Ok(self.symbol_dir(symbol)?.join(format!("{year}.parquet")))
    }

    /// Path to the metadata sidecar for a symbol.
    fn meta_path(&self, symbol: &str) -> Result<PathBuf, DataError> {
        Ok(self.symbol_dir(symbol)?.join("meta.json"))
    }

    /// Replace the cached rows for a symbol.
    ///
    /// Rows are grouped by year, one Parquet file per year. Partitions left
    /// over from an earlier write are removed. `requested` is the range the
    /// provider was asked for, which is what coverage checks compare against.
    ///
    /// The old `meta.json` is removed before any partition is touched, so a
    /// write that fails halfway leaves the symbol uncached rather than
    /// claiming coverage the partitions no longer hold.
    pub fn write(
        &self,
        symbol: &str,
        rows: &[PriceRow],
        requested: (NaiveDate, NaiveDate),
        source: DataSource,
    ) -> Result<(), DataError> {
        // Provider rows are not guaranteed to be sorted
        let (Some(first_date), Some(last_date)) = (
            rows.iter().map(|r| r.date).min(),
            rows.iter().map(|r| r.date).max(),
        ) else {
            return Err(DataError::CacheError("no rows to cache".into()));
        };

        let sym_dir = self.symbol_dir(symbol)?;
        let meta_path = self.meta_path(symbol)?;
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;
        match fs::remove_file(&meta_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DataError::CacheError(format!("meta remove: {e}"))),
        }

        // Group rows by year
        let mut by_year: BTreeMap<i32, Vec<&PriceRow>> = BTreeMap::new();
        for row in rows {
            by_year.entry(row.date.year()).or_default().push(row);
        }

        let mut written = HashSet::new();
        for (year, year_rows) in &by_year {
            let df = rows_to_dataframe(year_rows)?;
            let path = self.year_path(symbol, *year)?;
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&df, &tmp_path)?;

            // Atomic rename
            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::CacheError(format!("atomic rename failed: {e}"))
            })?;
            written.insert(path);
        }

        self.remove_stale_partitions(&sym_dir, &written)?;

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            start_date: first_date,
            end_date: last_date,
            requested_start: requested.0,
            requested_end: requested.1,
            row_count: rows.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(rows)
                    .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            source: source.label().to_string(),
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;
        fs::rename(&meta_tmp, &meta_path).map_err(|e| {
            let _ = fs::remove_file(&meta_tmp);
            DataError::CacheError(format!("meta rename: {e}"))
        })?;

        Ok(())
    }

    fn remove_stale_partitions(
        &self,
        sym_dir: &Path,
        keep: &HashSet<PathBuf>,
    ) -> Result<(), DataError> {
        let entries =
            fs::read_dir(sym_dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("parquet") && !keep.contains(&path)
            {
                fs::remove_file(&path)
                    .map_err(|e| DataError::CacheError(format!("remove stale partition: {e}")))?;
            }
        }
        Ok(())
    }

    /// Load all cached rows for a symbol, sorted by date ascending.
    pub fn load(&self, symbol: &str) -> Result<Vec<PriceRow>, DataError> {
        let sym_dir = self.symbol_dir(symbol)?;
        if !sym_dir.exists() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        let mut all_rows = Vec::new();

        let entries =
            fs::read_dir(&sym_dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();

            // Skip non-parquet files (meta.json, .quarantined, etc)
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path) {
                Ok(rows) => all_rows.extend(rows),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    warn!(path = %path.display(), error = %e, "quarantining corrupt cache file");
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        if all_rows.is_empty() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        all_rows.sort_by_key(|r| r.date);
        Ok(all_rows)
    }

    /// Cached rows for a symbol with dates in `start..=end`.
    pub fn load_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        let window = DateWindow { start, end };
        Ok(self
            .load(symbol)?
            .into_iter()
            .filter(|r| window.contains(r.date))
            .collect())
    }

    /// Check if a symbol has cached data and return its metadata.
    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let meta_path = self.meta_path(symbol).ok()?;
        let content = fs::read_to_string(meta_path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Check if an earlier fetch for a symbol covered the requested range.
    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.get_meta(symbol) {
            None => CoverageResult::NotCached,
            Some(meta) => {
                if meta.requested_start <= start && meta.requested_end >= end {
                    CoverageResult::FullyCovered
                } else {
                    CoverageResult::PartiallyCovered {
                        cached_start: meta.requested_start,
                        cached_end: meta.requested_end,
                    }
                }
            }
        }
    }

    /// Every symbol directory in the cache, sorted by symbol.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, DataError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }

        let dir = fs::read_dir(&self.cache_dir)
            .map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(symbol) = name.strip_prefix("symbol=") else {
                continue;
            };

            entries.push(CacheEntry {
                symbol: symbol.to_string(),
                meta: self.get_meta(symbol),
                size_bytes: dir_size(&entry.path()),
                path: entry.path(),
            });
        }

        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(entries)
    }

    /// Entries whose metadata says they were cached before `cutoff`.
    ///
    /// Entries without readable metadata are never considered stale.
    pub fn stale_entries(
        &self,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<Vec<CacheEntry>, DataError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.meta.as_ref().is_some_and(|m| m.cached_at < cutoff))
            .collect())
    }

    /// Delete one symbol's cache directory.
    pub fn remove(&self, symbol: &str) -> Result<(), DataError> {
        fs::remove_dir_all(self.symbol_dir(symbol)?)
            .map_err(|e| DataError::CacheError(format!("remove {symbol}: {e}")))
    }
}

/// One symbol directory found in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub symbol: String,
    pub meta: Option<CacheMeta>,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// How well the cache covers the requested date range.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

/// Provider decorator that reads through a `ParquetCache`.
///
/// Fully covered ranges are answered from disk. Anything else goes to the
/// inner provider; a non-empty answer is written back. Write failures are
/// logged and never fail the fetch.
pub struct CachedProvider<P> {
    inner: P,
    cache: ParquetCache,
}

impl<P: DataProvider> CachedProvider<P> {
    pub fn new(inner: P, cache: ParquetCache) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &ParquetCache {
        &self.cache
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: DataProvider> DataProvider for CachedProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn source(&self) -> DataSource {
        self.inner.source()
    }

    fn fetch_daily_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        if self.cache.covers_range(symbol, start, end) == CoverageResult::FullyCovered {
            match self.cache.load_range(symbol, start, end) {
                Ok(rows) if !rows.is_empty() => {
                    debug!(symbol, rows = rows.len(), "served from cache");
                    return Ok(rows);
                }
                Ok(_) => debug!(symbol, "cache covers range but holds no rows in it"),
                Err(e) => warn!(symbol, error = %e, "cache read failed, fetching upstream"),
            }
        }

        let rows = self.inner.fetch_daily_prices(symbol, start, end)?;
        if !rows.is_empty() {
            if let Err(e) = self
                .cache
                .write(symbol, &rows, (start, end), self.inner.source())
            {
                warn!(symbol, error = %e, "failed to write cache");
            }
        }
        Ok(rows)
    }
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Convert rows to a Polars DataFrame.
fn rows_to_dataframe(rows: &[&PriceRow]) -> Result<DataFrame, DataError> {
    // NaiveDate::default() is 1970-01-01
    let epoch = NaiveDate::default();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();
    let adj_closes: Vec<f64> = rows.iter().map(|r| r.adj_close).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("adj_close".into(), adj_closes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

/// Load a Parquet file and validate its integrity.
fn load_and_validate_parquet(path: &Path) -> Result<Vec<PriceRow>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }

    let expected_cols = ["date", "open", "high", "low", "close", "volume", "adj_close"];
    for col_name in &expected_cols {
        if df.column(col_name).is_err() {
            return Err(DataError::ValidationError(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_rows(&df)
}

/// Convert a DataFrame back to rows.
fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<PriceRow>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));

    let dates = df.column("date").map_err(map_err)?;
    let opens = df.column("open").map_err(map_err)?;
    let highs = df.column("high").map_err(map_err)?;
    let lows = df.column("low").map_err(map_err)?;
    let closes = df.column("close").map_err(map_err)?;
    let volumes = df.column("volume").map_err(map_err)?;
    let adj_closes = df.column("adj_close").map_err(map_err)?;

    let date_ca = dates
        .date()
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?;
    let open_ca = opens
        .f64()
        .map_err(|e| DataError::ParquetError(format!("open column type: {e}")))?;
    let high_ca = highs
        .f64()
        .map_err(|e| DataError::ParquetError(format!("high column type: {e}")))?;
    let low_ca = lows
        .f64()
        .map_err(|e| DataError::ParquetError(format!("low column type: {e}")))?;
    let close_ca = closes
        .f64()
        .map_err(|e| DataError::ParquetError(format!("close column type: {e}")))?;
    let vol_ca = volumes
        .u64()
        .map_err(|e| DataError::ParquetError(format!("volume column type: {e}")))?;
    let adj_ca = adj_closes
        .f64()
        .map_err(|e| DataError::ParquetError(format!("adj_close column type: {e}")))?;

    let epoch = NaiveDate::default();
    let n = df.height();
    let mut rows = Vec::with_capacity(n);

    for i in 0..n {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        let date = epoch + chrono::Duration::days(date_days as i64);

        rows.push(PriceRow {
            date,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
            adj_close: adj_ca.get(i).unwrap_or(f64::NAN),
        });
    }

    Ok(rows)
}
