//! StockDash CLI: fetch daily prices, export CSV, and manage the cache.
//!
//! Commands:
//! - `fetch`: fetch a trailing window for one or more tickers and print a summary
//! - `cache status`: report cache size, symbol count, date ranges
//! - `cache clean`: remove symbols not refreshed recently
//! - `config`: print the effective configuration as TOML

use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use stockdash_core::data::{export_series, DataProvider, ParquetCache, PriceSeries, SeriesSummary};
use stockdash_core::{build_provider, Fetcher, FetcherConfig, SourceConfig};
use tracing::{debug, info};

/// Exit code for "the ticker produced no data", distinct from hard failures.
const EXIT_NO_DATA: i32 = 2;

#[derive(Parser)]
#[command(
    name = "stockdash",
    about = "StockDash CLI: retrying daily price fetcher with CSV export"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence when set).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the trailing price window for each ticker, one after another.
    Fetch {
        /// Tickers to fetch (e.g., GOOG AAPL MSFT). Case is preserved.
        #[arg(required = true)]
        tickers: Vec<String>,

        #[command(flatten)]
        config: ConfigArgs,

        /// Write `{TICKER}_stock_data.csv` into this directory.
        #[arg(long)]
        export: Option<PathBuf>,

        /// Print summaries as JSON lines instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the effective configuration (file plus overrides) as TOML.
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cache size, symbol count, and date ranges.
    Status {
        /// Cache directory.
        #[arg(long, default_value = ".cache")]
        cache_dir: PathBuf,
    },
    /// Remove cached symbols not refreshed within the given number of days.
    Clean {
        /// Remove symbols cached more than this many days ago.
        #[arg(long)]
        unused_days: u64,

        /// Cache directory.
        #[arg(long, default_value = ".cache")]
        cache_dir: PathBuf,

        /// Actually delete (without this flag, only previews what would be removed).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Yahoo,
    Csv,
    Synthetic,
}

/// Config file plus per-field overrides.
#[derive(Args)]
struct ConfigArgs {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trailing window length in calendar days.
    #[arg(long)]
    window_days: Option<u32>,

    /// Total attempts per ticker, including the first.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Fixed pause between attempts, in seconds.
    #[arg(long)]
    backoff_secs: Option<f64>,

    /// Data source.
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Directory of `{TICKER}_stock_data.csv` files (with `--source csv`).
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Enable the Parquet cache in this directory.
    #[arg(long, conflicts_with = "no_cache")]
    cache_dir: Option<PathBuf>,

    /// Disable the cache even if the config file enables it.
    #[arg(long, default_value_t = false)]
    no_cache: bool,

    /// Return raw (unadjusted) prices.
    #[arg(long, default_value_t = false)]
    raw: bool,
}

impl ConfigArgs {
    /// Load the config file (or defaults) and apply command-line overrides.
    fn resolve(self) -> Result<FetcherConfig> {
        let mut config = match &self.config {
            Some(path) => FetcherConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => FetcherConfig::default(),
        };

        if let Some(days) = self.window_days {
            config.window_days = days;
        }
        if let Some(attempts) = self.max_retries {
            config.retry.max_attempts = attempts;
        }
        if let Some(secs) = self.backoff_secs {
            config.retry.backoff_secs = secs;
        }
        if self.raw {
            config.auto_adjust = false;
        }

        match (self.source, self.csv_dir) {
            (Some(SourceKind::Csv), Some(dir)) | (None, Some(dir)) => {
                config.source = SourceConfig::Csv { dir };
            }
            (Some(SourceKind::Csv), None) => {
                if !matches!(config.source, SourceConfig::Csv { .. }) {
                    bail!("--source csv requires --csv-dir");
                }
            }
            (Some(SourceKind::Yahoo), None) => config.source = SourceConfig::Yahoo,
            (Some(SourceKind::Synthetic), None) => config.source = SourceConfig::Synthetic,
            (Some(_), Some(_)) => bail!("--csv-dir only applies to --source csv"),
            (None, None) => {}
        }

        if let Some(dir) = self.cache_dir {
            config.cache.enabled = true;
            config.cache.dir = dir;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Fetch {
            tickers,
            config,
            export,
            json,
        } => run_fetch(&tickers, config.resolve()?, export.as_deref(), json),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Clean {
                unused_days,
                cache_dir,
                confirm,
            } => run_cache_clean(&cache_dir, unused_days, confirm),
        },
        Commands::Config { config } => {
            print!("{}", config.resolve()?.to_toml()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "stockdash=debug" } else { "stockdash=info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default.to_string());
    let env_filter =
        tracing_subscriber::EnvFilter::try_new(filter).context("invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run_fetch(
    tickers: &[String],
    config: FetcherConfig,
    export: Option<&Path>,
    json: bool,
) -> Result<()> {
    let provider = build_provider(&config).context("building data source")?;
    debug!(provider = provider.name(), source = ?config.source, "data source ready");
    let fetcher = Fetcher::from_config(provider, &config).context("invalid configuration")?;

    let mut no_data = 0usize;
    let mut failed = 0usize;

    for ticker in tickers {
        let series = match fetcher.fetch_stock_data(
            ticker,
            config.window_days,
            config.retry.max_attempts,
        ) {
            Ok(series) => series,
            Err(e) if e.is_no_data() => {
                eprintln!("{e}. Try a different ticker.");
                no_data += 1;
                continue;
            }
            Err(e) => {
                eprintln!("Error for {ticker}: {e}");
                failed += 1;
                continue;
            }
        };

        print_series(&series, json)?;

        if let Some(dir) = export {
            let path = export_series(dir, &series)
                .with_context(|| format!("exporting {ticker} to {}", dir.display()))?;
            info!(path = %path.display(), "exported CSV");
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    if no_data > 0 {
        std::process::exit(EXIT_NO_DATA);
    }
    Ok(())
}

fn print_series(series: &PriceSeries, json: bool) -> Result<()> {
    let Some(summary) = series.summary() else {
        return Ok(());
    };
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(s: &SeriesSummary) {
    println!();
    println!("=== {} ===", s.ticker);
    println!("Period:     {} to {}", s.first_date, s.last_date);
    println!("Rows:       {}", s.rows);
    println!("First:      {:.2}", s.first_close);
    println!("Last:       {:.2}", s.last_close);
    println!("Change:     {:+.2}%", s.change_pct);
    println!("High / Low: {:.2} / {:.2}", s.high, s.low);
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ParquetCache::new(cache_dir);
    let entries = cache.entries().context("reading cache")?;
    if entries.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();

    println!("Cache: {}", cache_dir.display());
    println!("Symbols: {}", entries.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<8} {:<25} {:<10} {:<14} {:>10}",
        "Symbol", "Date Range", "Rows", "Source", "Size"
    );
    println!("{}", "-".repeat(71));
    for entry in &entries {
        let (range, rows, source) = match &entry.meta {
            Some(meta) => (
                format!("{} to {}", meta.start_date, meta.end_date),
                format!("{} rows", meta.row_count),
                meta.source.clone(),
            ),
            None => ("(no meta)".into(), "-".into(), "-".into()),
        };
        println!(
            "{:<8} {:<25} {:<10} {:<14} {:>10}",
            entry.symbol,
            range,
            rows,
            source,
            format_size(entry.size_bytes)
        );
    }

    Ok(())
}

fn run_cache_clean(cache_dir: &Path, unused_days: u64, confirm: bool) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cutoff = clean_cutoff(chrono::Local::now().naive_local(), unused_days)?;

    let cache = ParquetCache::new(cache_dir);
    let stale = cache.stale_entries(cutoff).context("reading cache")?;

    if stale.is_empty() {
        println!("No symbols older than {unused_days} days to remove.");
        return Ok(());
    }

    println!(
        "Found {} symbol(s) not refreshed in {unused_days} days:",
        stale.len()
    );
    for entry in &stale {
        println!("  {} ({})", entry.symbol, format_size(entry.size_bytes));
    }

    if !confirm {
        println!();
        println!("Dry run. Pass --confirm to actually delete.");
        return Ok(());
    }

    for entry in &stale {
        cache
            .remove(&entry.symbol)
            .with_context(|| format!("removing {}", entry.symbol))?;
        println!("Removed: {}", entry.symbol);
    }

    println!("Done. Removed {} symbol(s).", stale.len());
    Ok(())
}

/// `now - unused_days`, rejecting spans the calendar cannot represent.
fn clean_cutoff(now: NaiveDateTime, unused_days: u64) -> Result<NaiveDateTime> {
    i64::try_from(unused_days)
        .ok()
        .and_then(TimeDelta::try_days)
        .and_then(|span| now.checked_sub_signed(span))
        .with_context(|| format!("--unused-days {unused_days} is out of range"))
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stockdash").chain(args.iter().copied())).unwrap()
    }

    fn fetch_config(args: &[&str]) -> Result<FetcherConfig> {
        match parse(args).command {
            Commands::Fetch { config, .. } => config.resolve(),
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn fetch_defaults_match_library_defaults() {
        let config = fetch_config(&["fetch", "GOOG"]).unwrap();
        assert_eq!(config, FetcherConfig::default());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config = fetch_config(&[
            "fetch",
            "GOOG",
            "--window-days",
            "90",
            "--max-retries",
            "5",
            "--backoff-secs",
            "0.5",
            "--source",
            "synthetic",
            "--cache-dir",
            "/tmp/sd",
            "--raw",
        ])
        .unwrap();

        assert_eq!(config.window_days, 90);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_secs, 0.5);
        assert_eq!(config.source, SourceConfig::Synthetic);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/sd"));
        assert!(!config.auto_adjust);
    }

    #[test]
    fn csv_dir_selects_csv_source() {
        let config = fetch_config(&["fetch", "GOOG", "--csv-dir", "exports"]).unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Csv {
                dir: PathBuf::from("exports")
            }
        );
    }

    #[test]
    fn csv_source_without_dir_is_rejected() {
        assert!(fetch_config(&["fetch", "GOOG", "--source", "csv"]).is_err());
    }

    #[test]
    fn zero_retries_is_rejected() {
        assert!(fetch_config(&["fetch", "GOOG", "--max-retries", "0"]).is_err());
    }

    #[test]
    fn config_file_is_loaded_then_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockdash.toml");
        std::fs::write(
            &path,
            "window_days = 30\n[cache]\nenabled = true\ndir = \"c\"\n",
        )
        .unwrap();

        let config = fetch_config(&[
            "fetch",
            "GOOG",
            "--config",
            path.to_str().unwrap(),
            "--no-cache",
        ])
        .unwrap();

        assert_eq!(config.window_days, 30);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn fetch_requires_a_ticker() {
        assert!(Cli::try_parse_from(["stockdash", "fetch"]).is_err());
    }

    #[test]
    fn clean_cutoff_subtracts_days() {
        let now = chrono::NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let cutoff = clean_cutoff(now, 9).unwrap();
        assert_eq!(cutoff.date(), chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn clean_cutoff_rejects_huge_spans() {
        let now = chrono::Local::now().naive_local();
        assert!(clean_cutoff(now, 200_000_000_000_000).is_err());
        assert!(clean_cutoff(now, 4_000_000_000).is_err());
        assert!(clean_cutoff(now, u64::MAX).is_err());
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
