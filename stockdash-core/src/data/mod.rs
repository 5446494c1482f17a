//! Data layer: provider abstraction, concrete sources, caching, CSV I/O.

pub mod cache;
pub mod csv_file;
pub mod provider;
pub mod series;
pub mod synthetic;
pub mod ticker;
pub mod window;
pub mod yahoo;

pub use cache::{CacheEntry, CacheMeta, CachedProvider, CoverageResult, ParquetCache};
pub use csv_file::{export_series, CsvProvider};
pub use provider::{DataError, DataProvider, DataSource, PriceRow};
pub use series::{PriceSeries, SeriesSummary};
pub use synthetic::SyntheticProvider;
pub use ticker::{EmptyTicker, TickerSymbol};
pub use window::{DateWindow, DEFAULT_WINDOW_DAYS};
pub use yahoo::YahooProvider;
