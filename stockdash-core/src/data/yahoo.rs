//! Yahoo Finance data provider.
//!
//! Fetches daily OHLCV rows from Yahoo's v8 chart API. One call to
//! `fetch_daily_prices` is exactly one HTTP round trip; retrying is the
//! fetcher's job.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. It also answers unknown symbols and flaky moments alike with an
//! empty chart, so "nothing found" is reported as an empty row set rather than
//! an error.

use super::provider::{DataError, DataProvider, DataSource, PriceRow};
use crate::config::HttpConfig;
use chrono::{Duration, NaiveDate, NaiveTime};
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds (e.g. 39600 for Sydney in summer).
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    /// Build a provider with its own HTTP client from explicit settings.
    pub fn new(http: &HttpConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(http.timeout())
            .user_agent(http.user_agent.as_str())
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, http.base_url.clone()))
    }

    /// Use a caller-supplied client (shared session, proxy, custom TLS).
    pub fn with_client(client: reqwest::blocking::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Build the chart API URL for a symbol and inclusive date range.
    fn chart_url(
        base_url: &str,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Url, DataError> {
        let start_ts = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive upstream
        let end_ts = (end + Duration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let mut url = Url::parse(base_url)
            .map_err(|e| DataError::Other(format!("invalid base url '{base_url}': {e}")))?;
        url.path_segments_mut()
            .map_err(|_| DataError::Other(format!("base url '{base_url}' cannot take a path")))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        url.query_pairs_mut()
            .append_pair("period1", &start_ts.to_string())
            .append_pair("period2", &end_ts.to_string())
            .append_pair("interval", "1d")
            .append_pair("includeAdjustedClose", "true");
        Ok(url)
    }

    /// Parse the chart API response into rows. No data is `Ok(vec![])`.
    fn parse_response(resp: ChartResponse) -> Result<Vec<PriceRow>, DataError> {
        let Some(result) = resp.chart.result else {
            return match resp.chart.error {
                Some(err) if err.code != "Not Found" => Err(DataError::ResponseFormatChanged(
                    format!("{}: {}", err.code, err.description),
                )),
                _ => Ok(Vec::new()),
            };
        };

        let Some(data) = result.into_iter().next() else {
            return Ok(Vec::new());
        };

        // A chart with no trading days in range carries no timestamps at all
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        // Session timestamps are dated in the exchange's own timezone
        let gmtoffset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        let mut rows = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = ts
                .checked_add(gmtoffset)
                .and_then(|local| chrono::DateTime::from_timestamp(local, 0))
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();
            let adj_close = adj_closes
                .as_ref()
                .and_then(|v| v.get(i).copied().flatten());

            // Holidays and halted sessions come back as all-null rows
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            let close = close.unwrap_or(f64::NAN);
            rows.push(PriceRow {
                date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close,
                volume: volume.unwrap_or(0),
                adj_close: adj_close.unwrap_or(close),
            });
        }

        Ok(rows)
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn source(&self) -> DataSource {
        DataSource::YahooFinance
    }

    fn fetch_daily_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRow>, DataError> {
        let url = Self::chart_url(&self.base_url, symbol, start, end)?;
        debug!(%url, "requesting chart");

        let resp = self.client.get(url).send().map_err(send_error)?;

        let status = resp.status();
        debug!(%status, "chart response");

        let retry_after = resp.headers().get(RETRY_AFTER);
        if check_status(status, retry_after, symbol)? == StatusOutcome::NoData {
            return Ok(Vec::new());
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(chart)
    }
}

/// How a chart response should be treated, judged from its status line.
#[derive(Debug, PartialEq, Eq)]
enum StatusOutcome {
    /// Parse the body.
    Body,
    /// Nothing to parse; report an empty result.
    NoData,
}

/// Map a chart response status to an outcome or a per-attempt error.
fn check_status(
    status: StatusCode,
    retry_after: Option<&HeaderValue>,
    symbol: &str,
) -> Result<StatusOutcome, DataError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = retry_after
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(60);
        return Err(DataError::RateLimited { retry_after_secs });
    }

    // Yahoo answers unknown symbols with 404 and a "Not Found" chart error
    if status == StatusCode::NOT_FOUND {
        return Ok(StatusOutcome::NoData);
    }

    if !status.is_success() {
        return Err(DataError::HttpStatus {
            status: status.as_u16(),
            symbol: symbol.to_string(),
        });
    }

    Ok(StatusOutcome::Body)
}

fn send_error(e: reqwest::Error) -> DataError {
    if e.is_timeout() {
        DataError::NetworkUnreachable(format!("request timed out: {e}"))
    } else {
        DataError::NetworkUnreachable(e.to_string())
    }
}
