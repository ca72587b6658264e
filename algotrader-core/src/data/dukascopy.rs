//! Dukascopy data provider.
//!
//! Fetches OHLCV candles from Dukascopy's public chart feed. The feed answers
//! with a JSONP body (`_callbacks____x([[ts_ms, o, h, l, c, v], ...]);`) holding at
//! most `limit` rows starting at the requested timestamp, so a date range is
//! walked page by page until the end instant is passed.
//!
//! The feed is undocumented and may change without notice; anything that does not
//! parse as the row layout above surfaces as `ResponseFormat`.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::convert::millis_to_utc;
use super::provider::{DataError, DataProvider, DataSource, FetchRequest, FetchResult};
use crate::domain::{Bar, BarSeries};

const DEFAULT_BASE_URL: &str = "https://freeserv.dukascopy.com/2.0/index.php";
const REFERER: &str = "https://freeserv.dukascopy.com/";
const JSONP_CALLBACK: &str = "_callbacks____x";
const DEFAULT_PAGE_LIMIT: usize = 30_000;

/// One `[ts_ms, open, high, low, close, volume]` row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    fn into_bar(self) -> Result<Bar, DataError> {
        Ok(Bar::new(
            millis_to_utc(self.timestamp_ms)?,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ))
    }
}

/// Dukascopy chart-feed provider.
pub struct DukascopyProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    page_limit: usize,
    server_offset_hours: i32,
}

impl DukascopyProvider {
    pub fn new(server_offset_hours: i32) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_limit: DEFAULT_PAGE_LIMIT,
            server_offset_hours,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// Build the feed URL for one page.
    pub fn page_url(&self, request: &FetchRequest, from_ms: i64) -> String {
        format!(
            "{}?path=chart/json3&instrument={}&offer_side={}&interval={}\
             &splits=true&stocks=true&limit={}&time_direction=N&timestamp={from_ms}\
             &jsonp={JSONP_CALLBACK}",
            self.base_url,
            instrument_code(&request.symbol),
            request.offer_side.code(),
            request.timeframe.dukascopy_interval(),
            self.page_limit,
        )
    }

    fn fetch_page(&self, request: &FetchRequest, from_ms: i64) -> Result<Vec<Candle>, DataError> {
        let url = self.page_url(request, from_ms);
        tracing::debug!(%url, "requesting dukascopy page");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .map_err(|e| {
                tracing::error!(error = %e, "dukascopy request failed");
                DataError::Connection(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: request.symbol.clone(),
            });
        }
        if !status.is_success() {
            return Err(DataError::Connection(format!("HTTP {status} from {url}")));
        }

        let body = response
            .text()
            .map_err(|e| DataError::Connection(format!("reading body: {e}")))?;
        parse_payload(&body)
    }
}

impl DataProvider for DukascopyProvider {
    fn name(&self) -> &str {
        "dukascopy"
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
        let (start, end) = request.utc_bounds(self.server_offset_hours)?;
        let span = tracing::info_span!(
            "dukascopy.fetch",
            symbol = %request.symbol,
            timeframe = %request.timeframe,
            %start,
            %end
        );
        let _enter = span.enter();

        let candles = collect_pages(start, end, |from_ms| self.fetch_page(request, from_ms))?;
        if candles.is_empty() {
            return Err(DataError::NoData {
                symbol: request.symbol.clone(),
            });
        }

        let bars = candles
            .into_iter()
            .map(Candle::into_bar)
            .collect::<Result<Vec<_>, _>>()?;
        let series = BarSeries::canonicalize(&request.symbol, bars);
        tracing::info!(bars = series.len(), "fetched dukascopy bars");

        Ok(FetchResult {
            series,
            timeframe: request.timeframe,
            source: DataSource::Dukascopy,
        })
    }
}

/// Walk pages forward from `start`, keeping candles in `[start, end)`.
///
/// Stops when a page is empty, when a page reaches `end`, or when the feed stops
/// advancing.
pub fn collect_pages<F>(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    mut fetch_page: F,
) -> Result<Vec<Candle>, DataError>
where
    F: FnMut(i64) -> Result<Vec<Candle>, DataError>,
{
    let start_ms = start.timestamp_millis();
    let end_ms = end.timestamp_millis();
    let mut cursor = start_ms;
    let mut out = Vec::new();

    while cursor < end_ms {
        let page = fetch_page(cursor)?;
        let Some(last) = page.iter().map(|c| c.timestamp_ms).max() else {
            break;
        };
        let before = out.len();
        out.extend(
            page.into_iter()
                .filter(|c| c.timestamp_ms >= start_ms && c.timestamp_ms < end_ms),
        );
        tracing::debug!(cursor, kept = out.len() - before, "dukascopy page");

        if last < cursor {
            break;
        }
        cursor = last + 1;
    }
    Ok(out)
}

/// Parse a feed body, with or without its JSONP wrapper.
pub fn parse_payload(body: &str) -> Result<Vec<Candle>, DataError> {
    let json = strip_jsonp(body);
    let rows: Vec<Vec<f64>> = serde_json::from_str(json)
        .map_err(|e| DataError::ResponseFormat(format!("candle rows: {e}")))?;

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row.as_slice() {
            [ts, open, high, low, close, volume, ..] => Ok(Candle {
                timestamp_ms: *ts as i64,
                open: *open,
                high: *high,
                low: *low,
                close: *close,
                volume: *volume,
            }),
            _ => Err(DataError::ResponseFormat(format!(
                "row {i} has {} fields, expected 6",
                row.len()
            ))),
        })
        .collect()
}

fn strip_jsonp(body: &str) -> &str {
    let trimmed = body.trim();
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(open), Some(close)) if open < close && !trimmed.starts_with('[') => {
            &trimmed[open + 1..close]
        }
        _ => trimmed,
    }
}

/// Feed instrument code: `XAUUSD` becomes `XAU/USD`; anything already slashed,
/// or not a six-letter pair, is passed through.
pub fn instrument_code(symbol: &str) -> String {
    let symbol = symbol.trim().to_ascii_uppercase();
    if !symbol.contains('/') && symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_alphabetic())
    {
        format!("{}/{}", &symbol[..3], &symbol[3..])
    } else {
        symbol
    }
}
