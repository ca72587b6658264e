//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over remote market-data sources (Dukascopy
//! today) so the download path can be exercised against canned payloads in tests.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::timeframe::Timeframe;
use crate::domain::BarSeries;

/// Structured error types for data operations.
///
/// Displayable in both CLI and TUI contexts. Nothing here is retried: every
/// variant propagates to the caller of the top-level operation.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("schema error: required column '{column}' is missing")]
    Schema { column: String },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("no data for '{symbol}'")]
    NoData { symbol: String },

    #[error("bar series out of order: {0}")]
    Unordered(String),

    #[error("invalid bar: {0}")]
    InvalidBar(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("dataframe error: {0}")]
    Polars(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<polars::prelude::PolarsError> for DataError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        DataError::Polars(e.to_string())
    }
}

/// Which side of the book a provider quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OfferSide {
    #[default]
    Bid,
    Ask,
}

impl OfferSide {
    pub fn code(&self) -> &'static str {
        match self {
            OfferSide::Bid => "B",
            OfferSide::Ask => "A",
        }
    }
}

impl std::str::FromStr for OfferSide {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bid" | "b" => Ok(OfferSide::Bid),
            "ask" | "a" => Ok(OfferSide::Ask),
            other => Err(DataError::Configuration(format!(
                "unknown offer side '{other}' (expected bid or ask)"
            ))),
        }
    }
}

/// A request for bars over a calendar date range.
///
/// `start` and `end` are wall-clock dates on the broker server, which runs at a
/// fixed UTC offset. `end` is exclusive at midnight.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub offer_side: OfferSide,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchRequest {
    /// Convert the date bounds into UTC instants for a server at `offset_hours`.
    pub fn utc_bounds(
        &self,
        offset_hours: i32,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), DataError> {
        Ok((
            server_midnight_utc(self.start, offset_hours)?,
            server_midnight_utc(self.end, offset_hours)?,
        ))
    }
}

/// Midnight of `date` in a fixed-offset zone, expressed in UTC.
pub fn server_midnight_utc(date: NaiveDate, offset_hours: i32) -> Result<DateTime<Utc>, DataError> {
    let offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
        DataError::Configuration(format!("utc offset out of range: {offset_hours}h"))
    })?;
    let local = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DataError::Configuration(format!("invalid date {date}")))?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| DataError::Configuration(format!("ambiguous local time {local}")))
}

/// Result of a successful fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub series: BarSeries,
    pub timeframe: Timeframe,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    Dukascopy,
    Terminal,
    Parquet,
    Postgres,
}

/// Trait for remote bar providers.
///
/// Implementations handle the specifics of one source. Persistence sits above
/// this trait: providers never write anything.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for a symbol over a date range.
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_midnight_shifts_back_by_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let utc = server_midnight_utc(date, 3).unwrap();
        assert_eq!(utc.to_rfc3339(), "2023-12-31T21:00:00+00:00");
    }

    #[test]
    fn offer_side_parses_case_insensitively() {
        assert_eq!("BID".parse::<OfferSide>().unwrap(), OfferSide::Bid);
        assert_eq!("a".parse::<OfferSide>().unwrap(), OfferSide::Ask);
        assert!(matches!(
            "mid".parse::<OfferSide>(),
            Err(DataError::Configuration(_))
        ));
    }
}
