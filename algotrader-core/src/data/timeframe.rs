//! Timeframes: parsing, naming and bucket alignment.
//!
//! One type covers the three vocabularies in use: chart labels (`5min`, `1h`),
//! terminal codes (`M5`, `H1`, `MN1`) and Dukascopy intervals (`5MIN`, `1HOUR`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::provider::DataError;

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;
const WEEK: i64 = 7 * DAY;
/// 1970-01-01 was a Thursday; shifting by three days aligns weeks to Monday.
const MONDAY_SHIFT: i64 = 3 * DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

/// A bar duration: `count` consecutive `unit`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    unit: TimeUnit,
    count: u32,
}

/// Timeframes offered by the chart's timeframe switcher, in display order.
pub const CHART_TIMEFRAMES: [Timeframe; 7] = [
    Timeframe::minutes(1),
    Timeframe::minutes(5),
    Timeframe::minutes(15),
    Timeframe::minutes(30),
    Timeframe::hours(1),
    Timeframe::hours(4),
    Timeframe::days(1),
];

impl Timeframe {
    pub fn new(unit: TimeUnit, count: u32) -> Result<Self, DataError> {
        if count == 0 {
            return Err(DataError::InvalidTimeframe(
                "timeframe count must be at least 1".into(),
            ));
        }
        Ok(Self { unit, count })
    }

    pub const fn minutes(count: u32) -> Self {
        Self { unit: TimeUnit::Minute, count }
    }

    pub const fn hours(count: u32) -> Self {
        Self { unit: TimeUnit::Hour, count }
    }

    pub const fn days(count: u32) -> Self {
        Self { unit: TimeUnit::Day, count }
    }

    pub const fn weeks(count: u32) -> Self {
        Self { unit: TimeUnit::Week, count }
    }

    pub const fn months(count: u32) -> Self {
        Self { unit: TimeUnit::Month, count }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Fixed length in seconds, or `None` for calendar months.
    pub fn fixed_seconds(&self) -> Option<i64> {
        let unit = match self.unit {
            TimeUnit::Minute => MINUTE,
            TimeUnit::Hour => HOUR,
            TimeUnit::Day => DAY,
            TimeUnit::Week => WEEK,
            TimeUnit::Month => return None,
        };
        Some(unit * i64::from(self.count))
    }

    /// Shortest possible length in seconds (a month counts as 28 days).
    pub fn min_seconds(&self) -> i64 {
        self.fixed_seconds()
            .unwrap_or(28 * DAY * i64::from(self.count))
    }

    /// Canonical chart label: `5min`, `1h`, `1d`, `1w`, `1mo`.
    pub fn label(&self) -> String {
        let suffix = match self.unit {
            TimeUnit::Minute => "min",
            TimeUnit::Hour => "h",
            TimeUnit::Day => "d",
            TimeUnit::Week => "w",
            TimeUnit::Month => "mo",
        };
        format!("{}{suffix}", self.count)
    }

    /// Terminal timeframe code: `M5`, `H1`, `D1`, `W1`, `MN1`.
    pub fn mt5_code(&self) -> String {
        let prefix = match self.unit {
            TimeUnit::Minute => "M",
            TimeUnit::Hour => "H",
            TimeUnit::Day => "D",
            TimeUnit::Week => "W",
            TimeUnit::Month => "MN",
        };
        format!("{prefix}{}", self.count)
    }

    /// Dukascopy chart interval: `5MIN`, `1HOUR`, `1DAY`, `1WEEK`, `1MONTH`.
    pub fn dukascopy_interval(&self) -> String {
        let suffix = match self.unit {
            TimeUnit::Minute => "MIN",
            TimeUnit::Hour => "HOUR",
            TimeUnit::Day => "DAY",
            TimeUnit::Week => "WEEK",
            TimeUnit::Month => "MONTH",
        };
        format!("{}{suffix}", self.count)
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Intraday and daily buckets are aligned to the Unix epoch, so 5-minute
    /// buckets start on the hour. Weeks start Monday 00:00 UTC and months on the
    /// first calendar day.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // A zero-count timeframe has no buckets.
        if self.count == 0 {
            return ts;
        }
        let secs = ts.timestamp();
        let start = match (self.unit, self.fixed_seconds()) {
            (TimeUnit::Week, Some(step)) => secs - (secs + MONDAY_SHIFT).rem_euclid(step),
            (_, Some(step)) => secs - secs.rem_euclid(step),
            (_, None) => return self.month_bucket_start(ts),
        };
        Utc.timestamp_opt(start, 0).single().unwrap_or(ts)
    }

    fn month_bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let month_index = i64::from(ts.year()) * 12 + i64::from(ts.month0());
        let bucket = month_index - month_index.rem_euclid(i64::from(self.count));
        let year = bucket.div_euclid(12) as i32;
        let month = bucket.rem_euclid(12) as u32 + 1;
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .unwrap_or(ts)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Timeframe {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        if raw.is_empty() {
            return Err(DataError::Configuration("empty timeframe".into()));
        }

        // Terminal codes put the unit first: m5, h1, d1, w1, mn1.
        let unit_first = [
            ("mn", TimeUnit::Month),
            ("m", TimeUnit::Minute),
            ("h", TimeUnit::Hour),
            ("d", TimeUnit::Day),
            ("w", TimeUnit::Week),
        ];
        for (prefix, unit) in unit_first {
            if let Some(rest) = raw.strip_prefix(prefix) {
                if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                    return Timeframe::new(unit, parse_count(rest, s)?);
                }
            }
        }

        let digits_end = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (count, suffix) = raw.split_at(digits_end);
        let count = if count.is_empty() {
            1
        } else {
            parse_count(count, s)?
        };
        let unit = match suffix {
            "min" | "mins" | "minute" | "minutes" | "m" | "t" => TimeUnit::Minute,
            "h" | "hr" | "hour" | "hours" => TimeUnit::Hour,
            "d" | "day" | "days" => TimeUnit::Day,
            "w" | "wk" | "week" | "weeks" => TimeUnit::Week,
            "mo" | "mon" | "month" | "months" => TimeUnit::Month,
            _ => {
                return Err(DataError::Configuration(format!(
                    "unknown timeframe '{s}' (expected e.g. 5min, 1h, M5, H1, 1HOUR)"
                )))
            }
        };
        Timeframe::new(unit, count)
    }
}

fn parse_count(digits: &str, original: &str) -> Result<u32, DataError> {
    digits
        .parse::<u32>()
        .map_err(|_| DataError::InvalidTimeframe(format!("bad count in '{original}'")))
}

impl TryFrom<String> for Timeframe {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.label()
    }
}
