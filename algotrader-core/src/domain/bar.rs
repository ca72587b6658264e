//! Bar and BarSeries: the fundamental market data units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::provider::DataError;

/// OHLCV bar for one time bucket.
///
/// `spread` and `real_volume` are only filled by broker terminals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_volume: Option<i64>,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            spread: None,
            real_volume: None,
        }
    }

    /// Basic OHLCV sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        let finite = [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite());
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }
}

/// Ordered bars for one symbol, strictly increasing by timestamp.
///
/// Gaps are allowed (markets close); duplicates are not. Once built the series
/// is read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series, rejecting any timestamp that does not strictly increase.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, DataError> {
        let symbol = symbol.into();
        if let Some(pos) = bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(DataError::Unordered(format!(
                "{symbol}: bar {} at {} does not follow {}",
                pos + 1,
                bars[pos + 1].timestamp,
                bars[pos].timestamp
            )));
        }
        Ok(Self { symbol, bars })
    }

    /// Sort by timestamp and drop duplicates, keeping the last occurrence.
    ///
    /// Used for provider output, where overlapping pages can repeat a bar.
    pub fn canonicalize(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match out.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => out.push(bar),
            }
        }
        Self {
            symbol: symbol.into(),
            bars: out,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bars: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Bars from the start of the series through `index`, inclusive.
    pub fn window(&self, index: usize) -> &[Bar] {
        let end = (index + 1).min(self.bars.len());
        &self.bars[..end]
    }

    /// Smallest positive gap between consecutive bars, in seconds.
    pub fn native_granularity(&self) -> Option<i64> {
        self.bars
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
            .filter(|gap| *gap > 0)
            .min()
    }

    /// Bars with `timestamp >= from`.
    pub fn since(&self, from: DateTime<Utc>) -> Self {
        Self {
            symbol: self.symbol.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| b.timestamp >= from)
                .cloned()
                .collect(),
        }
    }
}
