//! Live trading seam: terminal abstraction, order requests and the one-shot
//! decision loop.
//!
//! A [`LiveTerminal`] is whatever connects to the broker (an MT5 bridge in
//! production). [`PaperTerminal`] serves bars from memory and records orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::provider::DataError;
use crate::data::resample::resample;
use crate::data::timeframe::Timeframe;
use crate::domain::{BarSeries, Direction, Position};
use crate::strategy::Strategy;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("terminal error: {0}")]
    Terminal(String),
}

/// Live session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub symbol: String,
    /// Order volume in lots.
    pub lot: f64,
    pub timeframe: Timeframe,
    /// Bars fetched for each decision.
    pub bars: usize,
    /// Maximum price deviation in points.
    pub deviation: u32,
    pub magic: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            symbol: "XAUUSD".into(),
            lot: 0.1,
            timeframe: Timeframe::minutes(5),
            bars: 200,
            deviation: 20,
            magic: 123_456,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Buy,
    Sell,
}

/// A market order for the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveOrderRequest {
    pub symbol: String,
    pub direction: OrderDirection,
    pub volume: f64,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
}

impl LiveOrderRequest {
    pub fn market(config: &LiveConfig, direction: OrderDirection) -> Self {
        let comment = match direction {
            OrderDirection::Buy => "Strategy Buy",
            OrderDirection::Sell => "Strategy Sell",
        };
        Self {
            symbol: config.symbol.clone(),
            direction,
            volume: config.lot,
            deviation: config.deviation,
            magic: config.magic,
            comment: comment.to_string(),
        }
    }
}

/// Terminal acknowledgement of a filled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub ticket: u64,
    pub price: f64,
    pub volume: f64,
}

/// Result of one live evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveDecision {
    NoAction,
    Sent {
        request: LiveOrderRequest,
        outcome: OrderOutcome,
    },
}

/// Connection to a trading terminal.
pub trait LiveTerminal {
    /// The most recent `count` bars, oldest first.
    fn latest_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<BarSeries, LiveError>;

    /// Up to `count` bars starting at `from`.
    fn bars_since(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        count: usize,
    ) -> Result<BarSeries, LiveError>;

    /// Bars with `from <= timestamp <= to`.
    fn bars_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BarSeries, LiveError>;

    fn send_order(&mut self, request: &LiveOrderRequest) -> Result<OrderOutcome, LiveError>;
}

/// In-memory terminal backed by one series. Orders fill at the last close.
#[derive(Debug, Clone)]
pub struct PaperTerminal {
    series: BarSeries,
    orders: Vec<LiveOrderRequest>,
}

impl PaperTerminal {
    pub fn new(series: BarSeries) -> Self {
        Self {
            series,
            orders: Vec::new(),
        }
    }

    /// Orders sent so far.
    pub fn orders(&self) -> &[LiveOrderRequest] {
        &self.orders
    }

    fn bars_for(&self, symbol: &str, timeframe: Timeframe) -> Result<BarSeries, LiveError> {
        if !symbol.eq_ignore_ascii_case(self.series.symbol()) {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            }
            .into());
        }
        Ok(resample(&self.series, None, timeframe)?)
    }
}

impl LiveTerminal for PaperTerminal {
    fn latest_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<BarSeries, LiveError> {
        let series = self.bars_for(symbol, timeframe)?;
        let bars = series.bars();
        let start = bars.len().saturating_sub(count);
        Ok(BarSeries::new(series.symbol(), bars[start..].to_vec())?)
    }

    fn bars_since(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        count: usize,
    ) -> Result<BarSeries, LiveError> {
        let series = self.bars_for(symbol, timeframe)?.since(from);
        let bars = series.bars().iter().take(count).cloned().collect();
        Ok(BarSeries::new(series.symbol(), bars)?)
    }

    fn bars_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<BarSeries, LiveError> {
        let series = self.bars_for(symbol, timeframe)?.since(from);
        let bars = series
            .bars()
            .iter()
            .take_while(|b| b.timestamp <= to)
            .cloned()
            .collect();
        Ok(BarSeries::new(series.symbol(), bars)?)
    }

    fn send_order(&mut self, request: &LiveOrderRequest) -> Result<OrderOutcome, LiveError> {
        if !(request.volume > 0.0) {
            return Err(LiveError::Rejected(format!(
                "invalid volume {}",
                request.volume
            )));
        }
        let price = self
            .series
            .last()
            .map(|b| b.close)
            .ok_or_else(|| LiveError::Terminal("no price to fill against".into()))?;
        self.orders.push(request.clone());
        Ok(OrderOutcome {
            ticket: self.orders.len() as u64,
            price,
            volume: request.volume,
        })
    }
}

/// Fetch the latest bars, ask the strategy once, and send a market order on a
/// buy or sell signal. The strategy sees a flat position.
pub fn run_live_once<S: Strategy>(
    terminal: &mut dyn LiveTerminal,
    strategy: &mut S,
    config: &LiveConfig,
) -> Result<LiveDecision, LiveError> {
    let span = tracing::info_span!(
        "live",
        symbol = %config.symbol,
        timeframe = %config.timeframe,
        strategy = strategy.name()
    );
    let _enter = span.enter();

    let series = terminal.latest_bars(&config.symbol, config.timeframe, config.bars)?;
    if series.is_empty() {
        return Err(DataError::NoData {
            symbol: config.symbol.clone(),
        }
        .into());
    }

    let signal = strategy.generate_signal(series.bars(), &Position::flat(), None);
    let direction = match signal.map(|s| s.direction) {
        Some(Direction::Buy) => OrderDirection::Buy,
        Some(Direction::Sell) => OrderDirection::Sell,
        other => {
            tracing::info!(signal = ?other, "no order");
            return Ok(LiveDecision::NoAction);
        }
    };

    let request = LiveOrderRequest::market(config, direction);
    let outcome = terminal.send_order(&request).map_err(|e| {
        tracing::error!(error = %e, "order send failed");
        e
    })?;
    tracing::info!(ticket = outcome.ticket, price = outcome.price, ?direction, "order sent");
    Ok(LiveDecision::Sent { request, outcome })
}
