//! Simulated trading ledger: pending orders, fills, contingent exits and equity.
//!
//! Timing per bar `i`:
//! - `on_bar_open(i)`: a requested close executes at the open, then stop-loss
//!   and take-profit of trades opened on earlier bars, then pending entries.
//! - the strategy runs and may place orders or request a close.
//! - `on_bar_close(i)`: with `trade_on_close`, market orders and a requested
//!   close placed this bar execute at the close; then equity is marked.
//!
//! Long and short are mutually exclusive: all open trades share one side, and a
//! fill on the other side closes them first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, ExitReason, OrderRequest, PendingOrder, Position, Side, Trade};

/// Fraction of available equity used by an order without an explicit size.
const FULL_EQUITY: f64 = 0.9999;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("invalid order size {0}: expected a fraction in (0, 1) or a whole number of units")]
    InvalidSize(f64),

    #[error(
        "invalid {side:?} order prices: sl={sl:?} reference={reference} tp={tp:?} \
         (long needs sl < reference < tp, short needs tp < reference < sl)"
    )]
    InvalidPrices {
        side: Side,
        reference: f64,
        sl: Option<f64>,
        tp: Option<f64>,
    },

    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(String),
}

/// What happens to positions still open after the last bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// Close everything at the last bar's close and record the trades.
    #[default]
    CloseAtLastClose,
    /// Leave trades open; they are excluded from the trade list.
    LeaveOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub cash: f64,
    /// Fraction of traded value charged on entry and again on exit.
    pub commission: f64,
    /// Fill market orders at the close of the bar they were placed on instead of
    /// the next bar's open.
    pub trade_on_close: bool,
    pub settlement: SettlementPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cash: 10_000.0,
            commission: 0.002,
            trade_on_close: false,
            settlement: SettlementPolicy::CloseAtLastClose,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !(self.cash.is_finite() && self.cash > 0.0) {
            return Err(LedgerError::InvalidConfig(format!(
                "cash must be positive, got {}",
                self.cash
            )));
        }
        if !(0.0..1.0).contains(&self.commission) {
            return Err(LedgerError::InvalidConfig(format!(
                "commission must be in [0, 1), got {}",
                self.commission
            )));
        }
        Ok(())
    }
}

/// Equity marked at a bar's close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Order-taking and bookkeeping surface the replay loop drives.
pub trait Ledger {
    /// Position snapshot marked at the current bar's close.
    fn position(&self) -> Position;

    fn buy(&mut self, order: OrderRequest) -> Result<(), LedgerError>;

    fn sell(&mut self, order: OrderRequest) -> Result<(), LedgerError>;

    /// Close every open trade at the next fill opportunity and cancel pending
    /// entries.
    fn close_position(&mut self);

    fn on_bar_open(&mut self, index: usize, bar: &Bar);

    fn on_bar_close(&mut self, index: usize, bar: &Bar);

    /// Apply the settlement policy after the last bar.
    fn settle(&mut self, index: usize, bar: &Bar);

    /// Closed trades, in exit order.
    fn trades(&self) -> &[Trade];

    fn equity_curve(&self) -> &[EquityPoint];
}

#[derive(Debug, Clone, PartialEq)]
struct OpenTrade {
    side: Side,
    size: f64,
    entry_bar: usize,
    entry_time: DateTime<Utc>,
    entry_price: f64,
    entry_commission: f64,
    sl: Option<f64>,
    tp: Option<f64>,
}

/// In-memory [`Ledger`] with next-open fills and per-trade SL/TP.
#[derive(Debug, Clone)]
pub struct SimulatedLedger {
    config: LedgerConfig,
    cash: f64,
    open: Vec<OpenTrade>,
    pending: Vec<PendingOrder>,
    close_requested: bool,
    closed: Vec<Trade>,
    equity: Vec<EquityPoint>,
    /// Index, time and close of the bar currently being processed.
    current: Option<(usize, DateTime<Utc>, f64)>,
}

impl SimulatedLedger {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self {
            cash: config.cash,
            config,
            open: Vec::new(),
            pending: Vec::new(),
            close_requested: false,
            closed: Vec::new(),
            equity: Vec::new(),
            current: None,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn pending_orders(&self) -> &[PendingOrder] {
        &self.pending
    }

    pub fn open_trade_count(&self) -> usize {
        self.open.len()
    }

    /// Cash plus open trades marked at `price`.
    pub fn equity_at(&self, price: f64) -> f64 {
        self.cash
            + self
                .open
                .iter()
                .map(|t| t.side.sign() * t.size * price)
                .sum::<f64>()
    }

    fn place(&mut self, side: Side, request: OrderRequest) -> Result<(), LedgerError> {
        if let Some(size) = request.size {
            let valid = size.is_finite() && size > 0.0 && (size < 1.0 || size.fract() == 0.0);
            if !valid {
                return Err(LedgerError::InvalidSize(size));
            }
        }

        let reference = request
            .limit
            .or(request.stop)
            .or(self.current.map(|(_, _, close)| close));
        if let Some(reference) = reference {
            let (sl_ok, tp_ok) = match side {
                Side::Long => (
                    request.sl.map_or(true, |sl| sl < reference),
                    request.tp.map_or(true, |tp| tp > reference),
                ),
                Side::Short => (
                    request.sl.map_or(true, |sl| sl > reference),
                    request.tp.map_or(true, |tp| tp < reference),
                ),
            };
            if !(sl_ok && tp_ok) {
                return Err(LedgerError::InvalidPrices {
                    side,
                    reference,
                    sl: request.sl,
                    tp: request.tp,
                });
            }
        }

        self.pending.push(PendingOrder {
            side,
            request,
            placed_bar: self.current.map_or(0, |(index, _, _)| index),
            stop_triggered: false,
        });
        Ok(())
    }

    fn close_all(&mut self, index: usize, time: DateTime<Utc>, price: f64, reason: ExitReason) {
        for trade in std::mem::take(&mut self.open) {
            self.close_trade(trade, index, time, price, reason);
        }
    }

    fn close_trade(
        &mut self,
        trade: OpenTrade,
        index: usize,
        time: DateTime<Utc>,
        price: f64,
        reason: ExitReason,
    ) {
        let value = trade.size * price;
        let exit_commission = value * self.config.commission;
        match trade.side {
            Side::Long => self.cash += value - exit_commission,
            Side::Short => self.cash -= value + exit_commission,
        }

        let gross_pnl = trade.side.sign() * (price - trade.entry_price) * trade.size;
        let commission = trade.entry_commission + exit_commission;
        tracing::debug!(
            side = ?trade.side,
            size = trade.size,
            entry = trade.entry_price,
            exit = price,
            ?reason,
            "trade closed"
        );
        self.closed.push(Trade {
            side: trade.side,
            size: trade.size,
            entry_bar: trade.entry_bar,
            entry_time: trade.entry_time,
            entry_price: trade.entry_price,
            exit_bar: index,
            exit_time: time,
            exit_price: price,
            gross_pnl,
            commission,
            net_pnl: gross_pnl - commission,
            exit_reason: reason,
        });
    }

    /// Units an order buys at `price`, or `None` when it cannot be afforded.
    fn units_for(&self, request: &OrderRequest, price: f64) -> Option<f64> {
        let used: f64 = self.open.iter().map(|t| t.size * price).sum();
        let available = (self.equity_at(price) - used).max(0.0);
        let unit_cost = price * (1.0 + self.config.commission);
        if !(unit_cost > 0.0) {
            return None;
        }

        let fraction = request.size.unwrap_or(FULL_EQUITY);
        let units = if fraction < 1.0 {
            (available * fraction / unit_cost).floor()
        } else if fraction * unit_cost <= available {
            fraction
        } else {
            0.0
        };
        (units > 0.0).then_some(units)
    }

    fn fill_entry(
        &mut self,
        order: PendingOrder,
        index: usize,
        time: DateTime<Utc>,
        price: f64,
    ) {
        if self.open.first().is_some_and(|t| t.side != order.side) {
            self.close_all(index, time, price, ExitReason::Reversal);
        }

        let Some(units) = self.units_for(&order.request, price) else {
            tracing::warn!(
                side = ?order.side,
                size = ?order.request.size,
                price,
                equity = self.equity_at(price),
                "order dropped: sizes to zero units"
            );
            return;
        };

        let value = units * price;
        let entry_commission = value * self.config.commission;
        match order.side {
            Side::Long => self.cash -= value + entry_commission,
            Side::Short => self.cash += value - entry_commission,
        }
        self.open.push(OpenTrade {
            side: order.side,
            size: units,
            entry_bar: index,
            entry_time: time,
            entry_price: price,
            entry_commission,
            sl: order.request.sl,
            tp: order.request.tp,
        });
    }

    fn check_contingent(&mut self, index: usize, bar: &Bar) {
        let mut still_open = Vec::with_capacity(self.open.len());
        for trade in std::mem::take(&mut self.open) {
            match contingent_exit(&trade, bar) {
                Some((price, reason)) => {
                    self.close_trade(trade, index, bar.timestamp, price, reason)
                }
                None => still_open.push(trade),
            }
        }
        self.open = still_open;
    }

    fn fill_pending_at_open(&mut self, index: usize, bar: &Bar) {
        let mut waiting = Vec::with_capacity(self.pending.len());
        for mut order in std::mem::take(&mut self.pending) {
            match entry_fill_price(&mut order, bar) {
                Some(price) => self.fill_entry(order, index, bar.timestamp, price),
                None => waiting.push(order),
            }
        }
        waiting.append(&mut self.pending);
        self.pending = waiting;
    }
}

/// SL is checked before TP; a gap through either level fills at the open.
fn contingent_exit(trade: &OpenTrade, bar: &Bar) -> Option<(f64, ExitReason)> {
    match trade.side {
        Side::Long => {
            if let Some(sl) = trade.sl.filter(|sl| bar.low <= *sl) {
                return Some((bar.open.min(sl), ExitReason::StopLoss));
            }
            if let Some(tp) = trade.tp.filter(|tp| bar.high >= *tp) {
                return Some((bar.open.max(tp), ExitReason::TakeProfit));
            }
        }
        Side::Short => {
            if let Some(sl) = trade.sl.filter(|sl| bar.high >= *sl) {
                return Some((bar.open.max(sl), ExitReason::StopLoss));
            }
            if let Some(tp) = trade.tp.filter(|tp| bar.low <= *tp) {
                return Some((bar.open.min(tp), ExitReason::TakeProfit));
            }
        }
    }
    None
}

/// Fill price for a pending entry on `bar`, arming its stop when crossed.
fn entry_fill_price(order: &mut PendingOrder, bar: &Bar) -> Option<f64> {
    let long = order.side == Side::Long;
    let mut stop_price = None;

    if let (Some(stop), false) = (order.request.stop, order.stop_triggered) {
        let hit = if long { bar.high >= stop } else { bar.low <= stop };
        if !hit {
            return None;
        }
        order.stop_triggered = true;
        stop_price = Some(if long { bar.open.max(stop) } else { bar.open.min(stop) });
    }

    match order.request.limit {
        None => Some(stop_price.unwrap_or(bar.open)),
        Some(limit) => {
            let hit = if long { bar.low < limit } else { bar.high > limit };
            if !hit {
                return None;
            }
            let from = stop_price.unwrap_or(bar.open);
            Some(if long { from.min(limit) } else { from.max(limit) })
        }
    }
}

impl Ledger for SimulatedLedger {
    fn position(&self) -> Position {
        let size: f64 = self.open.iter().map(|t| t.side.sign() * t.size).sum();
        let units: f64 = self.open.iter().map(|t| t.size).sum();
        if units == 0.0 {
            return Position::flat();
        }
        let entry_price = self
            .open
            .iter()
            .map(|t| t.entry_price * t.size)
            .sum::<f64>()
            / units;
        let mark = self.current.map_or(entry_price, |(_, _, close)| close);
        Position {
            size,
            entry_price,
            unrealized_pl: (mark - entry_price) * size,
        }
    }

    fn buy(&mut self, order: OrderRequest) -> Result<(), LedgerError> {
        self.place(Side::Long, order)
    }

    fn sell(&mut self, order: OrderRequest) -> Result<(), LedgerError> {
        self.place(Side::Short, order)
    }

    fn close_position(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(cancelled = self.pending.len(), "pending orders cancelled");
        }
        self.pending.clear();
        self.close_requested = !self.open.is_empty();
    }

    fn on_bar_open(&mut self, index: usize, bar: &Bar) {
        if std::mem::take(&mut self.close_requested) {
            self.close_all(index, bar.timestamp, bar.open, ExitReason::Signal);
        }
        self.check_contingent(index, bar);
        self.fill_pending_at_open(index, bar);
        self.current = Some((index, bar.timestamp, bar.close));
    }

    fn on_bar_close(&mut self, index: usize, bar: &Bar) {
        self.current = Some((index, bar.timestamp, bar.close));

        if self.config.trade_on_close {
            if std::mem::take(&mut self.close_requested) {
                self.close_all(index, bar.timestamp, bar.close, ExitReason::Signal);
            }
            let (market, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
                .into_iter()
                .partition(|o| o.is_market() && o.placed_bar == index);
            self.pending = waiting;
            for order in market {
                self.fill_entry(order, index, bar.timestamp, bar.close);
            }
        }

        self.equity.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: self.equity_at(bar.close),
        });
    }

    fn settle(&mut self, index: usize, bar: &Bar) {
        self.pending.clear();
        self.close_requested = false;
        if self.config.settlement == SettlementPolicy::CloseAtLastClose && !self.open.is_empty() {
            self.close_all(index, bar.timestamp, bar.close, ExitReason::Settlement);
            let equity = self.equity_at(bar.close);
            match self.equity.last_mut() {
                Some(point) if point.timestamp == bar.timestamp => point.equity = equity,
                _ => self.equity.push(EquityPoint {
                    timestamp: bar.timestamp,
                    equity,
                }),
            }
        }
    }

    fn trades(&self) -> &[Trade] {
        &self.closed
    }

    fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity
    }
}
