//! Trade: a completed round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::Side;

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    Reversal,
    Settlement,
}

/// A complete round-trip trade: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    /// Units, always positive.
    pub size: f64,

    pub entry_bar: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,

    pub exit_bar: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,

    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,

    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    /// Net return as a fraction of entry value.
    pub fn return_pct(&self) -> f64 {
        let basis = self.entry_price * self.size;
        if basis == 0.0 {
            return 0.0;
        }
        self.net_pnl / basis
    }
}
