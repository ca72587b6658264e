//! Signal: a strategy's decision for one replay step.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the strategy wants done this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
    Close,
    Hold,
}

/// A trade decision. Order parameters are passed to the ledger verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    /// `None` = use (almost) all available equity; `(0, 1)` = fraction of
    /// available equity; `>= 1` = whole units.
    pub size: Option<f64>,
    pub limit: Option<f64>,
    pub stop: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    /// Opaque state handed back to the strategy on the next step.
    pub custom_state: Option<Value>,
}

impl Signal {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            size: None,
            limit: None,
            stop: None,
            sl: None,
            tp: None,
            custom_state: None,
        }
    }

    pub fn buy() -> Self {
        Self::new(Direction::Buy)
    }

    pub fn sell() -> Self {
        Self::new(Direction::Sell)
    }

    pub fn close() -> Self {
        Self::new(Direction::Close)
    }

    pub fn hold() -> Self {
        Self::new(Direction::Hold)
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_limit(mut self, price: f64) -> Self {
        self.limit = Some(price);
        self
    }

    pub fn with_stop(mut self, price: f64) -> Self {
        self.stop = Some(price);
        self
    }

    pub fn with_sl(mut self, price: f64) -> Self {
        self.sl = Some(price);
        self
    }

    pub fn with_tp(mut self, price: f64) -> Self {
        self.tp = Some(price);
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.custom_state = Some(state);
        self
    }
}
