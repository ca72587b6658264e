//! Order requests handed to the ledger and the pending orders it keeps.

use serde::{Deserialize, Serialize};

use super::signal::Signal;

/// Which way an order trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

/// Parameters of a buy or sell, exactly as the strategy supplied them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderRequest {
    pub size: Option<f64>,
    pub limit: Option<f64>,
    pub stop: Option<f64>,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
}

impl From<&Signal> for OrderRequest {
    fn from(signal: &Signal) -> Self {
        Self {
            size: signal.size,
            limit: signal.limit,
            stop: signal.stop,
            sl: signal.sl,
            tp: signal.tp,
        }
    }
}

/// An accepted entry order waiting for its fill conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub side: Side,
    pub request: OrderRequest,
    /// Bar index the order was placed on.
    pub placed_bar: usize,
    /// Stop already crossed; the order now behaves as market or limit.
    pub stop_triggered: bool,
}

impl PendingOrder {
    pub fn is_market(&self) -> bool {
        self.request.limit.is_none() && (self.request.stop.is_none() || self.stop_triggered)
    }
}
