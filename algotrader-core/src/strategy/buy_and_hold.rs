//! Buy once on the first bar and hold to the end.

use serde_json::Value;

use super::Strategy;
use crate::domain::{Bar, Position, Signal};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuyAndHold {
    /// Units to buy; `None` sizes to all available equity.
    pub size: Option<f64>,
}

impl Strategy for BuyAndHold {
    fn generate_signal(
        &mut self,
        window: &[Bar],
        position: &Position,
        _custom_state: Option<&Value>,
    ) -> Option<Signal> {
        if window.len() != 1 || !position.is_flat() {
            return None;
        }
        let signal = Signal::buy();
        Some(match self.size {
            Some(size) => signal.with_size(size),
            None => signal,
        })
    }

    fn name(&self) -> &str {
        "buy_and_hold"
    }
}
