//! Strategy interface.
//!
//! A strategy sees the bars up to and including the current one, a snapshot of
//! the position, and whatever opaque state it returned last time. It never sees
//! the ledger, so it cannot place orders outside the replay loop.

mod buy_and_hold;
mod sma_cross;

pub use buy_and_hold::BuyAndHold;
pub use sma_cross::{sma, SmaCross};

use serde_json::Value;
use thiserror::Error;

use crate::domain::{Bar, Position, Signal};

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("invalid strategy parameters: {0}")]
    InvalidParameters(String),
}

/// Trait for trading strategies.
///
/// `window` is `bars[..=i]` at step `i`; the last element is the current bar.
/// Returning `None` means no action this step.
pub trait Strategy {
    fn generate_signal(
        &mut self,
        window: &[Bar],
        position: &Position,
        custom_state: Option<&Value>,
    ) -> Option<Signal>;

    /// Human-readable name (e.g., "sma_cross").
    fn name(&self) -> &str {
        "strategy"
    }
}

/// Plain functions and closures are strategies.
impl<F> Strategy for F
where
    F: FnMut(&[Bar], &Position, Option<&Value>) -> Option<Signal>,
{
    fn generate_signal(
        &mut self,
        window: &[Bar],
        position: &Position,
        custom_state: Option<&Value>,
    ) -> Option<Signal> {
        self(window, position, custom_state)
    }
}

/// A closure strategy with a name.
#[derive(Debug, Clone)]
pub struct Named<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named strategy.
///
/// The bound here also pins the closure's argument lifetimes, which a bare
/// closure passed to a `S: Strategy` parameter cannot infer.
pub fn named<F>(name: impl Into<String>, f: F) -> Named<F>
where
    F: FnMut(&[Bar], &Position, Option<&Value>) -> Option<Signal>,
{
    Named {
        name: name.into(),
        f,
    }
}

impl<F> Strategy for Named<F>
where
    F: FnMut(&[Bar], &Position, Option<&Value>) -> Option<Signal>,
{
    fn generate_signal(
        &mut self,
        window: &[Bar],
        position: &Position,
        custom_state: Option<&Value>,
    ) -> Option<Signal> {
        (self.f)(window, position, custom_state)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
