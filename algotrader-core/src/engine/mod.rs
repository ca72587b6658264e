//! Backtesting engine: the simulated ledger and the bar-by-bar replay loop.
//!
//! Each bar runs in four phases:
//!
//! 1. Open: requested closes, stop-loss/take-profit, pending entry fills
//! 2. Decide: the strategy sees bars up to and including this one
//! 3. Act: the signal is translated into a ledger call
//! 4. Close: trade-on-close fills, equity mark

pub mod ledger;
pub mod replay;

pub use ledger::{EquityPoint, Ledger, LedgerConfig, LedgerError, SettlementPolicy, SimulatedLedger};
pub use replay::{run_backtest, Action, Replay, ReplayError, ReplayReport, ReplayState, StepAction};
