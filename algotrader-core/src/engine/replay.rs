//! Backtest replay loop.
//!
//! Drives a strategy over a bar series one bar at a time. At step `i` the
//! strategy sees `bars[..=i]` only, so no future bar can influence a decision.
//!
//! Per step:
//! 1. ledger opens bar `i` (pending fills, contingent exits)
//! 2. strategy evaluates the window and position snapshot
//! 3. the signal becomes a ledger action
//! 4. ledger closes bar `i` (trade-on-close fills, equity mark)
//!
//! After the last step the ledger settles.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::ledger::{EquityPoint, Ledger, LedgerConfig, LedgerError, SimulatedLedger};
use crate::domain::{BarSeries, Direction, OrderRequest, Position, Signal, Trade};
use crate::strategy::Strategy;

#[derive(Debug, Error, PartialEq)]
pub enum ReplayError {
    #[error("ledger rejected step {step}: {source}")]
    Ledger {
        step: usize,
        #[source]
        source: LedgerError,
    },

    #[error("replay already finished")]
    Finished,

    #[error("invalid ledger configuration: {0}")]
    Config(#[source] LedgerError),
}

/// Where the replay is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    NotStarted,
    Stepping { next: usize },
    Finished,
}

/// What the replay did with a step's signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    OpenLong,
    OpenShort,
    ClosePosition,
    NoOp,
}

/// Action taken at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAction {
    pub step: usize,
    pub action: Action,
}

/// Outcome of a completed replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub bars: usize,
    pub actions: Vec<StepAction>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub final_position: Position,
    pub custom_state: Option<Value>,
}

impl ReplayReport {
    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}

/// Step-wise replay of `strategy` over `series`, trading through `ledger`.
pub struct Replay<'a, S, L> {
    series: &'a BarSeries,
    strategy: S,
    ledger: L,
    state: ReplayState,
    custom_state: Option<Value>,
    actions: Vec<StepAction>,
}

impl<'a, S: Strategy, L: Ledger> Replay<'a, S, L> {
    pub fn new(series: &'a BarSeries, strategy: S, ledger: L) -> Self {
        Self {
            series,
            strategy,
            ledger,
            state: ReplayState::NotStarted,
            custom_state: None,
            actions: Vec::with_capacity(series.len()),
        }
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn custom_state(&self) -> Option<&Value> {
        self.custom_state.as_ref()
    }

    /// Advance exactly one bar. Settles the ledger after the last one.
    pub fn step(&mut self) -> Result<ReplayState, ReplayError> {
        let i = match self.state {
            ReplayState::Finished => return Err(ReplayError::Finished),
            ReplayState::NotStarted => 0,
            ReplayState::Stepping { next } => next,
        };

        let series = self.series;
        let bars = series.bars();
        let Some(bar) = bars.get(i) else {
            self.state = ReplayState::Finished;
            return Ok(self.state);
        };

        self.ledger.on_bar_open(i, bar);

        let window = series.window(i);
        let position = self.ledger.position();
        let signal = self
            .strategy
            .generate_signal(window, &position, self.custom_state.as_ref());

        let action = match signal {
            Some(signal) => self.apply(i, signal)?,
            None => Action::NoOp,
        };
        self.actions.push(StepAction { step: i, action });

        self.ledger.on_bar_close(i, bar);

        self.state = if i + 1 < bars.len() {
            ReplayState::Stepping { next: i + 1 }
        } else {
            self.ledger.settle(i, bar);
            ReplayState::Finished
        };
        Ok(self.state)
    }

    /// Step until finished and produce the report.
    pub fn run(mut self) -> Result<ReplayReport, ReplayError> {
        let span = tracing::info_span!(
            "replay",
            symbol = self.series.symbol(),
            strategy = self.strategy.name(),
            bars = self.series.len()
        );
        let _enter = span.enter();

        while self.state != ReplayState::Finished {
            self.step()?;
        }

        let report = ReplayReport {
            bars: self.series.len(),
            actions: self.actions,
            trades: self.ledger.trades().to_vec(),
            equity_curve: self.ledger.equity_curve().to_vec(),
            final_position: self.ledger.position(),
            custom_state: self.custom_state,
        };
        tracing::info!(
            trades = report.trades.len(),
            final_equity = report.final_equity(),
            "replay finished"
        );
        Ok(report)
    }

    fn apply(&mut self, step: usize, signal: Signal) -> Result<Action, ReplayError> {
        let order = OrderRequest::from(&signal);
        if let Some(state) = signal.custom_state {
            self.custom_state = Some(state);
        }

        let ledger_err = |source| ReplayError::Ledger { step, source };
        Ok(match signal.direction {
            Direction::Buy => {
                self.ledger.buy(order).map_err(ledger_err)?;
                Action::OpenLong
            }
            Direction::Sell => {
                self.ledger.sell(order).map_err(ledger_err)?;
                Action::OpenShort
            }
            Direction::Close => {
                self.ledger.close_position();
                Action::ClosePosition
            }
            Direction::Hold => Action::NoOp,
        })
    }
}

/// Replay `strategy` over `series` with a fresh [`SimulatedLedger`].
pub fn run_backtest<S: Strategy>(
    series: &BarSeries,
    strategy: S,
    config: LedgerConfig,
) -> Result<ReplayReport, ReplayError> {
    let ledger = SimulatedLedger::new(config).map_err(ReplayError::Config)?;
    Replay::new(series, strategy, ledger).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::strategy::{named, BuyAndHold};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn series(closes: &[f64]) -> BarSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(t0 + Duration::hours(i as i64), c, c + 1.0, c - 1.0, c, 1.0))
            .collect();
        BarSeries::new("TEST", bars).unwrap()
    }

    #[test]
    fn empty_series_finishes_without_trades() {
        let s = series(&[]);
        let strategy = named("noop", |_: &[Bar], _: &Position, _: Option<&Value>| None);
        let report = run_backtest(&s, strategy, LedgerConfig::default()).unwrap();
        assert_eq!(report.bars, 0);
        assert!(report.trades.is_empty());
        assert!(report.equity_curve.is_empty());
    }

    #[test]
    fn step_advances_one_bar_and_stops() {
        let s = series(&[1.0, 2.0]);
        let strategy = named("noop", |_: &[Bar], _: &Position, _: Option<&Value>| None);
        let ledger = SimulatedLedger::new(LedgerConfig::default()).unwrap();
        let mut replay = Replay::new(&s, strategy, ledger);

        assert_eq!(replay.state(), ReplayState::NotStarted);
        assert_eq!(replay.step().unwrap(), ReplayState::Stepping { next: 1 });
        assert_eq!(replay.step().unwrap(), ReplayState::Finished);
        assert_eq!(replay.step(), Err(ReplayError::Finished));
    }

    #[test]
    fn window_grows_by_one_each_step() {
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let mut seen = Vec::new();
        let strategy = named("recorder", |w: &[Bar], _: &Position, _: Option<&Value>| {
            seen.push((w.len(), w.last().map(|b| b.close)));
            None
        });
        run_backtest(&s, strategy, LedgerConfig::default()).unwrap();
        assert_eq!(
            seen,
            vec![(1, Some(1.0)), (2, Some(2.0)), (3, Some(3.0)), (4, Some(4.0))]
        );
    }

    #[test]
    fn custom_state_is_threaded_and_kept_when_absent() {
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let mut received = Vec::new();
        let strategy = named("stateful", |w: &[Bar], _: &Position, state: Option<&Value>| {
            received.push(state.cloned());
            // Only the first and third steps return new state.
            match w.len() {
                1 => Some(Signal::hold().with_state(json!(1))),
                3 => Some(Signal::hold().with_state(json!(3))),
                _ => None,
            }
        });
        let report = run_backtest(&s, strategy, LedgerConfig::default()).unwrap();
        assert_eq!(
            received,
            vec![None, Some(json!(1)), Some(json!(1)), Some(json!(3))]
        );
        assert_eq!(report.custom_state, Some(json!(3)));
    }

    #[test]
    fn ledger_errors_abort_the_run() {
        let s = series(&[1.0, 2.0, 3.0]);
        let strategy = named("bad", |w: &[Bar], _: &Position, _: Option<&Value>| {
            (w.len() == 2).then(|| Signal::buy().with_size(-1.0))
        });
        let err = run_backtest(&s, strategy, LedgerConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Ledger {
                step: 1,
                source: LedgerError::InvalidSize(_)
            }
        ));
    }

    #[test]
    fn invalid_ledger_config_is_reported_before_any_step() {
        let s = series(&[1.0, 2.0, 3.0]);
        let config = LedgerConfig {
            cash: 0.0,
            ..LedgerConfig::default()
        };
        let err = run_backtest(&s, BuyAndHold::default(), config).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Config(LedgerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn signals_map_to_actions() {
        let s = series(&[10.0, 11.0, 12.0, 13.0]);
        let strategy = named("script", |w: &[Bar], _: &Position, _: Option<&Value>| {
            match w.len() {
                1 => Some(Signal::buy().with_size(1.0)),
                2 => Some(Signal::close()),
                3 => Some(Signal::sell().with_size(1.0)),
                _ => Some(Signal::hold()),
            }
        });
        let report = run_backtest(&s, strategy, LedgerConfig::default()).unwrap();
        let actions: Vec<Action> = report.actions.iter().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![Action::OpenLong, Action::ClosePosition, Action::OpenShort, Action::NoOp]
        );
        assert_eq!(report.equity_curve.len(), 4);
    }
}
