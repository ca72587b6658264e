//! Replay loop integration tests.
//!
//! Covers look-ahead safety, position exclusivity, determinism and the shipped
//! strategies end to end.

use algotrader_core::domain::{Bar, BarSeries, ExitReason, Position, Signal};
use algotrader_core::engine::{
    run_backtest, Ledger, LedgerConfig, Replay, ReplayState, SettlementPolicy, SimulatedLedger,
};
use algotrader_core::strategy::{named, BuyAndHold, SmaCross};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::Value;

fn make_series(closes: &[f64]) -> BarSeries {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            Bar::new(
                t0 + Duration::minutes(5 * i as i64),
                c,
                c * 1.002,
                c * 0.998,
                c,
                100.0,
            )
        })
        .collect();
    BarSeries::new("TEST", bars).unwrap()
}

fn rising(n: usize) -> BarSeries {
    make_series(&(0..n).map(|i| 100.0 + i as f64).collect::<Vec<_>>())
}

fn wave(n: usize) -> BarSeries {
    make_series(
        &(0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 / 8.0).sin())
            .collect::<Vec<_>>(),
    )
}

// ── Look-ahead ───────────────────────────────────────────────────────

#[test]
fn strategy_never_sees_future_bars() {
    let series = wave(120);
    let mut violations = 0;
    let mut step = 0usize;
    let strategy = named("window_check", |w: &[Bar], _: &Position, _: Option<&Value>| {
        let current = series.bars()[step].timestamp;
        if w.len() != step + 1 || w.iter().any(|b| b.timestamp > current) {
            violations += 1;
        }
        step += 1;
        None
    });
    run_backtest(&series, strategy, LedgerConfig::default()).unwrap();
    assert_eq!(violations, 0);
    assert_eq!(step, 120);
}

#[test]
fn decisions_do_not_depend_on_future_bars() {
    // Same first 60 bars, different tails.
    let base = wave(100);
    let mut altered: Vec<Bar> = base.bars().to_vec();
    for bar in &mut altered[60..] {
        bar.close *= 3.0;
        bar.high *= 3.0;
        bar.open *= 3.0;
    }
    let altered = BarSeries::new("TEST", altered).unwrap();

    let a = run_backtest(&base, SmaCross::new(5, 15).unwrap(), LedgerConfig::default()).unwrap();
    let b = run_backtest(&altered, SmaCross::new(5, 15).unwrap(), LedgerConfig::default()).unwrap();
    assert_eq!(a.actions[..60], b.actions[..60]);
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn buy_when_flat_over_rising_prices_is_one_trade() {
    let series = rising(50);
    let mut buys = Vec::new();
    let mut step = 0usize;
    let strategy = named("buy-flat", |w: &[Bar], p: &Position, _: Option<&Value>| {
        let i = step;
        step += 1;
        let falling = w.len() >= 2 && w[w.len() - 1].close < w[w.len() - 2].close;
        if p.is_flat() {
            buys.push(i);
            Some(Signal::buy().with_size(1.0))
        } else if falling {
            Some(Signal::close())
        } else {
            None
        }
    });
    let report = run_backtest(&series, strategy, LedgerConfig::default()).unwrap();

    assert_eq!(buys, vec![0]);
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].exit_reason, ExitReason::Settlement);
    assert!(report.final_position.is_flat());
}

#[test]
fn leave_open_keeps_the_position() {
    let config = LedgerConfig {
        settlement: SettlementPolicy::LeaveOpen,
        ..LedgerConfig::default()
    };
    let report = run_backtest(&rising(50), BuyAndHold::default(), config).unwrap();
    assert!(report.trades.is_empty());
    assert!(report.final_position.is_long());
    assert!(report.final_position.unrealized_pl > 0.0);
}

#[test]
fn buy_and_hold_profits_on_rising_prices() {
    let report = run_backtest(&rising(50), BuyAndHold::default(), LedgerConfig::default()).unwrap();
    assert_eq!(report.trades.len(), 1);
    assert!(report.trades[0].net_pnl > 0.0);
    assert_eq!(report.equity_curve.len(), 50);
    assert!(report.final_equity().unwrap() > 10_000.0);
}

#[test]
fn sma_cross_trades_a_wave() {
    let report = run_backtest(&wave(400), SmaCross::default(), LedgerConfig::default()).unwrap();
    assert!(report.trades.len() > 2);
    assert!(report.trades.iter().all(|t| t.size == 1.0));
    assert!(report
        .trades
        .windows(2)
        .all(|w| w[0].exit_bar <= w[1].entry_bar));
}

#[test]
fn replay_is_deterministic() {
    let run = || {
        run_backtest(&wave(300), SmaCross::new(4, 12).unwrap(), LedgerConfig::default()).unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn manual_stepping_matches_run() {
    let series = wave(80);
    let ledger = SimulatedLedger::new(LedgerConfig::default()).unwrap();
    let mut replay = Replay::new(&series, SmaCross::new(3, 9).unwrap(), ledger);
    let mut steps = 0;
    while replay.step().unwrap() != ReplayState::Finished {
        steps += 1;
    }
    assert_eq!(steps, 79);
    let stepped_trades = replay.ledger().trades().to_vec();

    let report =
        run_backtest(&series, SmaCross::new(3, 9).unwrap(), LedgerConfig::default()).unwrap();
    assert_eq!(stepped_trades, report.trades);
}

// ── Position exclusivity ─────────────────────────────────────────────

/// Scripted signal for one step.
fn arb_signal() -> impl Strategy<Value = Option<Signal>> {
    prop_oneof![
        Just(None),
        Just(Some(Signal::hold())),
        Just(Some(Signal::close())),
        (1u32..5).prop_map(|n| Some(Signal::buy().with_size(f64::from(n)))),
        (1u32..5).prop_map(|n| Some(Signal::sell().with_size(f64::from(n)))),
        (0.1..0.9_f64).prop_map(|f| Some(Signal::buy().with_size(f))),
        (0.1..0.9_f64).prop_map(|f| Some(Signal::sell().with_size(f))),
    ]
}

proptest! {
    #[test]
    fn never_long_and_short_at_once(
        script in prop::collection::vec(arb_signal(), 10..80),
        trade_on_close in any::<bool>(),
    ) {
        let series = wave(script.len());
        let config = LedgerConfig { trade_on_close, ..LedgerConfig::default() };
        let ledger = SimulatedLedger::new(config).unwrap();

        let mut step = 0usize;
        let mut exclusive = true;
        let strategy = named("scripted", |_: &[Bar], p: &Position, _: Option<&Value>| {
            exclusive &= !(p.is_long() && p.is_short());
            let signal = script[step].clone();
            step += 1;
            signal
        });
        let mut replay = Replay::new(&series, strategy, ledger);
        loop {
            let p = replay.ledger().position();
            prop_assert!(!(p.is_long() && p.is_short()));
            if replay.step().unwrap() == ReplayState::Finished {
                break;
            }
        }
        drop(replay);
        prop_assert!(exclusive);
    }
}
