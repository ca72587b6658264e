//! Criterion benchmarks for AlgoTrader hot paths.
//!
//! Benchmarks:
//! 1. Replay loop (full backtest iteration with the SMA cross strategy)
//! 2. Resampler (5-minute bars to coarser timeframes)
//! 3. Simulated ledger with contingent orders (stop, limit, SL/TP)
//! 4. Moving average over a window

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use algotrader_core::data::{resample, Timeframe};
use algotrader_core::domain::{Bar, BarSeries, OrderRequest};
use algotrader_core::engine::{run_backtest, Ledger, LedgerConfig, SimulatedLedger};
use algotrader_core::strategy::{sma, BuyAndHold, SmaCross};
use chrono::{Duration, TimeZone, Utc};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(n: usize) -> BarSeries {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let bars = (0..n)
        .map(|i| {
            let close = 2000.0 + (i as f64 * 0.05).sin() * 25.0;
            Bar::new(
                t0 + Duration::minutes(5 * i as i64),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                100.0 + (i % 50) as f64,
            )
        })
        .collect();
    BarSeries::new("XAUUSD", bars).unwrap()
}

// ── 1. Replay Loop ───────────────────────────────────────────────────

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for &bar_count in &[1_000, 10_000, 50_000] {
        let series = make_series(bar_count);
        group.bench_with_input(
            BenchmarkId::new("sma_cross", bar_count),
            &bar_count,
            |b, _| {
                b.iter(|| {
                    run_backtest(
                        black_box(&series),
                        SmaCross::default(),
                        LedgerConfig::default(),
                    )
                });
            },
        );
    }

    let series = make_series(10_000);
    group.bench_function("buy_and_hold_10000", |b| {
        b.iter(|| {
            run_backtest(
                black_box(&series),
                BuyAndHold::default(),
                LedgerConfig::default(),
            )
        });
    });

    group.finish();
}

// ── 2. Resampler ─────────────────────────────────────────────────────

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample");
    let series = make_series(100_000);

    for target in [Timeframe::hours(1), Timeframe::days(1), Timeframe::months(1)] {
        group.bench_with_input(
            BenchmarkId::new("5m_100k", target.label()),
            &target,
            |b, &target| {
                b.iter(|| resample(black_box(&series), Some(Timeframe::minutes(5)), target))
            },
        );
    }

    group.finish();
}

// ── 3. Ledger ────────────────────────────────────────────────────────

fn bench_ledger(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger");
    let series = make_series(5_000);

    group.bench_function("bracket_orders_5000_bars", |b| {
        b.iter(|| {
            let mut ledger = SimulatedLedger::new(LedgerConfig::default()).unwrap();
            for (i, bar) in series.bars().iter().enumerate() {
                ledger.on_bar_open(i, bar);
                if i % 20 == 0 && ledger.position().is_flat() {
                    let order = OrderRequest {
                        size: Some(1.0),
                        stop: Some(bar.close + 0.5),
                        sl: Some(bar.close - 10.0),
                        tp: Some(bar.close + 10.0),
                        ..OrderRequest::default()
                    };
                    let _ = ledger.buy(order);
                }
                ledger.on_bar_close(i, bar);
            }
            black_box(ledger.trades().len())
        });
    });

    group.finish();
}

// ── 4. Moving Average ────────────────────────────────────────────────

fn bench_sma(c: &mut Criterion) {
    let series = make_series(1_000);
    c.bench_function("sma_200_over_1000", |b| {
        b.iter(|| sma(black_box(series.bars()), 200))
    });
}

criterion_group!(benches, bench_replay, bench_resample, bench_ledger, bench_sma);
criterion_main!(benches);
