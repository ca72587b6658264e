//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, scalar out.
//! Ratios are annualized with `periods_per_year`, derived from the bar spacing.

use serde::{Deserialize, Serialize};

use algotrader_core::domain::Trade;

/// Trading days per year used for annualization.
const TRADING_DAYS: f64 = 252.0;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
    /// Fraction of bars with a position open.
    pub exposure: f64,
    pub avg_bars_held: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics from an equity curve and trade list.
    pub fn compute(
        equity_curve: &[f64],
        trades: &[Trade],
        bar_count: usize,
        periods_per_year: f64,
    ) -> Self {
        Self {
            final_equity: equity_curve.last().copied().unwrap_or(0.0),
            total_return: total_return(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            sharpe: sharpe_ratio(equity_curve, periods_per_year),
            sortino: sortino_ratio(equity_curve, periods_per_year),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            exposure: exposure(trades, bar_count),
            avg_bars_held: avg_bars_held(trades),
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
        }
    }
}

/// Annualization factor for bars spaced `seconds` apart.
///
/// Daily and coarser bars use 252 trading days; intraday bars assume a
/// round-the-clock market on those days.
pub fn periods_per_year(seconds: i64) -> f64 {
    if seconds <= 0 {
        return TRADING_DAYS;
    }
    TRADING_DAYS * 86_400.0 / seconds as f64
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&last)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Annualized Sharpe ratio of per-bar returns (zero risk-free rate).
///
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
pub fn sortino_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside <= 0.0 {
        return 0.0;
    }
    let downside_std = (downside / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / downside_std * periods_per_year.sqrt()
}

/// Win rate: fraction of trades that were winners.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses.
///
/// Capped at 100.0 for edge cases (all winners, zero losses).
pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().map(|t| t.net_pnl.max(0.0)).sum();
    let gross_loss: f64 = trades.iter().map(|t| (-t.net_pnl).max(0.0)).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Fraction of bars covered by at least one trade.
pub fn exposure(trades: &[Trade], bar_count: usize) -> f64 {
    if bar_count == 0 {
        return 0.0;
    }
    let mut covered = vec![false; bar_count];
    for trade in trades {
        let end = trade.exit_bar.min(bar_count.saturating_sub(1));
        for slot in covered.iter_mut().take(end + 1).skip(trade.entry_bar) {
            *slot = true;
        }
    }
    covered.iter().filter(|&&c| c).count() as f64 / bar_count as f64
}

pub fn avg_bars_held(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.bars_held()).sum::<usize>() as f64 / trades.len() as f64
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity points.
pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_consecutive(trades: &[Trade], winners: bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() == winners {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
