//! Reporting and export: JSON, CSV, and Markdown artifact generation.
//!
//! All persisted artifacts include a `schema_version` field. Unknown versions
//! are rejected on load.

use std::path::{Path, PathBuf};

use algotrader_core::domain::Trade;
use algotrader_core::engine::EquityPoint;
use anyhow::{bail, Context, Result};

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Trade tape as CSV.
///
/// Columns: side, size, entry_bar, entry_time, entry_price, exit_bar,
/// exit_time, exit_price, gross_pnl, commission, net_pnl, bars_held, exit_reason
pub fn export_trades_csv(trades: &[Trade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "size",
        "entry_bar",
        "entry_time",
        "entry_price",
        "exit_bar",
        "exit_time",
        "exit_price",
        "gross_pnl",
        "commission",
        "net_pnl",
        "bars_held",
        "exit_reason",
    ])?;

    for t in trades {
        wtr.write_record([
            format!("{:?}", t.side),
            format!("{}", t.size),
            t.entry_bar.to_string(),
            t.entry_time.to_rfc3339(),
            format!("{:.6}", t.entry_price),
            t.exit_bar.to_string(),
            t.exit_time.to_rfc3339(),
            format!("{:.6}", t.exit_price),
            format!("{:.2}", t.gross_pnl),
            format!("{:.2}", t.commission),
            format!("{:.2}", t.net_pnl),
            t.bars_held().to_string(),
            format!("{:?}", t.exit_reason),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Equity curve as CSV with timestamp and equity columns.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity"])?;
    for point in equity_curve {
        wtr.write_record([point.timestamp.to_rfc3339(), format!("{:.2}", point.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single backtest run.
///
/// Creates `{symbol}_{run_id[..12]}/` under `output_dir` containing
/// `manifest.json`, `trades.csv`, `equity.csv` and `report.md`.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = result.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("{}_{short_id}", result.symbol));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("manifest.json"), export_json(result)?)?;
    std::fs::write(
        run_dir.join("trades.csv"),
        export_trades_csv(&result.trades)?,
    )?;
    std::fs::write(
        run_dir.join("equity.csv"),
        export_equity_csv(&result.equity_curve)?,
    )?;
    std::fs::write(run_dir.join("report.md"), generate_report(result))?;

    tracing::info!(dir = %run_dir.display(), "saved artifacts");
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

// ─── Markdown report ────────────────────────────────────────────────

pub fn generate_report(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(2048);
    md.push_str("# Backtest Report\n\n");

    md.push_str("## Metadata\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Symbol | {} |\n", result.symbol));
    md.push_str(&format!("| Strategy | {} |\n", result.strategy.name()));
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        result.start.as_deref().unwrap_or("-"),
        result.end.as_deref().unwrap_or("-")
    ));
    md.push_str(&format!("| Initial Cash | {:.2} |\n", result.initial_cash));
    md.push_str(&format!("| Bars | {} |\n", result.bar_count));
    md.push_str(&format!("| Run Id | {} |\n", result.run_id));
    md.push_str(&format!("| Dataset Hash | {} |\n", result.dataset_hash));
    md.push('\n');

    let m = &result.metrics;
    md.push_str("## Performance Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Final Equity | {:.2} |\n", m.final_equity));
    md.push_str(&format!("| Total Return | {:.2}% |\n", m.total_return * 100.0));
    md.push_str(&format!("| Max Drawdown | {:.2}% |\n", m.max_drawdown * 100.0));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe));
    md.push_str(&format!("| Sortino | {:.3} |\n", m.sortino));
    md.push_str(&format!("| Win Rate | {:.1}% |\n", m.win_rate * 100.0));
    md.push_str(&format!("| Profit Factor | {:.2} |\n", m.profit_factor));
    md.push_str(&format!("| Trades | {} |\n", m.trade_count));
    md.push_str(&format!("| Exposure | {:.1}% |\n", m.exposure * 100.0));
    md.push_str(&format!("| Avg Bars Held | {:.1} |\n", m.avg_bars_held));
    md.push('\n');

    if !result.trades.is_empty() {
        md.push_str("## Trades\n\n");
        md.push_str("| # | Side | Size | Entry | Exit | Net P&L | Reason |\n");
        md.push_str("| --- | --- | --- | --- | --- | --- | --- |\n");
        for (i, t) in result.trades.iter().enumerate() {
            md.push_str(&format!(
                "| {} | {:?} | {} | {:.5} | {:.5} | {:.2} | {:?} |\n",
                i + 1,
                t.side,
                t.size,
                t.entry_price,
                t.exit_price,
                t.net_pnl,
                t.exit_reason
            ));
        }
    }
    md
}
