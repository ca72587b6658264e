//! Backtest runner: wires together configuration, data loading, the replay loop
//! and metrics.
//!
//! Two entry points:
//! - `run_single_backtest()`: loads bars from a source, then runs. Used by the CLI.
//! - `run_backtest_from_data()`: takes an already loaded series. Used by tests
//!   and callers that hold bars in memory.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use algotrader_core::data::DataError;
use algotrader_core::domain::{BarSeries, Position, Trade};
use algotrader_core::engine::{run_backtest, EquityPoint, ReplayError, StepAction};
use algotrader_core::strategy::Strategy;

use crate::config::{AppConfig, ConfigError, StrategyConfig};
use crate::data_loader::{dataset_hash, load_series, LoadError, LoadOptions, LoadSource};
use crate::metrics::{periods_per_year, PerformanceMetrics};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("load error: {0}")]
    Load(#[from] LoadError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub symbol: String,
    pub strategy: StrategyConfig,
    pub start: Option<String>,
    pub end: Option<String>,
    pub bar_count: usize,
    pub initial_cash: f64,
    pub dataset_hash: String,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub actions: Vec<StepAction>,
    pub final_position: Position,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Load bars from `source` and run the configured backtest on them.
pub fn run_single_backtest(
    config: &AppConfig,
    source: &LoadSource,
    symbol: &str,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let opts = LoadOptions {
        symbol: symbol.to_string(),
        source_timeframe: Some(config.data.native_timeframe),
        timeframe: config.backtest.timeframe,
    };
    let loaded = load_series(source, &opts)?;
    run_backtest_from_data(config, &loaded.series)
}

/// Run the configured backtest on an already loaded series. No I/O.
pub fn run_backtest_from_data(
    config: &AppConfig,
    series: &BarSeries,
) -> Result<BacktestResult, RunError> {
    let strategy = config.strategy.build().map_err(ConfigError::from)?;
    run_with_strategy(config, series, strategy)
}

/// Run any strategy with the configured ledger settings.
pub fn run_with_strategy<S: Strategy>(
    config: &AppConfig,
    series: &BarSeries,
    strategy: S,
) -> Result<BacktestResult, RunError> {
    let ledger_config = config.backtest.ledger_config();
    let initial_cash = ledger_config.cash;
    let report = run_backtest(series, strategy, ledger_config)?;

    let equity: Vec<f64> = report.equity_curve.iter().map(|p| p.equity).collect();
    let periods = series
        .native_granularity()
        .map(periods_per_year)
        .unwrap_or_else(|| periods_per_year(86_400));
    let metrics = PerformanceMetrics::compute(&equity, &report.trades, series.len(), periods);

    tracing::info!(
        symbol = series.symbol(),
        trades = metrics.trade_count,
        final_equity = metrics.final_equity,
        total_return = metrics.total_return,
        "backtest complete"
    );

    let dataset = dataset_hash(series);
    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id_for(series.symbol(), &dataset),
        symbol: series.symbol().to_string(),
        strategy: config.strategy.clone(),
        start: series.first().map(|b| b.timestamp.to_rfc3339()),
        end: series.last().map(|b| b.timestamp.to_rfc3339()),
        bar_count: series.len(),
        initial_cash,
        dataset_hash: dataset,
        metrics,
        trades: report.trades,
        equity_curve: report.equity_curve,
        actions: report.actions,
        final_position: report.final_position,
    })
}
