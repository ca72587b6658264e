//! AlgoTrader Runner: configuration, backtest orchestration, metrics, export.
//!
//! This crate builds on `algotrader-core` to provide:
//! - TOML configuration with defaults for every section
//! - Bar loading from Parquet files or the bar database
//! - Single-backtest runner with metrics and a content-addressed run id
//! - JSON/CSV/Markdown artifact export
//! - Tracing subscriber setup for the binaries

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod obs;
pub mod runner;

pub use config::{
    AppConfig, BacktestConfig, ConfigError, ConfiguredStrategy, DataConfig, LogFormat,
    LoggingConfig, StrategyConfig,
};
pub use data_loader::{load_series, LoadError, LoadOptions, LoadSource, LoadedData};
pub use metrics::PerformanceMetrics;
pub use obs::init_tracing;
pub use runner::{run_backtest_from_data, run_single_backtest, BacktestResult, RunError};
