//! Application configuration, loaded from TOML.
//!
//! Every section has defaults, so an empty file is a valid configuration:
//!
//! ```toml
//! [data]
//! data_dir = "data"
//! server_utc_offset_hours = 3
//!
//! [database]
//! host = "localhost"
//!
//! [backtest]
//! cash = 10000.0
//! commission = 0.002
//!
//! [strategy]
//! type = "sma_cross"
//! n_fast = 10
//! n_slow = 20
//!
//! [live]
//! symbol = "XAUUSD"
//! timeframe = "M5"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use algotrader_core::chart::ChartConfig;
use algotrader_core::data::{DbConfig, Timeframe};
use algotrader_core::domain::{Bar, Position, Signal};
use algotrader_core::engine::{LedgerConfig, SettlementPolicy};
use algotrader_core::live::LiveConfig;
use algotrader_core::strategy::{BuyAndHold, SmaCross, Strategy, StrategyError};

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid strategy parameters: {0}")]
    Strategy(#[from] StrategyError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub database: DbConfig,
    pub backtest: BacktestConfig,
    pub strategy: StrategyConfig,
    pub live: LiveConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backtest
            .ledger_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.strategy.validate()?;
        if !(-12..=14).contains(&self.data.server_utc_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "server_utc_offset_hours out of range: {}",
                self.data.server_utc_offset_hours
            )));
        }
        Ok(())
    }

    /// Deterministic hash of the backtest and strategy sections.
    ///
    /// Two configurations with identical backtest and strategy sections share
    /// this id. See [`AppConfig::run_id_for`] for the id of an actual run.
    pub fn run_id(&self) -> RunId {
        let identity = serde_json::json!({
            "backtest": self.backtest,
            "strategy": self.strategy,
        });
        blake3::hash(identity.to_string().as_bytes())
            .to_hex()
            .to_string()
    }

    /// RunId of this configuration applied to one dataset.
    ///
    /// Same configuration, symbol and bars give the same id; changing any of
    /// them gives a new one.
    pub fn run_id_for(&self, symbol: &str, dataset_hash: &str) -> RunId {
        let identity = serde_json::json!({
            "config": self.run_id(),
            "symbol": symbol,
            "dataset": dataset_hash,
        });
        blake3::hash(identity.to_string().as_bytes())
            .to_hex()
            .to_string()
    }

    /// Chart settings derived from the data section.
    pub fn chart_config(&self) -> ChartConfig {
        let mut chart = ChartConfig {
            data_dir: self.data.data_dir.clone(),
            native_timeframe: self.data.native_timeframe,
            ..ChartConfig::default()
        };
        if self.data.start_date.is_some() {
            chart.start_date = self.data.start_date;
        }
        chart
    }
}

/// Where bar data lives and how provider clocks relate to UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    /// Hours the data server's clock runs ahead of UTC.
    pub server_utc_offset_hours: i32,
    pub start_date: Option<NaiveDate>,
    /// Granularity of the files in `data_dir`.
    pub native_timeframe: Timeframe,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            server_utc_offset_hours: 3,
            start_date: None,
            native_timeframe: Timeframe::minutes(5),
        }
    }
}

/// Simulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub cash: f64,
    pub commission: f64,
    pub trade_on_close: bool,
    pub settlement: SettlementPolicy,
    /// Resample the loaded bars before replaying.
    pub timeframe: Option<Timeframe>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        let ledger = LedgerConfig::default();
        Self {
            cash: ledger.cash,
            commission: ledger.commission,
            trade_on_close: ledger.trade_on_close,
            settlement: ledger.settlement,
            timeframe: None,
        }
    }
}

impl BacktestConfig {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            cash: self.cash,
            commission: self.commission,
            trade_on_close: self.trade_on_close,
            settlement: self.settlement,
        }
    }
}

/// Which strategy to run, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    SmaCross {
        #[serde(default = "default_n_fast")]
        n_fast: usize,
        #[serde(default = "default_n_slow")]
        n_slow: usize,
        /// Units per entry; absent means nearly all available equity.
        #[serde(default = "default_size")]
        size: Option<f64>,
    },
    BuyAndHold {
        #[serde(default)]
        size: Option<f64>,
    },
}

fn default_n_fast() -> usize {
    10
}

fn default_n_slow() -> usize {
    20
}

fn default_size() -> Option<f64> {
    Some(1.0)
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::SmaCross {
            n_fast: default_n_fast(),
            n_slow: default_n_slow(),
            size: default_size(),
        }
    }
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::SmaCross { .. } => "sma_cross",
            StrategyConfig::BuyAndHold { .. } => "buy_and_hold",
        }
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        self.build().map(|_| ())
    }

    /// Instantiate the configured strategy.
    pub fn build(&self) -> Result<ConfiguredStrategy, StrategyError> {
        Ok(match *self {
            StrategyConfig::SmaCross {
                n_fast,
                n_slow,
                size,
            } => ConfiguredStrategy::SmaCross(SmaCross::new(n_fast, n_slow)?.with_size(size)),
            StrategyConfig::BuyAndHold { size } => {
                ConfiguredStrategy::BuyAndHold(BuyAndHold { size })
            }
        })
    }
}

/// A strategy built from configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfiguredStrategy {
    SmaCross(SmaCross),
    BuyAndHold(BuyAndHold),
}

impl Strategy for ConfiguredStrategy {
    fn generate_signal(
        &mut self,
        window: &[Bar],
        position: &Position,
        state: Option<&serde_json::Value>,
    ) -> Option<Signal> {
        match self {
            ConfiguredStrategy::SmaCross(s) => s.generate_signal(window, position, state),
            ConfiguredStrategy::BuyAndHold(s) => s.generate_signal(window, position, state),
        }
    }

    fn name(&self) -> &str {
        match self {
            ConfiguredStrategy::SmaCross(s) => s.name(),
            ConfiguredStrategy::BuyAndHold(s) => s.name(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::Invalid(format!(
                "unknown log format '{other}' (expected text or json)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `ALGOTRADER_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}
