//! Bar loading for the runner.
//!
//! A backtest reads one series from either a Parquet file or a Postgres table,
//! optionally resamples it, and fingerprints the result so reports can be tied
//! to the exact data they ran on.

use std::path::PathBuf;

use thiserror::Error;

use algotrader_core::data::normalize::normalize;
use algotrader_core::data::parquet_store::read_frame;
use algotrader_core::data::{
    frame_to_series, resample, DataError, DbConfig, PostgresStore, Purpose, Timeframe,
};
use algotrader_core::domain::BarSeries;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no bars for '{symbol}' in {source_desc}")]
    Empty { symbol: String, source_desc: String },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Where the bars come from.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadSource {
    /// A Parquet file in any recognised layout.
    Parquet(PathBuf),
    /// A `[schema.]table` in the bar database.
    Postgres { config: DbConfig, table: String },
}

impl LoadSource {
    pub fn describe(&self) -> String {
        match self {
            LoadSource::Parquet(path) => path.display().to_string(),
            LoadSource::Postgres { config, table } => {
                format!(
                    "postgres://{}:{}/{} {table}",
                    config.host, config.port, config.dbname
                )
            }
        }
    }
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Symbol recorded on the loaded series.
    pub symbol: String,
    /// Timeframe the bars are stored at, if known.
    pub source_timeframe: Option<Timeframe>,
    /// Resample to this timeframe after loading.
    pub timeframe: Option<Timeframe>,
}

/// A loaded series with provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub series: BarSeries,
    /// BLAKE3 over every bar's timestamp and OHLCV.
    pub dataset_hash: String,
    pub source: String,
}

/// Load, validate, optionally resample and fingerprint one series.
pub fn load_series(source: &LoadSource, opts: &LoadOptions) -> Result<LoadedData, LoadError> {
    let span = tracing::info_span!("load", source = %source.describe(), symbol = %opts.symbol);
    let _enter = span.enter();

    let series = match source {
        LoadSource::Parquet(path) => {
            let raw = read_frame(path)?;
            let canonical = normalize(&raw, Purpose::Backtest, None)?;
            frame_to_series(&canonical, &opts.symbol)?
        }
        LoadSource::Postgres { config, table } => {
            PostgresStore::connect(config)?.load(table, &opts.symbol)?
        }
    };

    if series.is_empty() {
        return Err(LoadError::Empty {
            symbol: opts.symbol.clone(),
            source_desc: source.describe(),
        });
    }

    let series = match opts.timeframe {
        Some(timeframe) => resample(&series, opts.source_timeframe, timeframe)?,
        None => series,
    };
    tracing::info!(bars = series.len(), "loaded bars");

    Ok(LoadedData {
        dataset_hash: dataset_hash(&series),
        source: source.describe(),
        series,
    })
}

/// Content hash of a series' bars.
pub fn dataset_hash(series: &BarSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in series.bars() {
        hasher.update(&bar.timestamp.timestamp_millis().to_le_bytes());
        for value in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&value.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
