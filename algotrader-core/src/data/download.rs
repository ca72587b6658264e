//! Download orchestration: fetch from a provider or terminal, then persist.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use super::convert::series_to_frame;
use super::parquet_store::{write_frame, ParquetStore};
use super::postgres_store::{terminal_table_name, BarStore};
use super::provider::{DataError, DataProvider, FetchRequest};
use super::schema::Purpose;
use super::timeframe::Timeframe;
use crate::domain::BarSeries;
use crate::live::{LiveError, LiveTerminal};

/// Where downloaded bars go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    #[default]
    Parquet,
    Postgres,
    /// Return the backtest-layout table without persisting.
    Frame,
}

impl FromStr for SaveMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" => Ok(SaveMode::Parquet),
            "postgres" | "postgresql" => Ok(SaveMode::Postgres),
            "frame" | "dataframe" => Ok(SaveMode::Frame),
            other => Err(DataError::Configuration(format!(
                "unknown save mode '{other}' (expected parquet, postgres or dataframe)"
            ))),
        }
    }
}

/// Keep only ASCII letters and digits: `XAU/USD` becomes `XAUUSD`.
pub fn strip_symbol(symbol: &str) -> String {
    symbol.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Default table for provider downloads: `{symbol}_{interval}`, lowercased,
/// e.g. `xauusd_5min`.
pub fn default_table_name(symbol: &str, timeframe: Timeframe) -> String {
    format!(
        "{}_{}",
        strip_symbol(symbol).to_lowercase(),
        timeframe.dukascopy_interval().to_lowercase()
    )
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub save_mode: SaveMode,
    /// Postgres table or Parquet file stem; defaults apply when `None`.
    pub table: Option<String>,
    pub data_dir: PathBuf,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            save_mode: SaveMode::Parquet,
            table: None,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// What a download produced.
#[derive(Debug)]
pub enum DownloadOutcome {
    Parquet { path: PathBuf, rows: usize },
    Postgres { table: String, rows: u64 },
    Frame(DataFrame),
}

/// Fetch `request` from `provider` and persist it per `options`.
///
/// `store` is only consulted in Postgres mode, where it is required.
pub fn download(
    provider: &dyn DataProvider,
    request: &FetchRequest,
    options: &DownloadOptions,
    store: Option<&mut dyn BarStore>,
) -> Result<DownloadOutcome, DataError> {
    let span = tracing::info_span!(
        "download",
        provider = provider.name(),
        symbol = %request.symbol,
        timeframe = %request.timeframe
    );
    let _enter = span.enter();

    let fetched = provider.fetch(request)?;
    save(&fetched.series, request.timeframe, options, store)
}

/// Persist an already fetched series.
pub fn save(
    series: &BarSeries,
    timeframe: Timeframe,
    options: &DownloadOptions,
    store: Option<&mut dyn BarStore>,
) -> Result<DownloadOutcome, DataError> {
    match options.save_mode {
        SaveMode::Parquet => {
            let path = match &options.table {
                Some(stem) => {
                    let path = options.data_dir.join(format!("{stem}.parquet"));
                    let mut df = super::convert::series_to_store_frame(series)?;
                    write_frame(&mut df, &path)?;
                    path
                }
                None => ParquetStore::new(&options.data_dir).write(series, timeframe)?,
            };
            Ok(DownloadOutcome::Parquet {
                path,
                rows: series.len(),
            })
        }
        SaveMode::Postgres => {
            let store = store.ok_or_else(|| {
                DataError::Configuration("postgres save mode needs a database connection".into())
            })?;
            let table = options
                .table
                .clone()
                .unwrap_or_else(|| default_table_name(series.symbol(), timeframe));
            let rows = store.upsert(series, &table)?;
            Ok(DownloadOutcome::Postgres { table, rows })
        }
        SaveMode::Frame => Ok(DownloadOutcome::Frame(series_to_frame(
            series,
            Purpose::Backtest,
        )?)),
    }
}

/// Which bars a terminal sync pulls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncRange {
    /// Continue after the newest stored bar, or take the last `n` bars when the
    /// table is empty.
    Incremental { n: usize },
    Explicit {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Pull bars from a terminal into `{symbol}.ohlc_{code}`.
pub fn sync_terminal(
    terminal: &dyn LiveTerminal,
    store: &mut dyn BarStore,
    symbol: &str,
    timeframe: Timeframe,
    range: SyncRange,
) -> Result<u64, LiveError> {
    let table = terminal_table_name(symbol, &timeframe.mt5_code());
    let span = tracing::info_span!("terminal.sync", %table);
    let _enter = span.enter();

    let series = match range {
        SyncRange::Explicit { from, to } => terminal.bars_range(symbol, timeframe, from, to)?,
        SyncRange::Incremental { n } => match store.latest_timestamp(&table)? {
            Some(latest) => {
                tracing::debug!(%latest, "resuming after newest stored bar");
                terminal.bars_since(symbol, timeframe, latest + Duration::seconds(1), n)?
            }
            None => terminal.latest_bars(symbol, timeframe, n)?,
        },
    };

    if series.is_empty() {
        tracing::info!("terminal returned no bars");
        return Ok(0);
    }
    Ok(store.upsert(&series, &table)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataSource, FetchResult, OfferSide};
    use crate::domain::Bar;
    use crate::live::PaperTerminal;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::{BTreeMap, HashMap};

    /// Keeps upserted bars per table, last write wins.
    #[derive(Default)]
    struct MemoryStore {
        tables: HashMap<String, BTreeMap<DateTime<Utc>, Bar>>,
    }

    impl BarStore for MemoryStore {
        fn latest_timestamp(&mut self, table: &str) -> Result<Option<DateTime<Utc>>, DataError> {
            Ok(self
                .tables
                .get(table)
                .and_then(|t| t.keys().next_back().copied()))
        }

        fn upsert(&mut self, series: &BarSeries, table: &str) -> Result<u64, DataError> {
            let t = self.tables.entry(table.to_string()).or_default();
            for bar in series.bars() {
                t.insert(bar.timestamp, bar.clone());
            }
            Ok(series.len() as u64)
        }
    }

    struct CannedProvider(BarSeries);

    impl DataProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, DataError> {
            Ok(FetchResult {
                series: self.0.clone(),
                timeframe: request.timeframe,
                source: DataSource::Dukascopy,
            })
        }
    }

    fn five_minute(symbol: &str, n: usize) -> BarSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                Bar::new(t0 + Duration::minutes(5 * i as i64), p, p + 1.0, p - 1.0, p, 1.0)
            })
            .collect();
        BarSeries::new(symbol, bars).unwrap()
    }

    fn request() -> FetchRequest {
        FetchRequest {
            symbol: "XAUUSD".into(),
            timeframe: Timeframe::minutes(5),
            offer_side: OfferSide::Bid,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        }
    }

    #[test]
    fn table_naming() {
        assert_eq!(strip_symbol("XAU/USD"), "XAUUSD");
        assert_eq!(default_table_name("XAU/USD", Timeframe::minutes(5)), "xauusd_5min");
        assert_eq!(default_table_name("GOLD", Timeframe::hours(1)), "gold_1hour");
    }

    #[test]
    fn save_mode_parsing() {
        assert_eq!("dataframe".parse::<SaveMode>().unwrap(), SaveMode::Frame);
        assert_eq!("Postgres".parse::<SaveMode>().unwrap(), SaveMode::Postgres);
        assert!("csv".parse::<SaveMode>().is_err());
    }

    #[test]
    fn frame_mode_returns_backtest_layout() {
        let provider = CannedProvider(five_minute("XAUUSD", 12));
        let options = DownloadOptions {
            save_mode: SaveMode::Frame,
            ..DownloadOptions::default()
        };
        let DownloadOutcome::Frame(df) = download(&provider, &request(), &options, None).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!(df.shape(), (12, 6));
        assert!(df.column("timestamp").is_ok());
        assert!(df.column("Open").is_ok());
    }

    #[test]
    fn parquet_mode_writes_chart_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CannedProvider(five_minute("XAUUSD", 12));
        let options = DownloadOptions {
            save_mode: SaveMode::Parquet,
            table: None,
            data_dir: dir.path().to_path_buf(),
        };
        let outcome = download(&provider, &request(), &options, None).unwrap();
        let DownloadOutcome::Parquet { path, rows } = outcome else {
            panic!("expected parquet");
        };
        assert_eq!(rows, 12);
        assert!(path.ends_with("XAUUSD_5min.parquet"));
    }

    #[test]
    fn postgres_mode_requires_store_and_upserts() {
        let provider = CannedProvider(five_minute("XAUUSD", 12));
        let options = DownloadOptions {
            save_mode: SaveMode::Postgres,
            ..DownloadOptions::default()
        };
        assert!(matches!(
            download(&provider, &request(), &options, None),
            Err(DataError::Configuration(_))
        ));

        let mut store = MemoryStore::default();
        let outcome = download(&provider, &request(), &options, Some(&mut store)).unwrap();
        assert!(matches!(
            outcome,
            DownloadOutcome::Postgres { ref table, rows: 12 } if table == "xauusd_5min"
        ));

        // Re-running overwrites instead of duplicating.
        download(&provider, &request(), &options, Some(&mut store)).unwrap();
        assert_eq!(store.tables["xauusd_5min"].len(), 12);
    }

    #[test]
    fn terminal_sync_is_incremental() {
        let terminal = PaperTerminal::new(five_minute("XAUUSD", 30));
        let mut store = MemoryStore::default();
        let tf = Timeframe::minutes(5);
        let last_ten = SyncRange::Incremental { n: 10 };

        let first = sync_terminal(&terminal, &mut store, "XAUUSD", tf, last_ten).unwrap();
        assert_eq!(first, 10);

        // Nothing newer than the last 10 bars.
        let second = sync_terminal(&terminal, &mut store, "XAUUSD", tf, last_ten).unwrap();
        assert_eq!(second, 0);
        assert_eq!(store.tables["xauusd.ohlc_m5"].len(), 10);
    }

    #[test]
    fn terminal_sync_explicit_range() {
        let terminal = PaperTerminal::new(five_minute("XAUUSD", 30));
        let mut store = MemoryStore::default();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let written = sync_terminal(
            &terminal,
            &mut store,
            "XAUUSD",
            Timeframe::minutes(5),
            SyncRange::Explicit {
                from: t0,
                to: t0 + Duration::minutes(20),
            },
        )
        .unwrap();
        assert_eq!(written, 5);
    }
}
