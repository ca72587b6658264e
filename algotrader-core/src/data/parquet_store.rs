//! Parquet file store: one file per symbol and timeframe.
//!
//! Layout: `{dir}/{SYMBOL}_{timeframe}.parquet`, e.g. `data/XAUUSD_5min.parquet`.
//!
//! Writes overwrite the whole file and are atomic (write to .tmp, rename into
//! place), so a reader never sees a half-written file.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;

use super::convert::{frame_to_series, series_to_store_frame};
use super::provider::DataError;
use super::timeframe::Timeframe;
use crate::domain::BarSeries;

/// The Parquet store.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    dir: PathBuf,
}

impl ParquetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for a symbol+timeframe.
    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{symbol}_{}.parquet", timeframe.label()))
    }

    /// Write a series, replacing any existing file for the same symbol+timeframe.
    pub fn write(&self, series: &BarSeries, timeframe: Timeframe) -> Result<PathBuf, DataError> {
        let span = tracing::info_span!(
            "parquet.write",
            symbol = series.symbol(),
            timeframe = %timeframe
        );
        let _enter = span.enter();

        let path = self.path_for(series.symbol(), timeframe);
        let mut df = series_to_store_frame(series)?;
        write_frame(&mut df, &path)?;
        tracing::info!(rows = series.len(), path = %path.display(), "wrote parquet");
        Ok(path)
    }

    /// Load the series stored for a symbol+timeframe.
    pub fn read(&self, symbol: &str, timeframe: Timeframe) -> Result<BarSeries, DataError> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return Err(DataError::NoData {
                symbol: format!("{symbol} ({timeframe}) at {}", path.display()),
            });
        }
        let df = read_frame(&path)?;
        frame_to_series(&df, symbol)
    }

    /// Whether a file exists for a symbol+timeframe.
    pub fn contains(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.path_for(symbol, timeframe).exists()
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Write a DataFrame to `path` atomically, creating parent directories.
pub fn write_frame(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("parquet.tmp");

    let file = fs::File::create(&tmp_path)
        .map_err(|e| DataError::Parquet(format!("create {}: {e}", tmp_path.display())))?;
    ParquetWriter::new(file).finish(df).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::Parquet(format!("write parquet: {e}"))
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::Parquet(format!("atomic rename failed: {e}"))
    })?;
    Ok(())
}

/// Read a Parquet file into a DataFrame.
pub fn read_frame(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path)
        .map_err(|e| DataError::Parquet(format!("open {}: {e}", path.display())))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Parquet(format!("read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_series(n: usize, base: f64) -> BarSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = (0..n)
            .map(|i| {
                let p = base + i as f64;
                Bar::new(t0 + Duration::minutes(5 * i as i64), p, p + 1.0, p - 1.0, p, 10.0)
            })
            .collect();
        BarSeries::new("XAUUSD", bars).unwrap()
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        let series = sample_series(5, 100.0);

        let path = store.write(&series, Timeframe::minutes(5)).unwrap();
        assert!(path.ends_with("XAUUSD_5min.parquet"));

        let loaded = store.read("XAUUSD", Timeframe::minutes(5)).unwrap();
        assert_eq!(loaded, series);
    }

    #[test]
    fn write_overwrites_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.write(&sample_series(5, 100.0), Timeframe::minutes(5)).unwrap();
        store.write(&sample_series(2, 200.0), Timeframe::minutes(5)).unwrap();

        let loaded = store.read("XAUUSD", Timeframe::minutes(5)).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.bars()[0].open, 200.0);
        assert!(!dir.path().join("XAUUSD_5min.parquet.tmp").exists());
    }

    #[test]
    fn read_missing_returns_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        assert!(matches!(
            store.read("NONE", Timeframe::hours(1)),
            Err(DataError::NoData { .. })
        ));
        assert!(!store.contains("NONE", Timeframe::hours(1)));
    }
}
