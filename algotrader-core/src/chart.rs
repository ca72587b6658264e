//! Chart data callbacks: load bars for display and compute visible ranges.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::data::convert::{frame_to_series, series_to_frame};
use crate::data::normalize::{find_column, normalize, timestamp_millis};
use crate::data::parquet_store::{read_frame, ParquetStore};
use crate::data::provider::{server_midnight_utc, DataError};
use crate::data::resample::resample;
use crate::data::schema::{Purpose, CHART_TIME};
use crate::data::timeframe::Timeframe;
use crate::domain::BarSeries;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub data_dir: PathBuf,
    /// Bars before this date are not shown.
    pub start_date: Option<NaiveDate>,
    /// Granularity of the stored files.
    pub native_timeframe: Timeframe,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            native_timeframe: Timeframe::minutes(5),
        }
    }
}

impl ChartConfig {
    /// Stored file for `symbol`, trying the name as given, then lower and
    /// upper case.
    pub fn resolve_path(&self, symbol: &str) -> Option<PathBuf> {
        let store = ParquetStore::new(&self.data_dir);
        [
            symbol.to_string(),
            symbol.to_lowercase(),
            symbol.to_uppercase(),
        ]
        .iter()
        .map(|name| store.path_for(name, self.native_timeframe))
        .find(|path| path.exists())
    }
}

/// Bars for `symbol` at `timeframe`, from `start_date` on.
pub fn load_chart_series(
    config: &ChartConfig,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<BarSeries, DataError> {
    let path = config.resolve_path(symbol).ok_or_else(|| DataError::NoData {
        symbol: format!(
            "{symbol} ({}) under {}",
            config.native_timeframe,
            config.data_dir.display()
        ),
    })?;
    let series = read_chart_file(&path, symbol)?;
    let series = match config.start_date {
        Some(date) => series.since(server_midnight_utc(date, 0)?),
        None => series,
    };
    resample(&series, Some(config.native_timeframe), timeframe)
}

fn read_chart_file(path: &Path, symbol: &str) -> Result<BarSeries, DataError> {
    let raw = read_frame(path)?;
    let chart = normalize(&raw, Purpose::Chart, None)?;
    frame_to_series(&chart, &symbol.to_uppercase())
}

/// Chart-layout table for `symbol` at `timeframe`.
pub fn get_bar_data(
    config: &ChartConfig,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<DataFrame, DataError> {
    let series = load_chart_series(config, symbol, timeframe)?;
    series_to_frame(&series, Purpose::Chart)
}

/// First and last `time` of a chart table.
pub fn reset_visible_range(df: &DataFrame) -> Result<(DateTime<Utc>, DateTime<Utc>), DataError> {
    let name = find_column(df, CHART_TIME)
        .ok_or_else(|| DataError::ColumnNotFound(format!("'{CHART_TIME}'")))?;
    let millis = timestamp_millis(df.column(&name)?)?;
    let mut present = millis.into_iter().flatten();
    let first = present.next().ok_or_else(|| DataError::NoData {
        symbol: "chart table".into(),
    })?;
    let (min, max) = present.fold((first, first), |(lo, hi), ms| (lo.min(ms), hi.max(ms)));
    Ok((
        crate::data::convert::millis_to_utc(min)?,
        crate::data::convert::millis_to_utc(max)?,
    ))
}

/// Same as [`reset_visible_range`] for typed bars.
pub fn series_range(series: &BarSeries) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    Some((series.first()?.timestamp, series.last()?.timestamp))
}

/// `[date 00:00, date + 1 day 00:00)` in UTC.
pub fn visible_range_for_day(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}
