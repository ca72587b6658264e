//! Conversions between canonical DataFrames and typed bar series.

use chrono::{DateTime, Utc};
use polars::prelude::*;

use super::normalize::{find_column, timestamp_millis, timestamp_source};
use super::provider::DataError;
use super::schema::{timestamp_dtype, Purpose, CHART_COLUMNS, REAL_VOLUME, SPREAD};
use crate::domain::{Bar, BarSeries};

/// Read a table (any casing, either purpose layout) into a strict bar series.
///
/// Requires a timestamp source and finite OHLCV in every row. Optional
/// `spread` / `real_volume` columns are carried into the bars when present.
pub fn frame_to_series(df: &DataFrame, symbol: &str) -> Result<BarSeries, DataError> {
    let ts_name = timestamp_source(df, None)?.ok_or_else(|| {
        DataError::ColumnNotFound("no timestamp/time/datetime/date column".into())
    })?;
    let millis = timestamp_millis(df.column(&ts_name)?)?;

    let mut values: Vec<Vec<Option<f64>>> = Vec::with_capacity(5);
    for name in CHART_COLUMNS {
        let actual = find_column(df, name).ok_or_else(|| DataError::Schema {
            column: name.to_string(),
        })?;
        let column = df.column(&actual)?.cast(&DataType::Float64)?;
        values.push(column.f64()?.into_iter().collect());
    }

    let spreads = optional_i64(df, SPREAD)?;
    let real_volumes = optional_i64(df, REAL_VOLUME)?;

    let mut bars = Vec::with_capacity(df.height());
    for (i, ms) in millis.iter().enumerate() {
        let ms = ms.ok_or_else(|| DataError::Polars(format!("null timestamp at row {i}")))?;
        let mut ohlcv = [0.0; 5];
        for ((slot, column), name) in ohlcv.iter_mut().zip(&values).zip(CHART_COLUMNS) {
            *slot = column[i].filter(|v| v.is_finite()).ok_or_else(|| {
                DataError::InvalidBar(format!("{symbol}: null or non-finite {name} at row {i}"))
            })?;
        }
        let [open, high, low, close, volume] = ohlcv;
        let mut bar = Bar::new(millis_to_utc(ms)?, open, high, low, close, volume);
        bar.spread = spreads
            .as_ref()
            .and_then(|s| s[i])
            .and_then(|v| i32::try_from(v).ok());
        bar.real_volume = real_volumes.as_ref().and_then(|r| r[i]);
        bars.push(bar);
    }

    BarSeries::new(symbol, bars)
}

/// Build the canonical table for `purpose` from a series.
pub fn series_to_frame(series: &BarSeries, purpose: Purpose) -> Result<DataFrame, DataError> {
    let bars = series.bars();
    let millis: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
    let [o, h, l, c, v] = purpose.value_columns();

    let values = |name: &str, field: fn(&Bar) -> f64| {
        Column::new(name.into(), bars.iter().map(field).collect::<Vec<f64>>())
    };

    Ok(DataFrame::new(vec![
        Column::new(purpose.time_column().into(), millis).cast(&timestamp_dtype())?,
        values(o, |b| b.open),
        values(h, |b| b.high),
        values(l, |b| b.low),
        values(c, |b| b.close),
        values(v, |b| b.volume),
    ])?)
}

/// Chart-layout table plus the broker columns, used for persistence.
pub fn series_to_store_frame(series: &BarSeries) -> Result<DataFrame, DataError> {
    let mut df = series_to_frame(series, Purpose::Chart)?;
    let bars = series.bars();
    if bars.iter().any(|b| b.spread.is_some()) {
        let spreads: Vec<Option<i32>> = bars.iter().map(|b| b.spread).collect();
        df.with_column(Column::new(SPREAD.into(), spreads))?;
    }
    if bars.iter().any(|b| b.real_volume.is_some()) {
        let real: Vec<Option<i64>> = bars.iter().map(|b| b.real_volume).collect();
        df.with_column(Column::new(REAL_VOLUME.into(), real))?;
    }
    Ok(df)
}

pub fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, DataError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DataError::Polars(format!("timestamp out of range: {ms}")))
}

fn optional_i64(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<i64>>>, DataError> {
    let Some(actual) = find_column(df, name) else {
        return Ok(None);
    };
    let column = df.column(&actual)?.cast(&DataType::Int64)?;
    Ok(Some(column.i64()?.into_iter().collect()))
}
