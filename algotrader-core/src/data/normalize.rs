//! Bar normalizer: raw provider tables in, canonical tables out.
//!
//! Raw tables arrive in any casing and column order. A canonical table has a
//! fixed set of columns for its [`Purpose`]:
//! - backtest: `timestamp` (when a timestamp source exists) + `Open High Low Close Volume`
//! - chart: `time open high low close volume`
//!
//! A DataFrame has no index, so the "timestamp index" of a backtest table is its
//! leading `timestamp` column. A backtest table without one is positional.

use polars::prelude::*;

use super::provider::DataError;
use super::schema::{timestamp_dtype, Purpose, CHART_COLUMNS, TIMESTAMP_ALIASES};

/// Produce the canonical table for `purpose`.
///
/// `timestamp_col` names the timestamp source explicitly; otherwise the first
/// column called `timestamp`, `time`, `datetime` or `date` (any case) is used.
pub fn normalize(
    df: &DataFrame,
    purpose: Purpose,
    timestamp_col: Option<&str>,
) -> Result<DataFrame, DataError> {
    let mut values = Vec::with_capacity(5);
    for (canonical, lookup) in purpose.value_columns().iter().zip(CHART_COLUMNS) {
        let source = find_column(df, lookup).ok_or_else(|| DataError::Schema {
            column: (*canonical).to_string(),
        })?;
        let mut column = df.column(&source)?.cast(&DataType::Float64)?;
        column.rename((*canonical).into());
        values.push(column);
    }

    let mut columns = Vec::with_capacity(6);
    match (timestamp_source(df, timestamp_col)?, purpose) {
        (Some(source), _) => {
            columns.push(timestamp_column(df.column(&source)?, purpose.time_column())?)
        }
        (None, Purpose::Chart) => {
            return Err(DataError::ColumnNotFound(
                "chart tables need a timestamp source (timestamp/time/datetime/date)".into(),
            ))
        }
        (None, Purpose::Backtest) => {}
    }
    columns.extend(values);

    Ok(DataFrame::new(columns)?)
}

/// Resolve the timestamp source column, honouring an explicit name.
pub fn timestamp_source(
    df: &DataFrame,
    explicit: Option<&str>,
) -> Result<Option<String>, DataError> {
    match explicit {
        Some(name) => find_column(df, name)
            .map(Some)
            .ok_or_else(|| DataError::ColumnNotFound(format!("timestamp column '{name}'"))),
        None => Ok(TIMESTAMP_ALIASES
            .iter()
            .find_map(|alias| find_column(df, alias))),
    }
}

/// Case-insensitive column lookup returning the column's actual name.
pub fn find_column(df: &DataFrame, wanted: &str) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .find(|name| name.eq_ignore_ascii_case(wanted))
        .map(|name| name.to_string())
}

/// Epoch milliseconds of a Datetime, Date or integer (already ms) column.
pub fn timestamp_millis(column: &Column) -> Result<Vec<Option<i64>>, DataError> {
    match column.dtype() {
        DataType::Datetime(unit, _) => {
            let divisor = match unit {
                TimeUnit::Nanoseconds => 1_000_000,
                TimeUnit::Microseconds => 1_000,
                TimeUnit::Milliseconds => 1,
            };
            let physical = column.cast(&DataType::Int64)?;
            Ok(physical
                .i64()?
                .into_iter()
                .map(|v| v.map(|raw| raw.div_euclid(divisor)))
                .collect())
        }
        DataType::Date => {
            let physical = column.cast(&DataType::Int32)?;
            Ok(physical
                .i32()?
                .into_iter()
                .map(|v| v.map(|days| i64::from(days) * 86_400_000))
                .collect())
        }
        dtype if dtype.is_integer() => {
            let physical = column.cast(&DataType::Int64)?;
            Ok(physical.i64()?.into_iter().collect())
        }
        other => Err(DataError::Polars(format!(
            "column '{}' has unsupported timestamp type {other:?}",
            column.name()
        ))),
    }
}

fn timestamp_column(source: &Column, name: &str) -> Result<Column, DataError> {
    let millis = timestamp_millis(source)?;
    Ok(Column::new(name.into(), millis).cast(&timestamp_dtype())?)
}
