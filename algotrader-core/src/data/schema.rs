use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::provider::DataError;

/// Timestamp column of a backtest table.
pub const BACKTEST_INDEX: &str = "timestamp";
/// Price/volume columns of a backtest table, in order.
pub const BACKTEST_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];
/// Timestamp column of a chart table.
pub const CHART_TIME: &str = "time";
/// Price/volume columns of a chart table, in order.
pub const CHART_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];
/// Optional broker columns carried through persistence.
pub const SPREAD: &str = "spread";
pub const REAL_VOLUME: &str = "real_volume";

/// Names recognised as a timestamp source, lowercase, in priority order.
pub const TIMESTAMP_ALIASES: [&str; 4] = ["timestamp", "time", "datetime", "date"];

/// Canonical timestamp dtype: epoch milliseconds, read as UTC.
pub fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Who a canonical table is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// `timestamp` + `Open High Low Close Volume`.
    Backtest,
    /// `time open high low close volume`.
    Chart,
}

impl Purpose {
    pub fn time_column(&self) -> &'static str {
        match self {
            Purpose::Backtest => BACKTEST_INDEX,
            Purpose::Chart => CHART_TIME,
        }
    }

    pub fn value_columns(&self) -> [&'static str; 5] {
        match self {
            Purpose::Backtest => BACKTEST_COLUMNS,
            Purpose::Chart => CHART_COLUMNS,
        }
    }
}

/// Expected schema for canonical bar tables.
pub struct BarSchema;

impl BarSchema {
    /// The canonical schema for a purpose, timestamp first.
    pub fn schema(purpose: Purpose) -> Schema {
        let mut fields = vec![Field::new(purpose.time_column().into(), timestamp_dtype())];
        fields.extend(
            purpose
                .value_columns()
                .iter()
                .map(|name| Field::new((*name).into(), DataType::Float64)),
        );
        Schema::from_iter(fields)
    }

    /// Validate a DataFrame against the canonical schema for `purpose`.
    pub fn validate(df: &DataFrame, purpose: Purpose) -> Result<(), DataError> {
        let expected = Self::schema(purpose);
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual.get(field.name()).ok_or_else(|| DataError::Schema {
                column: field.name().to_string(),
            })?;
            if actual_dtype != field.dtype() {
                return Err(DataError::Polars(format!(
                    "type mismatch in column {}: expected {:?}, got {:?}",
                    field.name(),
                    field.dtype(),
                    actual_dtype
                )));
            }
        }

        Ok(())
    }
}
