//! Postgres bar store: upsert keyed by timestamp, last write wins.
//!
//! Tables are addressed as `schema.table` (or a bare `table`). Identifiers are
//! validated before any SQL is built since they are interpolated, not bound.

use chrono::{DateTime, Utc};
use postgres::{Client, NoTls};
use serde::{Deserialize, Serialize};

use super::provider::DataError;
use crate::domain::{Bar, BarSeries};

/// Connection settings for the bar database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "trading".into(),
            user: "postgres".into(),
            password: "postgres".into(),
        }
    }
}

impl DbConfig {
    /// libpq-style key/value connection string.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.dbname, self.user, self.password
        )
    }
}

/// A validated `[schema.]table` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self, DataError> {
        let invalid = || DataError::Configuration(format!("invalid table name: '{raw}'"));
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.is_empty() || parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(invalid());
        }
        match parts.as_slice() {
            [table] => Ok(Self {
                schema: None,
                table: table.to_string(),
            }),
            [schema, table] => Ok(Self {
                schema: Some(schema.to_string()),
                table: table.to_string(),
            }),
            _ => Err(invalid()),
        }
    }

    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.table),
            None => self.table.clone(),
        }
    }
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// ── SQL text ────────────────────────────────────────────────────────

pub fn create_schema_sql(name: &TableName) -> Option<String> {
    name.schema
        .as_ref()
        .map(|schema| format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
}

pub fn create_table_sql(name: &TableName) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         \"timestamp\" TIMESTAMPTZ PRIMARY KEY, \
         open DOUBLE PRECISION NOT NULL, \
         high DOUBLE PRECISION NOT NULL, \
         low DOUBLE PRECISION NOT NULL, \
         close DOUBLE PRECISION NOT NULL, \
         volume DOUBLE PRECISION NOT NULL, \
         spread INTEGER, \
         real_volume BIGINT)",
        name.qualified()
    )
}

pub fn upsert_sql(name: &TableName) -> String {
    format!(
        "INSERT INTO {} (\"timestamp\", open, high, low, close, volume, spread, real_volume) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (\"timestamp\") DO UPDATE SET \
         open = EXCLUDED.open, \
         high = EXCLUDED.high, \
         low = EXCLUDED.low, \
         close = EXCLUDED.close, \
         volume = EXCLUDED.volume, \
         spread = EXCLUDED.spread, \
         real_volume = EXCLUDED.real_volume",
        name.qualified()
    )
}

pub fn latest_timestamp_sql(name: &TableName) -> String {
    format!("SELECT MAX(\"timestamp\") FROM {}", name.qualified())
}

pub fn select_sql(name: &TableName) -> String {
    format!(
        "SELECT \"timestamp\", open, high, low, close, volume, spread, real_volume \
         FROM {} ORDER BY \"timestamp\" ASC",
        name.qualified()
    )
}

/// Table naming for terminal downloads: `{symbol}.ohlc_{code}`.
pub fn terminal_table_name(symbol: &str, mt5_code: &str) -> String {
    format!(
        "{}.ohlc_{}",
        crate::data::download::strip_symbol(symbol).to_lowercase(),
        mt5_code.to_lowercase()
    )
}

/// Something bars can be upserted into and read back from.
pub trait BarStore {
    /// Newest stored timestamp, `None` for an empty or missing table.
    fn latest_timestamp(&mut self, table: &str) -> Result<Option<DateTime<Utc>>, DataError>;

    /// Insert-or-update every bar, creating schema and table when absent.
    /// Returns the number of rows written.
    fn upsert(&mut self, series: &BarSeries, table: &str) -> Result<u64, DataError>;
}

/// Postgres-backed [`BarStore`].
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    pub fn connect(config: &DbConfig) -> Result<Self, DataError> {
        let client = Client::connect(&config.connection_string(), NoTls).map_err(|e| {
            tracing::error!(
                host = %config.host,
                port = config.port,
                error = %e,
                "postgres connect failed"
            );
            DataError::Connection(format!(
                "postgres at {}:{}/{}: {e}",
                config.host, config.port, config.dbname
            ))
        })?;
        Ok(Self { client })
    }

    /// Load every bar of a table in timestamp order.
    pub fn load(&mut self, table: &str, symbol: &str) -> Result<BarSeries, DataError> {
        let name = TableName::parse(table)?;
        let rows = self
            .client
            .query(select_sql(&name).as_str(), &[])
            .map_err(db_error)?;
        let bars = rows
            .iter()
            .map(|row| Bar {
                timestamp: row.get(0),
                open: row.get(1),
                high: row.get(2),
                low: row.get(3),
                close: row.get(4),
                volume: row.get(5),
                spread: row.get(6),
                real_volume: row.get(7),
            })
            .collect();
        BarSeries::new(symbol, bars)
    }

    fn ensure_table(&mut self, name: &TableName) -> Result<(), DataError> {
        if let Some(sql) = create_schema_sql(name) {
            self.client.batch_execute(&sql).map_err(db_error)?;
        }
        self.client
            .batch_execute(&create_table_sql(name))
            .map_err(db_error)
    }
}

impl BarStore for PostgresStore {
    fn latest_timestamp(&mut self, table: &str) -> Result<Option<DateTime<Utc>>, DataError> {
        let name = TableName::parse(table)?;
        self.ensure_table(&name)?;
        let row = self
            .client
            .query_one(latest_timestamp_sql(&name).as_str(), &[])
            .map_err(db_error)?;
        Ok(row.get::<_, Option<DateTime<Utc>>>(0))
    }

    fn upsert(&mut self, series: &BarSeries, table: &str) -> Result<u64, DataError> {
        let name = TableName::parse(table)?;
        let span = tracing::info_span!(
            "postgres.upsert",
            table = %name.qualified(),
            rows = series.len()
        );
        let _enter = span.enter();

        self.ensure_table(&name)?;

        let mut tx = self.client.transaction().map_err(db_error)?;
        let statement = tx.prepare(&upsert_sql(&name)).map_err(db_error)?;
        let mut written = 0u64;
        for bar in series.bars() {
            written += tx
                .execute(
                    &statement,
                    &[
                        &bar.timestamp,
                        &bar.open,
                        &bar.high,
                        &bar.low,
                        &bar.close,
                        &bar.volume,
                        &bar.spread,
                        &bar.real_volume,
                    ],
                )
                .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)?;

        tracing::info!(written, "upserted bars");
        Ok(written)
    }
}

fn db_error(e: postgres::Error) -> DataError {
    if e.is_closed() {
        DataError::Connection(e.to_string())
    } else {
        DataError::Database(e.to_string())
    }
}
