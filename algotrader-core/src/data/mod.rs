//! Market data: normalization, resampling, providers and persistence.

pub mod convert;
pub mod download;
pub mod dukascopy;
pub mod normalize;
pub mod parquet_store;
pub mod postgres_store;
pub mod provider;
pub mod resample;
pub mod schema;
pub mod timeframe;

pub use convert::{frame_to_series, series_to_frame};
pub use download::{download, sync_terminal, DownloadOptions, DownloadOutcome, SaveMode, SyncRange};
pub use dukascopy::DukascopyProvider;
pub use normalize::normalize;
pub use parquet_store::ParquetStore;
pub use postgres_store::{BarStore, DbConfig, PostgresStore};
pub use provider::{DataError, DataProvider, FetchRequest, FetchResult, OfferSide};
pub use resample::{resample, resample_frame};
pub use schema::{BarSchema, Purpose};
pub use timeframe::Timeframe;
