//! Test helpers for writing bar files and opening charts on them

use std::path::Path;

use algotrader_core::chart::ChartConfig;
use algotrader_core::data::{ParquetStore, Timeframe};
use algotrader_core::domain::{Bar, BarSeries};
use chrono::{Duration, TimeZone, Utc};

use crate::app::ChartApp;

/// Five-minute bars for each listed January 2025 day.
pub fn write_days(dir: &Path, symbol: &str, days: &[u32]) {
    let bars = days
        .iter()
        .flat_map(|&d| {
            let t0 = Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap();
            (0..288).map(move |i| {
                let p = 2600.0 + (i as f64 / 10.0).sin() * 5.0 + d as f64;
                Bar::new(t0 + Duration::minutes(5 * i), p, p + 1.0, p - 1.0, p + 0.2, 3.0)
            })
        })
        .collect();
    let series = BarSeries::new(symbol, bars).unwrap();
    ParquetStore::new(dir)
        .write(&series, Timeframe::minutes(5))
        .unwrap();
}

pub fn app_for(dir: &Path) -> ChartApp {
    let config = ChartConfig {
        data_dir: dir.to_path_buf(),
        ..ChartConfig::default()
    };
    ChartApp::new(config, "xauusd", Timeframe::minutes(5))
}
