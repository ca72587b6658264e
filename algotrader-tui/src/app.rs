//! Chart state: single owner, main thread only.
//!
//! Every user interaction goes back through the core chart callbacks:
//! `get_bar_data` for symbol and timeframe changes, `reset_visible_range`
//! for the full-range view and `visible_range_for_day` for day paging.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use algotrader_core::chart::{
    get_bar_data, reset_visible_range, visible_range_for_day, ChartConfig,
};
use algotrader_core::data::timeframe::CHART_TIMEFRAMES;
use algotrader_core::data::{frame_to_series, DataError, Timeframe};
use algotrader_core::domain::{Bar, BarSeries};

/// Status message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// What part of the loaded series is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// First to last bar.
    Full,
    /// One UTC calendar day.
    Day(NaiveDate),
}

#[derive(Debug)]
pub struct ChartApp {
    pub config: ChartConfig,
    pub symbol: String,
    timeframe_index: usize,
    pub series: BarSeries,
    /// `(first, last)` bar time of the loaded table.
    pub full_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub view: View,
    /// Search prompt contents while `/` is active.
    pub search: Option<String>,
    pub status: Option<(String, StatusLevel)>,
    pub running: bool,
}

impl ChartApp {
    /// Create the chart and load `symbol`. A failed load leaves an empty
    /// chart with the error in the status line.
    pub fn new(config: ChartConfig, symbol: &str, timeframe: Timeframe) -> Self {
        let timeframe_index = CHART_TIMEFRAMES
            .iter()
            .position(|tf| *tf == timeframe)
            .or_else(|| {
                CHART_TIMEFRAMES
                    .iter()
                    .position(|tf| *tf == config.native_timeframe)
            })
            .unwrap_or(0);
        let mut app = Self {
            config,
            symbol: symbol.to_uppercase(),
            timeframe_index,
            series: BarSeries::empty(symbol.to_uppercase()),
            full_range: None,
            view: View::Full,
            search: None,
            status: None,
            running: true,
        };
        let symbol = app.symbol.clone();
        app.open_symbol(&symbol);
        app
    }

    pub fn timeframe(&self) -> Timeframe {
        CHART_TIMEFRAMES[self.timeframe_index]
    }

    pub fn set_status(&mut self, msg: impl Into<String>, level: StatusLevel) {
        self.status = Some((msg.into(), level));
    }

    /// Load `symbol` at `CHART_TIMEFRAMES[index]`. Returns `false` and leaves
    /// the current chart alone when no bars fall after the start date.
    fn load(&mut self, symbol: &str, index: usize) -> Result<bool, DataError> {
        let symbol = symbol.trim().to_uppercase();
        let df = get_bar_data(&self.config, &symbol, CHART_TIMEFRAMES[index])?;
        if df.height() == 0 {
            return Ok(false);
        }
        let full_range = reset_visible_range(&df)?;
        self.series = frame_to_series(&df, &symbol)?;
        self.symbol = symbol;
        self.timeframe_index = index;
        self.full_range = Some(full_range);
        if let View::Day(day) = self.view {
            if !self.day_in_range(day) {
                self.view = View::Full;
            }
        }
        Ok(true)
    }

    fn warn_empty(&mut self, symbol: &str) {
        let msg = match self.config.start_date {
            Some(date) => format!("{symbol}: no bars since {date}"),
            None => format!("{symbol}: no bars"),
        };
        self.set_status(msg, StatusLevel::Warning);
    }

    /// Load `symbol` at the current timeframe. On failure the previous chart
    /// stays on screen.
    pub fn open_symbol(&mut self, symbol: &str) {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return;
        }
        match self.load(symbol, self.timeframe_index) {
            Ok(false) => self.warn_empty(symbol),
            Ok(true) => {
                let msg = format!(
                    "{} {}: {} bars",
                    self.symbol,
                    self.timeframe(),
                    self.series.len()
                );
                self.set_status(msg, StatusLevel::Info);
            }
            Err(e) => self.set_status(format!("{symbol}: {e}"), StatusLevel::Error),
        }
    }

    /// Step to the next (or previous) chart timeframe, skipping those finer
    /// than the stored data.
    pub fn cycle_timeframe(&mut self, forward: bool) {
        let n = CHART_TIMEFRAMES.len();
        let symbol = self.symbol.clone();
        for step in 1..n {
            let index = if forward {
                (self.timeframe_index + step) % n
            } else {
                (self.timeframe_index + n - step) % n
            };
            match self.load(&symbol, index) {
                Ok(false) => {
                    self.warn_empty(&symbol);
                    return;
                }
                Ok(true) => {
                    let msg = format!(
                        "{} {}: {} bars",
                        self.symbol,
                        self.timeframe(),
                        self.series.len()
                    );
                    self.set_status(msg, StatusLevel::Info);
                    return;
                }
                Err(DataError::InvalidTimeframe(_)) => continue,
                Err(e) => {
                    self.set_status(format!("{symbol}: {e}"), StatusLevel::Error);
                    return;
                }
            }
        }
        self.set_status("no other timeframe available", StatusLevel::Warning);
    }

    fn day_in_range(&self, day: NaiveDate) -> bool {
        self.full_range.is_some_and(|(lo, hi)| {
            day >= lo.date_naive() && day <= hi.date_naive()
        })
    }

    fn bars_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[Bar] {
        let bars = self.series.bars();
        let lo = bars.partition_point(|b| b.timestamp < start);
        let hi = bars.partition_point(|b| b.timestamp < end);
        &bars[lo..hi]
    }

    /// Page by `delta` days to the nearest day that has bars. From the full
    /// view, moving back opens the last day and moving forward the first.
    pub fn shift_day(&mut self, delta: i64) {
        let Some((lo, hi)) = self.full_range else {
            self.set_status("no bars loaded", StatusLevel::Warning);
            return;
        };
        let (first_day, last_day) = (lo.date_naive(), hi.date_naive());

        let mut day = match self.view {
            View::Day(day) => day + Duration::days(delta),
            View::Full if delta < 0 => last_day,
            View::Full => first_day,
        };
        while day >= first_day && day <= last_day {
            let (start, end) = visible_range_for_day(day);
            if !self.bars_between(start, end).is_empty() {
                self.view = View::Day(day);
                let msg = format!("{} {}", self.symbol, day.format("%Y-%m-%d"));
                self.set_status(msg, StatusLevel::Info);
                return;
            }
            day += Duration::days(delta.signum());
        }
        let edge = if delta < 0 { "earlier" } else { "later" };
        self.set_status(format!("no {edge} data"), StatusLevel::Warning);
    }

    pub fn reset_range(&mut self) {
        self.view = View::Full;
        if let Some((lo, hi)) = self.full_range {
            let msg = format!(
                "{} .. {}",
                lo.format("%Y-%m-%d %H:%M"),
                hi.format("%Y-%m-%d %H:%M")
            );
            self.set_status(msg, StatusLevel::Info);
        }
    }

    /// Time range on screen, inclusive of the start.
    pub fn visible_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self.view {
            View::Full => self.full_range,
            View::Day(day) => Some(visible_range_for_day(day)),
        }
    }

    pub fn visible_bars(&self) -> &[Bar] {
        match self.view {
            View::Full => self.series.bars(),
            View::Day(day) => {
                let (start, end) = visible_range_for_day(day);
                self.bars_between(start, end)
            }
        }
    }

    pub fn begin_search(&mut self) {
        self.search = Some(String::new());
    }

    pub fn cancel_search(&mut self) {
        self.search = None;
    }

    pub fn submit_search(&mut self) {
        if let Some(query) = self.search.take() {
            self.open_symbol(&query);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{app_for, write_days};
    use algotrader_core::data::ParquetStore;
    use chrono::TimeZone;

    #[test]
    fn opens_with_full_range() {
        let dir = tempfile::tempdir().unwrap();
        write_days(dir.path(), "XAUUSD", &[7, 8, 9]);
        let app = app_for(dir.path());

        assert_eq!(app.symbol, "XAUUSD");
        assert_eq!(app.timeframe(), Timeframe::minutes(5));
        assert_eq!(app.visible_bars().len(), 3 * 288);
        let (lo, hi) = app.full_range.unwrap();
        assert_eq!(lo, Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap());
        assert_eq!(hi, Utc.with_ymd_and_hms(2025, 1, 9, 23, 55, 0).unwrap());
        assert_eq!(app.status.as_ref().unwrap().1, StatusLevel::Info);
    }

    #[test]
    fn timeframe_cycle_skips_finer_than_stored() {
        let dir = tempfile::tempdir().unwrap();
        write_days(dir.path(), "XAUUSD", &[7, 8, 9]);
        let mut app = app_for(dir.path());

        app.cycle_timeframe(true);
        assert_eq!(app.timeframe(), Timeframe::minutes(15));
        assert_eq!(app.visible_bars().len(), 3 * 96);

        app.cycle_timeframe(false);
        app.cycle_timeframe(false);
        // 1min is finer than the 5min files, so it wraps to daily.
        assert_eq!(app.timeframe(), Timeframe::days(1));
        assert_eq!(app.visible_bars().len(), 3);
    }

    #[test]
    fn day_paging_stays_inside_data() {
        let dir = tempfile::tempdir().unwrap();
        write_days(dir.path(), "XAUUSD", &[7, 8, 9]);
        let mut app = app_for(dir.path());

        app.shift_day(-1);
        assert_eq!(app.view, View::Day(NaiveDate::from_ymd_opt(2025, 1, 9).unwrap()));
        assert_eq!(app.visible_bars().len(), 288);

        app.shift_day(-1);
        assert_eq!(app.view, View::Day(NaiveDate::from_ymd_opt(2025, 1, 8).unwrap()));

        app.shift_day(1);
        app.shift_day(1);
        assert_eq!(app.view, View::Day(NaiveDate::from_ymd_opt(2025, 1, 9).unwrap()));
        assert_eq!(app.status.as_ref().unwrap().1, StatusLevel::Warning);

        app.reset_range();
        assert_eq!(app.view, View::Full);
        assert_eq!(app.visible_bars().len(), 3 * 288);
    }

    #[test]
    fn day_paging_skips_empty_days() {
        let dir = tempfile::tempdir().unwrap();
        write_days(dir.path(), "XAUUSD", &[7, 10]);
        let mut app = app_for(dir.path());

        app.shift_day(-1);
        app.shift_day(-1);
        assert_eq!(app.view, View::Day(NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()));
    }

    #[test]
    fn day_view_survives_timeframe_switch() {
        let dir = tempfile::tempdir().unwrap();
        write_days(dir.path(), "XAUUSD", &[7, 8, 9]);
        let mut app = app_for(dir.path());

        app.shift_day(1);
        app.cycle_timeframe(true);
        app.cycle_timeframe(true);
        assert_eq!(app.timeframe(), Timeframe::minutes(30));
        assert_eq!(app.view, View::Day(NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()));
        assert_eq!(app.visible_bars().len(), 48);
    }

    #[test]
    fn unknown_symbol_keeps_current_chart() {
        let dir = tempfile::tempdir().unwrap();
        write_days(dir.path(), "XAUUSD", &[7]);
        let mut app = app_for(dir.path());

        app.begin_search();
        app.search = Some("eurusd".into());
        app.submit_search();
        assert!(app.search.is_none());
        assert_eq!(app.symbol, "XAUUSD");
        assert_eq!(app.visible_bars().len(), 288);
        let (msg, level) = app.status.clone().unwrap();
        assert_eq!(level, StatusLevel::Error);
        assert!(msg.starts_with("eurusd"));
    }

    #[test]
    fn symbol_with_nothing_after_start_date_keeps_current_chart() {
        let dir = tempfile::tempdir().unwrap();
        write_days(dir.path(), "XAUUSD", &[7]);
        let t0 = Utc.with_ymd_and_hms(2024, 12, 20, 0, 0, 0).unwrap();
        let old: Vec<Bar> = (0..288)
            .map(|i| Bar::new(t0 + Duration::minutes(5 * i), 1.1, 1.2, 1.0, 1.1, 1.0))
            .collect();
        let series = BarSeries::new("EURUSD", old).unwrap();
        ParquetStore::new(dir.path())
            .write(&series, Timeframe::minutes(5))
            .unwrap();
        let mut app = app_for(dir.path());
        app.shift_day(1);

        app.open_symbol("eurusd");
        assert_eq!(app.symbol, "XAUUSD");
        assert_eq!(app.view, View::Day(NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()));
        assert_eq!(app.visible_bars().len(), 288);
        assert!(app.full_range.is_some());
        let (msg, level) = app.status.clone().unwrap();
        assert_eq!(level, StatusLevel::Warning);
        assert_eq!(msg, "eurusd: no bars since 2025-01-01");
    }

    #[test]
    fn missing_data_dir_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_for(&dir.path().join("nothing"));
        assert!(app.visible_bars().is_empty());
        assert!(app.visible_range().is_none());
        assert_eq!(app.status.as_ref().unwrap().1, StatusLevel::Error);
    }
}
