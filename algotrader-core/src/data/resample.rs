//! OHLCV resampler: fine bars in, coarser bars out.
//!
//! Buckets are half-open `[start, start + timeframe)` intervals aligned by
//! [`Timeframe::bucket_start`]. Only buckets that received at least one bar are
//! emitted; there is no forward fill.

use polars::prelude::*;

use super::convert::{frame_to_series, series_to_frame};
use super::normalize::find_column;
use super::provider::DataError;
use super::schema::{Purpose, BACKTEST_INDEX, CHART_TIME};
use super::timeframe::Timeframe;
use crate::domain::{Bar, BarSeries};

/// Aggregate `series` into `target` buckets.
///
/// open = first, high = max, low = min, close = last, volume = sum. Broker
/// fields follow: spread = last, real_volume = sum.
///
/// `source` is the timeframe the bars were stored at. Fails with
/// `InvalidTimeframe` when `target` is finer than it, or has a zero count. When
/// `source` is `None` the smallest gap between consecutive bars stands in for
/// it, which overestimates the granularity of gapped series.
pub fn resample(
    series: &BarSeries,
    source: Option<Timeframe>,
    target: Timeframe,
) -> Result<BarSeries, DataError> {
    if target.count() == 0 {
        return Err(DataError::InvalidTimeframe(format!("{target} has a zero count")));
    }
    let native = match source {
        Some(source) => Some(source.min_seconds()),
        None => series.native_granularity(),
    };
    if let Some(native) = native {
        if target.min_seconds() < native {
            return Err(DataError::InvalidTimeframe(format!(
                "cannot resample {} bars with {native}s spacing to finer {target}",
                series.symbol()
            )));
        }
    }

    let mut out: Vec<Bar> = Vec::new();
    for bar in series.bars() {
        let start = target.bucket_start(bar.timestamp);
        match out.last_mut() {
            Some(current) if current.timestamp == start => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
                if bar.spread.is_some() {
                    current.spread = bar.spread;
                }
                current.real_volume = match (current.real_volume, bar.real_volume) {
                    (Some(a), Some(b)) => Some(a + b),
                    (a, b) => a.or(b),
                };
            }
            _ => {
                let mut opened = bar.clone();
                opened.timestamp = start;
                out.push(opened);
            }
        }
    }

    tracing::debug!(
        symbol = series.symbol(),
        input = series.len(),
        output = out.len(),
        timeframe = %target,
        "resampled bars"
    );
    BarSeries::new(series.symbol(), out)
}

/// Resample a canonical table, keeping its layout.
///
/// The timestamp is looked up as a backtest `timestamp` column first, then a
/// chart `time` column; a table with neither fails with `ColumnNotFound`.
pub fn resample_frame(
    df: &DataFrame,
    source: Option<Timeframe>,
    target: Timeframe,
) -> Result<DataFrame, DataError> {
    let purpose = if find_column(df, BACKTEST_INDEX).is_some() {
        Purpose::Backtest
    } else if find_column(df, CHART_TIME).is_some() {
        Purpose::Chart
    } else {
        return Err(DataError::ColumnNotFound(
            "resample needs a 'timestamp' or 'time' column".into(),
        ));
    };

    let series = frame_to_series(df, "")?;
    series_to_frame(&resample(&series, source, target)?, purpose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn five_minute_series(n: usize) -> BarSeries {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = (0..n)
            .map(|i| {
                let p = 100.0 + i as f64;
                Bar::new(
                    t0 + Duration::minutes(5 * i as i64),
                    p,
                    p + 2.0,
                    p - 2.0,
                    p + 1.0,
                    (i + 1) as f64,
                )
            })
            .collect();
        BarSeries::new("TEST", bars).unwrap()
    }

    #[test]
    fn aggregates_ohlcv_per_bucket() {
        let out = resample(&five_minute_series(24), None, Timeframe::hours(1)).unwrap();
        assert_eq!(out.len(), 2);
        let first = &out.bars()[0];
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 113.0);
        assert_eq!(first.low, 98.0);
        assert_eq!(first.close, 112.0);
        assert_eq!(first.volume, (1..=12).sum::<usize>() as f64);
    }

    #[test]
    fn drops_empty_buckets() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = vec![
            Bar::new(t0, 1.0, 1.0, 1.0, 1.0, 1.0),
            Bar::new(t0 + Duration::hours(5), 2.0, 2.0, 2.0, 2.0, 1.0),
        ];
        let series = BarSeries::new("GAP", bars).unwrap();
        let source = Some(Timeframe::minutes(5));
        let out = resample(&series, source, Timeframe::hours(1)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.bars()[1].timestamp, t0 + Duration::hours(5));
    }

    #[test]
    fn gapped_series_without_source_falls_back_to_smallest_gap() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let bars = vec![
            Bar::new(t0, 1.0, 1.0, 1.0, 1.0, 1.0),
            Bar::new(t0 + Duration::hours(5), 2.0, 2.0, 2.0, 2.0, 1.0),
        ];
        let series = BarSeries::new("GAP", bars).unwrap();
        assert!(matches!(
            resample(&series, None, Timeframe::hours(1)),
            Err(DataError::InvalidTimeframe(_))
        ));
        let out = resample(&series, None, Timeframe::hours(5)).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn zero_count_target_is_invalid_timeframe() {
        let one = five_minute_series(1);
        let empty = BarSeries::empty("EMPTY");
        for series in [&one, &empty] {
            for source in [None, Some(Timeframe::minutes(5))] {
                assert!(matches!(
                    resample(series, source, Timeframe::minutes(0)),
                    Err(DataError::InvalidTimeframe(_))
                ));
            }
        }
        assert!(matches!(
            resample(&five_minute_series(10), None, Timeframe::hours(0)),
            Err(DataError::InvalidTimeframe(_))
        ));
    }

    #[test]
    fn finer_target_is_invalid_timeframe() {
        let err = resample(&five_minute_series(10), None, Timeframe::minutes(1)).unwrap_err();
        assert!(matches!(err, DataError::InvalidTimeframe(_)));
        let err = resample(
            &five_minute_series(10),
            Some(Timeframe::minutes(5)),
            Timeframe::minutes(1),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::InvalidTimeframe(_)));
    }

    #[test]
    fn same_granularity_is_identity() {
        let series = five_minute_series(30);
        let out = resample(&series, Some(Timeframe::minutes(5)), Timeframe::minutes(5)).unwrap();
        assert_eq!(out, series);
    }

    #[test]
    fn real_volume_sums_and_spread_takes_last() {
        let mut series = five_minute_series(3).into_bars();
        for (i, bar) in series.iter_mut().enumerate() {
            bar.spread = Some(i as i32);
            bar.real_volume = Some(10);
        }
        let series = BarSeries::new("B", series).unwrap();
        let out = resample(&series, None, Timeframe::minutes(15)).unwrap();
        assert_eq!(out.bars()[0].spread, Some(2));
        assert_eq!(out.bars()[0].real_volume, Some(30));
    }

    #[test]
    fn frame_resample_keeps_chart_layout() {
        let df = series_to_frame(&five_minute_series(12), Purpose::Chart).unwrap();
        let source = Some(Timeframe::minutes(5));
        let out = resample_frame(&df, source, Timeframe::minutes(30)).unwrap();
        assert_eq!(out.height(), 2);
        assert!(out.column("time").is_ok());
        assert!(out.column("volume").is_ok());
    }

    #[test]
    fn frame_without_timestamp_is_column_not_found() {
        let df = df!(
            "Open" => &[1.0],
            "High" => &[1.0],
            "Low" => &[1.0],
            "Close" => &[1.0],
            "Volume" => &[1.0]
        )
        .unwrap();
        assert!(matches!(
            resample_frame(&df, None, Timeframe::hours(1)),
            Err(DataError::ColumnNotFound(_))
        ));
    }
}
