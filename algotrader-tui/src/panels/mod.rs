//! Chart widgets.

pub mod candle_chart;

pub use candle_chart::{fit_columns, Candle, CandleChartPanel};
