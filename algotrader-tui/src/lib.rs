//! AlgoTrader chart - terminal candle chart over stored bar files.
//!
//! Provides:
//! - Symbol search over the configured data directory
//! - Timeframe switching across the chart timeframes
//! - Day-by-day navigation and a full-range reset

pub mod app;
pub mod input;
pub mod panels;
pub mod theme;
pub mod ui;

pub use app::ChartApp;
pub use input::handle_key;
pub use theme::Theme;

#[cfg(test)]
mod test_helpers;
