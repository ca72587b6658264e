//! AlgoTrader Core: bar data, the replay engine, strategies and live trading.
//!
//! This crate contains:
//! - Domain types (bars, positions, signals, orders, trades)
//! - The bar normalizer and OHLCV resampler
//! - Providers and stores (Dukascopy, Parquet, Postgres)
//! - The strategy trait and shipped strategies
//! - The simulated ledger and bar-by-bar replay loop
//! - Chart data callbacks and the live-terminal seam

pub mod chart;
pub mod data;
pub mod domain;
pub mod engine;
pub mod live;
pub mod strategy;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: data crossing into the TUI worker or runner threads
    /// is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::BarSeries>();
        require_sync::<domain::BarSeries>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Signal>();
        require_sync::<domain::Signal>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();

        // Data types
        require_send::<data::Timeframe>();
        require_sync::<data::Timeframe>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::DukascopyProvider>();
        require_sync::<data::DukascopyProvider>();
        require_send::<data::ParquetStore>();
        require_sync::<data::ParquetStore>();
        require_send::<chart::ChartConfig>();
        require_sync::<chart::ChartConfig>();

        // Engine types
        require_send::<engine::LedgerConfig>();
        require_sync::<engine::LedgerConfig>();
        require_send::<engine::SimulatedLedger>();
        require_sync::<engine::SimulatedLedger>();
        require_send::<engine::ReplayReport>();
        require_sync::<engine::ReplayReport>();

        // Strategies
        require_send::<strategy::SmaCross>();
        require_sync::<strategy::SmaCross>();
        require_send::<strategy::BuyAndHold>();
        require_sync::<strategy::BuyAndHold>();

        // Live
        require_send::<live::PaperTerminal>();
        require_sync::<live::PaperTerminal>();
        require_send::<live::LiveOrderRequest>();
        require_sync::<live::LiveOrderRequest>();
    }

    /// Architecture contract: strategies never receive the ledger.
    ///
    /// `generate_signal` takes bars, a copied position snapshot and opaque
    /// state. If a ledger parameter is ever added this stops compiling.
    #[test]
    fn strategy_trait_has_no_ledger_parameter() {
        fn _check_trait_object_builds(
            s: &mut dyn strategy::Strategy,
            bars: &[domain::Bar],
            position: &domain::Position,
        ) -> Option<domain::Signal> {
            s.generate_signal(bars, position, None)
        }
    }
}
