//! Domain types: bars, positions, signals, orders, trades.

pub mod bar;
pub mod order;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::{Bar, BarSeries};
pub use order::{OrderRequest, PendingOrder, Side};
pub use position::Position;
pub use signal::{Direction, Signal};
pub use trade::{ExitReason, Trade};
