//! Simple moving average crossover.
//!
//! Buys when flat and the fast SMA of closes is above the slow one; asks for a
//! close whenever the fast SMA drops below the slow one.

use serde_json::Value;

use super::{Strategy, StrategyError};
use crate::domain::{Bar, Position, Signal};

#[derive(Debug, Clone, PartialEq)]
pub struct SmaCross {
    pub n_fast: usize,
    pub n_slow: usize,
    /// Units per entry; `None` sizes to all available equity.
    pub size: Option<f64>,
}

impl SmaCross {
    pub fn new(n_fast: usize, n_slow: usize) -> Result<Self, StrategyError> {
        if n_fast == 0 {
            return Err(StrategyError::InvalidParameters(
                "n_fast must be >= 1".into(),
            ));
        }
        if n_slow <= n_fast {
            return Err(StrategyError::InvalidParameters(format!(
                "n_slow ({n_slow}) must be > n_fast ({n_fast})"
            )));
        }
        Ok(Self {
            n_fast,
            n_slow,
            size: Some(1.0),
        })
    }

    pub fn with_size(mut self, size: Option<f64>) -> Self {
        self.size = size;
        self
    }
}

impl Default for SmaCross {
    fn default() -> Self {
        Self {
            n_fast: 10,
            n_slow: 20,
            size: Some(1.0),
        }
    }
}

impl Strategy for SmaCross {
    fn generate_signal(
        &mut self,
        window: &[Bar],
        position: &Position,
        _custom_state: Option<&Value>,
    ) -> Option<Signal> {
        let fast = sma(window, self.n_fast)?;
        let slow = sma(window, self.n_slow)?;

        if fast > slow && position.is_flat() {
            let signal = Signal::buy();
            Some(match self.size {
                Some(size) => signal.with_size(size),
                None => signal,
            })
        } else if fast < slow {
            Some(Signal::close())
        } else {
            None
        }
    }

    fn name(&self) -> &str {
        "sma_cross"
    }
}

/// Mean close of the last `period` bars; `None` with too little history or a
/// NaN close in the window.
pub fn sma(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    if window.iter().any(|b| b.close.is_nan()) {
        return None;
    }
    Some(window.iter().map(|b| b.close).sum::<f64>() / period as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use chrono::{Duration, TimeZone, Utc};

    fn make_bars(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(t0 + Duration::minutes(5 * i as i64), c, c, c, c, 1.0))
            .collect()
    }

    #[test]
    fn sma_basic() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        assert_eq!(sma(&bars[..5], 5), Some(12.0));
        assert_eq!(sma(&bars, 5), Some(14.0));
        assert_eq!(sma(&bars[..4], 5), None);
        assert_eq!(sma(&bars, 1), Some(16.0));
    }

    #[test]
    fn sma_nan_in_window_is_none() {
        let bars = make_bars(&[1.0, f64::NAN, 3.0]);
        assert_eq!(sma(&bars, 3), None);
        assert_eq!(sma(&bars, 1), Some(3.0));
    }

    #[test]
    fn insufficient_history_is_no_action() {
        let mut s = SmaCross::new(2, 4).unwrap();
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        assert!(s.generate_signal(&bars, &Position::flat(), None).is_none());
    }

    #[test]
    fn rising_prices_buy_when_flat_only() {
        let mut s = SmaCross::new(2, 4).unwrap();
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let signal = s.generate_signal(&bars, &Position::flat(), None).unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(signal.size, Some(1.0));

        let long = Position {
            size: 1.0,
            entry_price: 4.0,
            unrealized_pl: 1.0,
        };
        assert!(s.generate_signal(&bars, &long, None).is_none());
    }

    #[test]
    fn falling_prices_close() {
        let mut s = SmaCross::new(2, 4).unwrap();
        let bars = make_bars(&[5.0, 4.0, 3.0, 2.0, 1.0]);
        let signal = s.generate_signal(&bars, &Position::flat(), None).unwrap();
        assert_eq!(signal.direction, Direction::Close);
    }

    #[test]
    fn rejects_bad_periods() {
        assert!(SmaCross::new(0, 5).is_err());
        assert!(SmaCross::new(5, 5).is_err());
        assert!(SmaCross::new(10, 20).is_ok());
    }
}
