use serde::{Deserialize, Serialize};

/// Read-only snapshot of the simulated position.
///
/// `size` is signed: positive long, negative short, zero flat. Long and short
/// are therefore mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub size: f64,
    /// Size-weighted average entry price; 0 when flat.
    pub entry_price: f64,
    pub unrealized_pl: f64,
}

impl Position {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0.0
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }

    /// Unrealized P/L as a fraction of entry value.
    pub fn unrealized_pl_pct(&self) -> f64 {
        let basis = self.entry_price * self.size.abs();
        if basis == 0.0 {
            return 0.0;
        }
        self.unrealized_pl / basis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_sign() {
        let long = Position { size: 3.0, entry_price: 10.0, unrealized_pl: 3.0 };
        assert!(long.is_long() && !long.is_short() && !long.is_flat());
        let short = Position { size: -2.0, ..long };
        assert!(short.is_short() && !short.is_long());
        assert!(Position::flat().is_flat());
        assert!((long.unrealized_pl_pct() - 0.1).abs() < 1e-12);
    }
}
