//! Order side and the sign convention for position deltas.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Side of an order. Buys add to a position, sells subtract from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side of a signed size: non-negative sizes are buys.
    #[inline]
    pub fn of(size: i64) -> Self {
        if size >= 0 { Side::Buy } else { Side::Sell }
    }

    /// +1 for buys, -1 for sells.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    /// Apply the side's sign to an unsigned size.
    #[inline]
    pub fn signed(self, size: u64) -> i64 {
        self.sign() * size as i64
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}
