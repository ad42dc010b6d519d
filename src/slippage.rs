//! Slippage applied to fill prices.
//!
//! A slipped price that would leave the bar (above the high for buys, below
//! the low for sells) is handled by the matching toggles: clamp to the bar,
//! keep the out-of-bar price, or refuse the fill.

use serde::{Deserialize, Serialize};

use crate::Side;

/// How far a fill price is moved against the trader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum SlipKind {
    /// Fill at the intended price
    #[default]
    None,
    /// `price × (1 ± pct)`
    Percent(f64),
    /// `price ± amount`
    Fixed(f64),
}

/// Slippage model and its matching toggles.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slippage {
    pub kind: SlipKind,
    /// Also slip fills that happen at the bar open
    pub slip_open: bool,
    /// Clamp a slipped price that leaves the bar instead of refusing the fill
    pub slip_match: bool,
    /// Limit fills clamp even when `slip_match` is off
    pub slip_limit: bool,
    /// When clamping, return the out-of-bar slipped price instead of the bound
    pub slip_out: bool,
}

impl Default for Slippage {
    fn default() -> Self {
        Self {
            kind: SlipKind::None,
            slip_open: false,
            slip_match: true,
            slip_limit: true,
            slip_out: false,
        }
    }
}

impl Slippage {
    pub fn percent(pct: f64) -> Self {
        Self {
            kind: SlipKind::Percent(pct),
            ..Self::default()
        }
    }

    pub fn fixed(amount: f64) -> Self {
        Self {
            kind: SlipKind::Fixed(amount),
            ..Self::default()
        }
    }

    /// Slip `price` against `side` within `bound` (bar high for buys, low for sells).
    ///
    /// `at_open` marks fills at the bar open (slipped only with `slip_open`),
    /// `limit` marks limit fills. Returns `None` when the fill is refused.
    pub fn slip(&self, side: Side, price: f64, bound: f64, at_open: bool, limit: bool) -> Option<f64> {
        if at_open && !self.slip_open {
            return Some(price);
        }
        let slipped = match (self.kind, side) {
            (SlipKind::None, _) => return Some(price),
            (SlipKind::Percent(p), Side::Buy) => price * (1.0 + p),
            (SlipKind::Percent(p), Side::Sell) => price * (1.0 - p),
            (SlipKind::Fixed(a), Side::Buy) => price + a,
            (SlipKind::Fixed(a), Side::Sell) => price - a,
        };
        let inside = match side {
            Side::Buy => slipped <= bound,
            Side::Sell => slipped >= bound,
        };
        if inside {
            return Some(slipped);
        }
        if self.slip_match || (limit && self.slip_limit) {
            return Some(if self.slip_out { slipped } else { bound });
        }
        None
    }
}
