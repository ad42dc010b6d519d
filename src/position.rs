//! Position tracking for a single instrument.

use serde::{Deserialize, Serialize};

use crate::{Symbol, Timestamp};

/// Outcome of applying a signed delta to a position.
///
/// `opened` and `closed` both carry the sign of the delta: they are the parts of
/// the delta that opened/increased and closed/reduced the position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub size: i64,
    pub price: f64,
    pub opened: i64,
    pub closed: i64,
}

/// A position in a single instrument.
///
/// `price` is the size-weighted average price of the currently open lot only;
/// closed lots leave no trace in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument this position is for
    pub symbol: Symbol,
    /// Net size: positive = long, negative = short, zero = flat
    pub size: i64,
    /// Average price of the open lot (0 when flat)
    pub price: f64,
    /// Price before the last update
    pub price_orig: f64,
    /// Opened part of the last update
    pub last_opened: i64,
    /// Closed part of the last update
    pub last_closed: i64,
    /// Base price for the next mark-to-market cash adjustment
    pub adjust_base: Option<f64>,
    /// Last execution or interest-accrual time
    pub updated_at: Option<Timestamp>,
}

impl Position {
    /// Create a new flat position for the given instrument.
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            size: 0,
            price: 0.0,
            price_orig: 0.0,
            last_opened: 0,
            last_closed: 0,
            adjust_base: None,
            updated_at: None,
        }
    }

    /// Apply a signed size delta executed at `price`.
    ///
    /// - reducing keeps the price of the remaining lot
    /// - closing to flat zeroes the price
    /// - reversing closes the whole old lot and opens the remainder at `price`
    pub fn update(&mut self, delta: i64, price: f64, ts: Option<Timestamp>) -> PositionUpdate {
        if ts.is_some() {
            self.updated_at = ts;
        }
        self.price_orig = self.price;
        let old = self.size;
        self.size += delta;

        let (opened, closed) = if self.size == 0 {
            self.price = 0.0;
            (0, delta)
        } else if old == 0 {
            self.price = price;
            (delta, 0)
        } else if old > 0 {
            if delta > 0 {
                self.price = (self.price * old as f64 + delta as f64 * price) / self.size as f64;
                (delta, 0)
            } else if self.size > 0 {
                (0, delta)
            } else {
                self.price = price;
                (self.size, -old)
            }
        } else if delta < 0 {
            self.price = (self.price * old as f64 + delta as f64 * price) / self.size as f64;
            (delta, 0)
        } else if self.size < 0 {
            (0, delta)
        } else {
            self.price = price;
            (self.size, -old)
        };

        self.last_opened = opened;
        self.last_closed = closed;
        PositionUpdate {
            size: self.size,
            price: self.price,
            opened,
            closed,
        }
    }

    /// Compute what [`update`](Self::update) would return without mutating.
    pub fn pseudo_update(&self, delta: i64, price: f64) -> PositionUpdate {
        let mut preview = self.clone();
        preview.update(delta, price, None)
    }

    /// Returns true if the position is flat (zero size).
    #[inline]
    pub fn is_flat(&self) -> bool {
        self.size == 0
    }

    /// Unrealized profit at `price`, ignoring contract multipliers.
    #[inline]
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        (price - self.price) * self.size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Position {
        Position::new(Symbol::new("AAPL"))
    }

    #[test]
    fn new_position_is_flat() {
        let p = pos();
        assert!(p.is_flat());
        assert_eq!(p.price, 0.0);
        assert_eq!(p.unrealized_pnl(100.0), 0.0);
    }

    #[test]
    fn open_from_flat() {
        let mut p = pos();
        let up = p.update(10, 100.0, None);
        assert_eq!(up, PositionUpdate { size: 10, price: 100.0, opened: 10, closed: 0 });
    }

    #[test]
    fn increase_uses_weighted_average() {
        let mut p = pos();
        p.update(100, 50.0, None);
        let up = p.update(100, 60.0, None);
        assert_eq!(up.size, 200);
        assert_eq!(up.price, 55.0);
        assert_eq!(up.opened, 100);
        assert_eq!(up.closed, 0);
    }

    #[test]
    fn reduce_keeps_price() {
        let mut p = pos();
        p.update(100, 50.0, None);
        let up = p.update(-40, 70.0, None);
        assert_eq!(up.size, 60);
        assert_eq!(up.price, 50.0);
        assert_eq!(up.opened, 0);
        assert_eq!(up.closed, -40);
        assert_eq!(p.price_orig, 50.0);
    }

    #[test]
    fn close_to_flat_zeroes_price() {
        let mut p = pos();
        p.update(10, 100.0, None);
        let up = p.update(-10, 100.0, None);
        assert_eq!(up, PositionUpdate { size: 0, price: 0.0, opened: 0, closed: -10 });
    }

    #[test]
    fn reversal_long_to_short() {
        let mut p = pos();
        p.update(5, 100.0, None);
        let up = p.update(-8, 90.0, None);
        assert_eq!(up, PositionUpdate { size: -3, price: 90.0, opened: -3, closed: -5 });
    }

    #[test]
    fn reversal_short_to_long() {
        let mut p = pos();
        p.update(-4, 20.0, None);
        let up = p.update(6, 18.0, None);
        assert_eq!(up, PositionUpdate { size: 2, price: 18.0, opened: 2, closed: 4 });
    }

    #[test]
    fn short_increase_weighted() {
        let mut p = pos();
        p.update(-10, 10.0, None);
        let up = p.update(-10, 20.0, None);
        assert_eq!(up.size, -20);
        assert_eq!(up.price, 15.0);
        assert_eq!(up.opened, -10);
    }

    #[test]
    fn pseudo_update_does_not_mutate() {
        let mut p = pos();
        p.update(5, 100.0, None);
        let before = p.clone();
        let up = p.pseudo_update(-8, 90.0);
        assert_eq!(up.size, -3);
        assert_eq!(p, before);
    }

    #[test]
    fn update_records_timestamp_only_when_given() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut p = pos();
        p.update(1, 1.0, Some(ts));
        p.update(1, 1.0, None);
        assert_eq!(p.updated_at, Some(ts));
    }

    #[test]
    fn zero_delta_is_noop() {
        let mut p = pos();
        p.update(10, 50.0, None);
        let up = p.update(0, 60.0, None);
        assert_eq!(up.size, 10);
        assert_eq!(up.price, 50.0);
        assert_eq!(up.opened, 0);
        assert_eq!(up.closed, 0);
    }

    #[test]
    fn unrealized_pnl_short() {
        let mut p = pos();
        p.update(-100, 50.0, None);
        assert_eq!(p.unrealized_pnl(45.0), 500.0);
        assert_eq!(p.unrealized_pnl(55.0), -500.0);
    }
}
