//! Volume fillers: cap how much of an order one bar can absorb.
//!
//! Without a filler an order executes its whole remaining size on the matching
//! bar. With one, the executable size is bounded by the bar's volume and the
//! rest stays working as a partial fill.

use serde::{Deserialize, Serialize};

use crate::{Bar, Order, Quantity};

/// Bounds the size executable for `order` on `bar` at `price`.
pub trait VolumeFiller: std::fmt::Debug {
    /// Executable size, never above `order.remaining()`. Zero means no fill on this bar.
    fn fill_size(&self, order: &Order, price: f64, bar: &Bar) -> Quantity;
}

fn whole(v: f64) -> Quantity {
    if v.is_finite() && v > 0.0 {
        v.floor() as Quantity
    } else {
        0
    }
}

/// Fixed maximum per bar, also capped by the bar volume.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedSize {
    pub size: Quantity,
}

impl VolumeFiller for FixedSize {
    fn fill_size(&self, order: &Order, _price: f64, bar: &Bar) -> Quantity {
        whole(bar.volume).min(order.remaining()).min(self.size)
    }
}

/// A percentage of the bar volume.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedBarPerc {
    /// Percent of volume (0..=100)
    pub perc: f64,
}

impl VolumeFiller for FixedBarPerc {
    fn fill_size(&self, order: &Order, _price: f64, bar: &Bar) -> Quantity {
        whole(bar.volume * self.perc / 100.0).min(order.remaining())
    }
}

/// Spread the bar volume evenly over the price points in its range and take
/// a percentage of one point's share.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarPointPerc {
    /// Minimum price increment
    pub minmov: f64,
    /// Percent of one price point's volume (0..=100)
    pub perc: f64,
}

impl VolumeFiller for BarPointPerc {
    fn fill_size(&self, order: &Order, _price: f64, bar: &Bar) -> Quantity {
        let parts = if self.minmov > 0.0 {
            ((bar.high - bar.low + self.minmov) / self.minmov).floor().max(1.0)
        } else {
            1.0
        };
        whole((bar.volume / parts) * self.perc / 100.0).min(order.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderId, OrderRequest, Side, Symbol};
    use chrono::NaiveDate;

    fn bar(high: f64, low: f64, volume: f64) -> Bar {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap();
        Bar::new(ts, low, high, low, high, volume)
    }

    fn order(size: Quantity) -> Order {
        let req = OrderRequest::market(Symbol::new("X"), size);
        Order::new(OrderId(1), Side::Buy, req, Some(10.0), None).unwrap()
    }

    #[test]
    fn fixed_size_takes_smallest_cap() {
        let f = FixedSize { size: 30 };
        assert_eq!(f.fill_size(&order(100), 10.0, &bar(11.0, 9.0, 1000.0)), 30);
        assert_eq!(f.fill_size(&order(100), 10.0, &bar(11.0, 9.0, 12.0)), 12);
        assert_eq!(f.fill_size(&order(5), 10.0, &bar(11.0, 9.0, 1000.0)), 5);
    }

    #[test]
    fn fixed_bar_perc() {
        let f = FixedBarPerc { perc: 10.0 };
        assert_eq!(f.fill_size(&order(1000), 10.0, &bar(11.0, 9.0, 255.0)), 25);
        assert_eq!(f.fill_size(&order(3), 10.0, &bar(11.0, 9.0, 255.0)), 3);
    }

    #[test]
    fn bar_point_perc_spreads_over_range() {
        // range 9..11 with minmov 0.5 -> 5 price points, 1000 / 5 = 200, 50% = 100
        let f = BarPointPerc { minmov: 0.5, perc: 50.0 };
        assert_eq!(f.fill_size(&order(1000), 10.0, &bar(11.0, 9.0, 1000.0)), 100);
    }

    #[test]
    fn zero_volume_means_no_fill() {
        let f = FixedBarPerc { perc: 100.0 };
        assert_eq!(f.fill_size(&order(10), 10.0, &bar(11.0, 9.0, 0.0)), 0);
    }
}
