//! Per-kind matching rules against one bar.
//!
//! Each rule decides whether an order trades on the bar and at which price.
//! Rules may update order flags (stop-limit trigger, close annotation) but
//! never touch positions or cash; the broker executes the returned [`Fill`].

use crate::order::{Order, OrderKind};
use crate::slippage::Slippage;
use crate::{Bar, Side, Timestamp};

/// A matched price for an order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Fill {
    pub price: f64,
    /// Bar the fill belongs to: 0 = current, -1 = previous
    pub ago: i32,
    /// Execution time override (cheat-on-close stamps the creation time)
    pub timestamp: Option<Timestamp>,
}

impl Fill {
    fn at(price: f64) -> Self {
        Self {
            price,
            ago: 0,
            timestamp: None,
        }
    }
}

/// Matching toggles shared by all rules.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MatchContext<'a> {
    pub slippage: &'a Slippage,
    pub coc: bool,
    pub coo: bool,
}

fn after_creation(order: &Order, bar: &Bar) -> bool {
    order.created.timestamp.is_none_or(|created| bar.timestamp > created)
}

/// Bar extreme a slipped price must not cross.
fn bound(side: Side, bar: &Bar) -> f64 {
    match side {
        Side::Buy => bar.high,
        Side::Sell => bar.low,
    }
}

/// Try to match `order` on `bar`.
pub(crate) fn try_match(order: &mut Order, bar: &Bar, ctx: &MatchContext<'_>) -> Option<Fill> {
    match order.kind {
        OrderKind::Market => market(order, bar, ctx),
        OrderKind::Close => close(order, bar),
        OrderKind::Limit => limit(order.side, bar, order.created.price, ctx.slippage),
        OrderKind::StopLimit | OrderKind::StopTrailLimit if order.triggered => {
            let plimit = order.created.price_limit?;
            limit(order.side, bar, plimit, ctx.slippage)
        }
        OrderKind::Stop | OrderKind::StopTrail => stop(order.side, bar, order.created.price, ctx.slippage),
        OrderKind::StopLimit | OrderKind::StopTrailLimit => stop_limit(order, bar, ctx.slippage),
        OrderKind::Historical => Some(Fill::at(order.created.price)),
    }
}

fn market(order: &Order, bar: &Bar, ctx: &MatchContext<'_>) -> Option<Fill> {
    // cheat-on-close needs a creation bar; without one the order waits for an open
    let (price, timestamp) = if ctx.coc && order.created.timestamp.is_some() {
        (order.created.prev_close, order.created.timestamp)
    } else {
        if !ctx.coo && !after_creation(order, bar) {
            return None;
        }
        (bar.open, None)
    };
    let price = ctx
        .slippage
        .slip(order.side, price, bound(order.side, bar), true, false)?;
    Some(Fill {
        price,
        ago: 0,
        timestamp,
    })
}

fn close(order: &mut Order, bar: &Bar) -> Option<Fill> {
    if after_creation(order, bar) {
        let past_session = order
            .created
            .timestamp
            .is_none_or(|created| bar.timestamp.date() > created.date());
        if past_session || bar.end_of_session {
            if past_session {
                if let Some(annotated) = order.close_annotation {
                    return Some(Fill {
                        price: annotated,
                        ago: -1,
                        timestamp: None,
                    });
                }
            }
            return Some(Fill::at(bar.close));
        }
    }
    order.close_annotation = Some(bar.close);
    None
}

fn limit(side: Side, bar: &Bar, plimit: f64, slippage: &Slippage) -> Option<Fill> {
    let price = match side {
        Side::Buy if plimit >= bar.open => {
            slippage.slip(side, bar.open, bar.high.min(plimit), true, true)?
        }
        Side::Buy if plimit >= bar.low => plimit,
        Side::Sell if plimit <= bar.open => {
            slippage.slip(side, bar.open, bar.low.max(plimit), true, true)?
        }
        Side::Sell if plimit <= bar.high => plimit,
        _ => return None,
    };
    Some(Fill::at(price))
}

fn stop(side: Side, bar: &Bar, pstop: f64, slippage: &Slippage) -> Option<Fill> {
    let gapped = match side {
        Side::Buy => bar.open >= pstop,
        Side::Sell => bar.open <= pstop,
    };
    let touched = match side {
        Side::Buy => bar.high >= pstop,
        Side::Sell => bar.low <= pstop,
    };
    let price = if gapped {
        slippage.slip(side, bar.open, bound(side, bar), true, false)?
    } else if touched {
        slippage.slip(side, pstop, bound(side, bar), false, false)?
    } else {
        return None;
    };
    Some(Fill::at(price))
}

fn stop_limit(order: &mut Order, bar: &Bar, slippage: &Slippage) -> Option<Fill> {
    let side = order.side;
    let pstop = order.created.price;
    let plimit = order.created.price_limit?;

    match side {
        Side::Buy if bar.open >= pstop => {
            order.triggered = true;
            limit(side, bar, plimit, slippage)
        }
        Side::Buy if bar.high >= pstop => {
            order.triggered = true;
            if plimit >= pstop {
                let price = slippage.slip(side, pstop, bar.high, false, true)?;
                Some(Fill::at(price))
            } else if bar.open > bar.close && plimit >= bar.close {
                Some(Fill::at(plimit))
            } else {
                None
            }
        }
        Side::Sell if bar.open <= pstop => {
            order.triggered = true;
            limit(side, bar, plimit, slippage)
        }
        Side::Sell if bar.low <= pstop => {
            order.triggered = true;
            if plimit <= pstop {
                let price = slippage.slip(side, pstop, bar.low, false, true)?;
                Some(Fill::at(price))
            } else if bar.open <= bar.close && plimit <= bar.close {
                Some(Fill::at(plimit))
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderId, OrderRequest, Symbol, Trail};
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn bar(day: u32, o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar::new(ts(day, 16), o, h, l, c, 1_000.0)
    }

    fn order(side: Side, req: OrderRequest) -> Order {
        Order::new(OrderId(1), side, req, Some(100.0), Some(ts(1, 16))).unwrap()
    }

    fn sym() -> Symbol {
        Symbol::new("T")
    }

    fn run(order: &mut Order, bar: &Bar) -> Option<Fill> {
        let slip = Slippage::default();
        let ctx = MatchContext {
            slippage: &slip,
            coc: false,
            coo: false,
        };
        try_match(order, bar, &ctx)
    }

    fn price(fill: Option<Fill>) -> Option<f64> {
        fill.map(|f| f.price)
    }

    // ========================================================================
    // Market
    // ========================================================================

    #[test]
    fn market_waits_for_next_bar() {
        let mut o = order(Side::Buy, OrderRequest::market(sym(), 1));
        assert_eq!(run(&mut o, &bar(1, 101.0, 102.0, 99.0, 100.0)), None);
        assert_eq!(price(run(&mut o, &bar(2, 101.0, 102.0, 99.0, 100.0))), Some(101.0));
    }

    #[test]
    fn market_cheat_on_open_same_bar() {
        let mut o = order(Side::Buy, OrderRequest::market(sym(), 1));
        let slip = Slippage::default();
        let ctx = MatchContext {
            slippage: &slip,
            coc: false,
            coo: true,
        };
        let fill = try_match(&mut o, &bar(1, 101.0, 102.0, 99.0, 100.0), &ctx);
        assert_eq!(price(fill), Some(101.0));
    }

    #[test]
    fn market_cheat_on_close_uses_creation_close() {
        let mut o = order(Side::Sell, OrderRequest::market(sym(), 1));
        let slip = Slippage::default();
        let ctx = MatchContext {
            slippage: &slip,
            coc: true,
            coo: false,
        };
        let fill = try_match(&mut o, &bar(2, 90.0, 95.0, 85.0, 92.0), &ctx).unwrap();
        assert_eq!(fill.price, 100.0);
        assert_eq!(fill.timestamp, Some(ts(1, 16)));
    }

    #[test]
    fn market_cheat_on_close_without_creation_bar_uses_open() {
        let mut o = Order::new(OrderId(1), Side::Buy, OrderRequest::market(sym(), 1), None, None).unwrap();
        let slip = Slippage::default();
        let ctx = MatchContext {
            slippage: &slip,
            coc: true,
            coo: false,
        };
        let fill = try_match(&mut o, &bar(1, 101.0, 102.0, 99.0, 100.0), &ctx).unwrap();
        assert_eq!(fill.price, 101.0);
        assert_eq!(fill.timestamp, None);
    }

    #[test]
    fn market_slip_clamped_to_high() {
        let mut o = order(Side::Buy, OrderRequest::market(sym(), 1));
        let slip = Slippage {
            slip_open: true,
            ..Slippage::fixed(5.0)
        };
        let ctx = MatchContext {
            slippage: &slip,
            coc: false,
            coo: false,
        };
        let fill = try_match(&mut o, &bar(2, 100.0, 102.0, 99.0, 101.0), &ctx);
        assert_eq!(price(fill), Some(102.0));
    }

    // ========================================================================
    // Close
    // ========================================================================

    #[test]
    fn close_fills_on_end_of_session_bar() {
        let req = OrderRequest::close(sym(), 1);
        let mut o = Order::new(OrderId(1), Side::Buy, req, Some(100.0), Some(ts(1, 10))).unwrap();
        let mid = Bar::new(ts(1, 12), 100.0, 101.0, 99.0, 100.5, 10.0);
        assert_eq!(run(&mut o, &mid), None);
        assert_eq!(o.close_annotation, Some(100.5));
        let eos = Bar::new(ts(1, 16), 100.0, 101.0, 99.0, 100.8, 10.0).with_end_of_session();
        let fill = run(&mut o, &eos).unwrap();
        assert_eq!(fill.price, 100.8);
        assert_eq!(fill.ago, 0);
    }

    #[test]
    fn close_next_session_uses_annotation() {
        let req = OrderRequest::close(sym(), 1);
        let mut o = Order::new(OrderId(1), Side::Buy, req, Some(100.0), Some(ts(1, 10))).unwrap();
        let last = Bar::new(ts(1, 16), 100.0, 101.0, 99.0, 100.7, 10.0);
        assert_eq!(run(&mut o, &last), None);
        let fill = run(&mut o, &bar(2, 102.0, 103.0, 101.0, 102.5)).unwrap();
        assert_eq!(fill.price, 100.7);
        assert_eq!(fill.ago, -1);
    }

    #[test]
    fn close_next_session_without_annotation_uses_current() {
        let mut o = order(Side::Buy, OrderRequest::close(sym(), 1));
        let fill = run(&mut o, &bar(2, 102.0, 103.0, 101.0, 102.5)).unwrap();
        assert_eq!(fill.price, 102.5);
        assert_eq!(fill.ago, 0);
    }

    // ========================================================================
    // Limit
    // ========================================================================

    #[test]
    fn limit_buy_no_gap_fills_at_limit() {
        let mut o = order(Side::Buy, OrderRequest::limit(sym(), 1, 100.0));
        assert_eq!(price(run(&mut o, &bar(2, 105.0, 108.0, 99.0, 102.0))), Some(100.0));
    }

    #[test]
    fn limit_buy_gap_fills_at_open() {
        let mut o = order(Side::Buy, OrderRequest::limit(sym(), 1, 100.0));
        assert_eq!(price(run(&mut o, &bar(2, 95.0, 97.0, 94.0, 96.0))), Some(95.0));
    }

    #[test]
    fn limit_buy_not_reached() {
        let mut o = order(Side::Buy, OrderRequest::limit(sym(), 1, 100.0));
        assert_eq!(run(&mut o, &bar(2, 105.0, 108.0, 101.0, 102.0)), None);
    }

    #[test]
    fn limit_sell_symmetric() {
        let mut o = order(Side::Sell, OrderRequest::limit(sym(), 1, 100.0));
        assert_eq!(price(run(&mut o, &bar(2, 95.0, 101.0, 94.0, 96.0))), Some(100.0));
        assert_eq!(price(run(&mut o, &bar(3, 104.0, 106.0, 103.0, 105.0))), Some(104.0));
        assert_eq!(run(&mut o, &bar(4, 95.0, 99.0, 94.0, 96.0)), None);
    }

    #[test]
    fn limit_gap_slip_never_worse_than_limit() {
        let mut o = order(Side::Buy, OrderRequest::limit(sym(), 1, 100.0));
        let slip = Slippage {
            slip_open: true,
            ..Slippage::fixed(10.0)
        };
        let ctx = MatchContext {
            slippage: &slip,
            coc: false,
            coo: false,
        };
        let fill = try_match(&mut o, &bar(2, 95.0, 120.0, 94.0, 110.0), &ctx);
        assert_eq!(price(fill), Some(100.0));
    }

    // ========================================================================
    // Stop
    // ========================================================================

    #[test]
    fn stop_buy_gap_uses_open() {
        let mut o = order(Side::Buy, OrderRequest::stop(sym(), 1, 105.0));
        assert_eq!(price(run(&mut o, &bar(2, 107.0, 110.0, 106.0, 108.0))), Some(107.0));
    }

    #[test]
    fn stop_buy_intrabar_uses_stop() {
        let mut o = order(Side::Buy, OrderRequest::stop(sym(), 1, 105.0));
        assert_eq!(price(run(&mut o, &bar(2, 101.0, 106.0, 100.0, 103.0))), Some(105.0));
    }

    #[test]
    fn stop_sell_symmetric() {
        let mut o = order(Side::Sell, OrderRequest::stop(sym(), 1, 95.0));
        assert_eq!(run(&mut o, &bar(2, 99.0, 101.0, 96.0, 97.0)), None);
        assert_eq!(price(run(&mut o, &bar(3, 99.0, 101.0, 94.0, 97.0))), Some(95.0));
        assert_eq!(price(run(&mut o, &bar(4, 93.0, 94.0, 90.0, 91.0))), Some(93.0));
    }

    #[test]
    fn trailing_stop_matches_its_current_stop() {
        let req = OrderRequest::stop_trail(sym(), 1, Trail::Amount(5.0));
        let mut o = order(Side::Sell, req);
        assert_eq!(o.created.price, 95.0);
        assert_eq!(price(run(&mut o, &bar(2, 97.0, 98.0, 94.0, 96.0))), Some(95.0));
    }

    // ========================================================================
    // StopLimit
    // ========================================================================

    #[test]
    fn stop_limit_gap_runs_limit_rule() {
        let mut o = order(Side::Buy, OrderRequest::stop_limit(sym(), 1, 105.0, 108.0));
        let fill = run(&mut o, &bar(2, 106.0, 110.0, 105.5, 109.0));
        assert!(o.triggered);
        assert_eq!(price(fill), Some(106.0));
    }

    #[test]
    fn stop_limit_gap_above_limit_waits() {
        let mut o = order(Side::Buy, OrderRequest::stop_limit(sym(), 1, 105.0, 106.0));
        assert_eq!(run(&mut o, &bar(2, 110.0, 112.0, 109.0, 111.0)), None);
        assert!(o.triggered);
        // now an active limit at 106
        assert_eq!(price(run(&mut o, &bar(3, 108.0, 109.0, 105.0, 107.0))), Some(106.0));
    }

    #[test]
    fn stop_limit_buy_intrabar_limit_above_stop_fills_at_stop() {
        let mut o = order(Side::Buy, OrderRequest::stop_limit(sym(), 1, 105.0, 107.0));
        assert_eq!(price(run(&mut o, &bar(2, 101.0, 106.0, 100.0, 103.0))), Some(105.0));
    }

    #[test]
    fn stop_limit_buy_falling_bar_fills_at_limit() {
        // open > close, limit below stop but above close
        let mut o = order(Side::Buy, OrderRequest::stop_limit(sym(), 1, 105.0, 104.0));
        assert_eq!(price(run(&mut o, &bar(2, 104.5, 106.0, 101.0, 102.0))), Some(104.0));
    }

    #[test]
    fn stop_limit_buy_rising_bar_limit_below_stop_no_fill() {
        let mut o = order(Side::Buy, OrderRequest::stop_limit(sym(), 1, 105.0, 104.0));
        assert_eq!(run(&mut o, &bar(2, 101.0, 106.0, 100.0, 103.0)), None);
        assert!(o.triggered);
    }

    #[test]
    fn stop_limit_sell_rising_bar_fills_at_limit() {
        // open <= close, limit above stop but below close
        let mut o = order(Side::Sell, OrderRequest::stop_limit(sym(), 1, 95.0, 96.0));
        assert_eq!(price(run(&mut o, &bar(2, 95.5, 99.0, 94.0, 98.0))), Some(96.0));
    }

    #[test]
    fn stop_limit_sell_limit_below_stop_fills_at_stop() {
        let mut o = order(Side::Sell, OrderRequest::stop_limit(sym(), 1, 95.0, 94.0));
        assert_eq!(price(run(&mut o, &bar(2, 97.0, 98.0, 93.0, 94.0))), Some(95.0));
    }

    #[test]
    fn historical_fills_at_stored_price() {
        let mut o = Order::historical(OrderId(1), sym(), 3, 42.0, ts(1, 16));
        assert_eq!(price(run(&mut o, &bar(1, 50.0, 51.0, 49.0, 50.0))), Some(42.0));
    }
}
