//! Edge-case tests: adversarial inputs to every public API.

use chrono::NaiveDate;
use nanobroker::{
    Bar, BrokerConfig, BrokerSimulator, CommissionInfo, ConfigError, HistoricalOrder, OrderError,
    OrderId, OrderKind, OrderRequest, OrderStatus, Symbol, Timestamp, Trail,
};

fn ts(day: u32) -> Timestamp {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap()
}

fn sym() -> Symbol {
    Symbol::new("IBM")
}

fn flat(symbol: Symbol, day: u32, price: f64) -> (Symbol, Bar) {
    (symbol, Bar::new(ts(day), price, price, price, price, 1e6))
}

fn broker() -> BrokerSimulator {
    BrokerSimulator::builder()
        .cash(10_000.0)
        .default_commission(CommissionInfo::zero())
        .instrument(sym())
        .build()
        .unwrap()
}

// ============================================================================
// Empty broker operations
// ============================================================================

#[test]
fn cancel_nonexistent_order() {
    let mut b = broker();
    assert!(!b.cancel(OrderId(999)));
}

#[test]
fn step_without_bars() {
    let mut b = broker();
    b.step(&[]);
    assert_eq!(b.current_step(), 1);
    assert_eq!(b.value(), 10_000.0);
    assert!(b.bar(sym(), 0).is_none());
}

#[test]
fn queries_on_unknown_instrument() {
    let b = broker();
    let other = Symbol::new("NONE");
    assert!(b.position(other).is_flat());
    assert!(b.commission_info(other).is_none());
    assert!(b.bar(other, 0).is_none());
    assert_eq!(b.value_of(&[other], true), 0.0);
}

#[test]
fn bar_offsets_out_of_range() {
    let mut b = broker();
    b.step(&[flat(sym(), 1, 10.0)]);
    assert!(b.bar(sym(), 1).is_none());
    assert!(b.bar(sym(), -1).is_none());
    assert_eq!(b.bar(sym(), 0).unwrap().close, 10.0);
}

// ============================================================================
// Invalid requests
// ============================================================================

#[test]
fn invalid_prices_are_rejected_up_front() {
    let mut b = broker();
    assert!(matches!(
        b.buy(OrderRequest::limit(sym(), 1, f64::NAN)),
        Err(OrderError::InvalidPrice(p)) if p.is_nan()
    ));
    assert!(matches!(
        b.buy(OrderRequest::limit(sym(), 1, -1.0)),
        Err(OrderError::InvalidPrice(_))
    ));
    assert!(matches!(
        b.buy(OrderRequest::stop_trail(sym(), 1, Trail::Percent(0.0))),
        Err(OrderError::InvalidTrail(_))
    ));
    assert!(b.open_orders().is_empty());
}

#[test]
fn quantity_beyond_signed_range_is_rejected() {
    let mut b = broker();
    b.step(&[flat(sym(), 1, 10.0)]);
    for size in [u64::MAX, i64::MAX as u64 + 1] {
        assert_eq!(
            b.buy(OrderRequest::market(sym(), size)),
            Err(OrderError::QuantityTooLarge(size))
        );
        assert_eq!(
            b.sell(OrderRequest::limit(sym(), size, 10.0)),
            Err(OrderError::QuantityTooLarge(size))
        );
    }
    b.step(&[flat(sym(), 2, 10.0)]);
    assert!(b.open_orders().is_empty());
    assert!(b.position(sym()).is_flat());
    assert_eq!(b.cash(), 10_000.0);
    assert_eq!(b.buy(OrderRequest::market(sym(), 1)).unwrap(), OrderId(1));
}

#[test]
fn trailing_stop_needs_a_reference_price() {
    let mut b = broker();
    let err = b
        .sell(OrderRequest::stop_trail(sym(), 1, Trail::Amount(1.0)))
        .unwrap_err();
    assert_eq!(err, OrderError::MissingPrice { kind: OrderKind::StopTrail });
}

#[test]
fn bracket_child_on_other_instrument() {
    let other = Symbol::new("MSFT");
    let mut b = BrokerSimulator::builder()
        .default_commission(CommissionInfo::zero())
        .instrument(sym())
        .instrument(other)
        .build()
        .unwrap();
    let parent = b.buy(OrderRequest::limit(sym(), 1, 10.0).transmit(false)).unwrap();
    let err = b
        .sell(OrderRequest::stop(other, 1, 9.0).parent(parent))
        .unwrap_err();
    assert_eq!(
        err,
        OrderError::ParentInstrumentMismatch {
            expected: sym(),
            got: other
        }
    );
    // the failed child does not transmit the held parent
    assert_eq!(b.order(parent).unwrap().status, OrderStatus::Created);
}

#[test]
fn failed_submission_does_not_consume_an_id() {
    let mut b = broker();
    assert!(b.buy(OrderRequest::market(sym(), 0)).is_err());
    assert_eq!(b.buy(OrderRequest::market(sym(), 1)).unwrap(), OrderId(1));
}

// ============================================================================
// Lifecycle corners
// ============================================================================

#[test]
fn cancel_after_completion_fails() {
    let mut b = broker();
    b.step(&[flat(sym(), 1, 10.0)]);
    let id = b.buy(OrderRequest::market(sym(), 1)).unwrap();
    b.step(&[flat(sym(), 2, 10.0)]);
    assert_eq!(b.order(id).unwrap().status, OrderStatus::Completed);
    assert!(!b.cancel(id));
}

#[test]
fn orders_wait_for_their_instrument_bar() {
    let other = Symbol::new("MSFT");
    let mut b = BrokerSimulator::builder()
        .cash(10_000.0)
        .default_commission(CommissionInfo::zero())
        .instrument(sym())
        .instrument(other)
        .build()
        .unwrap();
    b.step(&[flat(sym(), 1, 10.0), flat(other, 1, 20.0)]);
    let id = b.buy(OrderRequest::market(other, 1)).unwrap();
    b.step(&[flat(sym(), 2, 10.0)]);
    assert_eq!(b.order(id).unwrap().status, OrderStatus::Accepted);
    b.step(&[flat(sym(), 3, 10.0), flat(other, 3, 21.0)]);
    assert_eq!(b.order(id).unwrap().executed.price, 21.0);
}

#[test]
fn short_sale_with_shortcash_adds_cash() {
    let mut b = broker();
    b.step(&[flat(sym(), 1, 10.0)]);
    b.sell(OrderRequest::market(sym(), 100)).unwrap();
    b.step(&[flat(sym(), 2, 10.0)]);
    assert_eq!(b.position(sym()).size, -100);
    assert_eq!(b.cash(), 11_000.0);
    assert_eq!(b.value(), 10_000.0);
}

#[test]
fn zero_size_history_entries_are_skipped() {
    let mut b = broker();
    b.add_order_history(
        [HistoricalOrder {
            timestamp: ts(1),
            symbol: sym(),
            size: 0,
            price: 10.0,
        }],
        true,
    );
    b.step(&[flat(sym(), 1, 10.0)]);
    assert!(b.drain_notifications().is_empty());
    assert!(b.order(OrderId(1)).is_none());
}

#[test]
fn set_cash_mid_run_keeps_fund_shares() {
    let mut b = broker();
    b.step(&[flat(sym(), 1, 10.0)]);
    b.set_cash(20_000.0);
    assert_eq!(b.fund_shares(), 100.0);
    assert_eq!(b.cash(), 20_000.0);
}

#[test]
fn withdrawal_reduces_fund_shares() {
    let mut b = broker();
    b.add_cash(-2_000.0);
    b.step(&[flat(sym(), 1, 10.0)]);
    assert_eq!(b.cash(), 8_000.0);
    assert_eq!(b.fund_shares(), 80.0);
    assert_eq!(b.fund_value(), 100.0);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn leverage_below_one_is_a_config_error() {
    let err = BrokerSimulator::builder()
        .instrument_with(sym(), CommissionInfo::zero().with_leverage(0.5))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn config_without_commission_for_instrument() {
    let config = BrokerConfig::from_toml_str("[broker]\ncash = 100.0\n").unwrap();
    let err = BrokerSimulator::from_config(&config, &[sym()]).unwrap_err();
    assert!(matches!(err, ConfigError::MissingCommission(_)));
}

#[test]
fn malformed_config_is_a_parse_error() {
    assert!(matches!(
        BrokerConfig::from_toml_str("[broker\ncash = 1"),
        Err(ConfigError::Parse(_))
    ));
}
