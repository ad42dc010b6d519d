//! # nanobroker
//!
//! A deterministic, bar-driven broker simulator for backtesting trading strategies.
//!
//! ## Features
//!
//! - **Order types**: Market, Close, Limit, Stop, StopLimit, StopTrail, StopTrailLimit
//! - **Validity**: Good-till-cancelled, Day, or an explicit expiry time
//! - **Order groups**: OCO (one-cancels-others) and bracket orders with deferred transmission
//! - **Accounting**: cash, positions, commissions, futures margin, mark-to-market,
//!   leverage, credit interest and fund-share valuation
//! - **Realism knobs**: slippage, cheat-on-close / cheat-on-open, volume-limited fills
//!
//! ## Quick Start
//!
//! ```
//! use chrono::NaiveDate;
//! use nanobroker::{Bar, BrokerSimulator, CommissionInfo, CommissionScheme, OrderRequest, Symbol};
//!
//! let spy = Symbol::new("SPY");
//! let mut broker = BrokerSimulator::builder()
//!     .cash(100_000.0)
//!     .instrument_with(spy, CommissionInfo::stock(CommissionScheme::PerUnit { amount: 0.01 }))
//!     .build()
//!     .unwrap();
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap().and_hms_opt(16, 0, 0).unwrap();
//! broker.step(&[(spy, Bar::new(day(1), 500.0, 505.0, 498.0, 503.0, 1e7))]);
//!
//! // Buy 100 below the market; it fills once a bar trades through 499.
//! broker.buy(OrderRequest::limit(spy, 100, 499.0)).unwrap();
//! broker.step(&[(spy, Bar::new(day(4), 502.0, 504.0, 497.0, 501.0, 1e7))]);
//!
//! assert_eq!(broker.position(spy).size, 100);
//! assert_eq!(broker.position(spy).price, 499.0);
//! assert_eq!(broker.cash(), 100_000.0 - 49_900.0 - 1.0);
//! ```
//!
//! ## Brackets
//!
//! A parent held with `transmit(false)` and two children: the children wait
//! until the parent completes and cancel each other.
//!
//! ```
//! use chrono::NaiveDate;
//! use nanobroker::{Bar, BrokerSimulator, CommissionInfo, OrderRequest, OrderStatus, Symbol};
//!
//! let es = Symbol::new("ES");
//! let mut broker = BrokerSimulator::builder()
//!     .default_commission(CommissionInfo::zero())
//!     .instrument(es)
//!     .build()
//!     .unwrap();
//! let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap().and_hms_opt(16, 0, 0).unwrap();
//! broker.step(&[(es, Bar::new(day(1), 100.0, 100.0, 100.0, 100.0, 1e6))]);
//!
//! let entry = broker.buy(OrderRequest::market(es, 10).transmit(false)).unwrap();
//! let stop = broker.sell(OrderRequest::stop(es, 10, 95.0).parent(entry).transmit(false)).unwrap();
//! let target = broker.sell(OrderRequest::limit(es, 10, 110.0).parent(entry)).unwrap();
//!
//! broker.step(&[(es, Bar::new(day(4), 100.0, 101.0, 99.0, 100.0, 1e6))]);
//! broker.step(&[(es, Bar::new(day(5), 104.0, 112.0, 103.0, 111.0, 1e6))]);
//!
//! assert_eq!(broker.order(target).unwrap().status, OrderStatus::Completed);
//! assert_eq!(broker.order(stop).unwrap().status, OrderStatus::Canceled);
//! assert!(broker.position(es).is_flat());
//! ```
//!
//! ## Configuration
//!
//! A broker can also be built from a TOML file, see [`BrokerConfig`].

mod bar;
mod broker;
mod commission;
pub mod config;
mod error;
pub mod filler;
mod history;
mod notification;
mod order;
#[cfg(feature = "persistence")]
pub mod persistence;
mod position;
mod side;
mod slippage;
mod types;
mod validity;

// Re-export public API
pub use bar::{Bar, BarHistory};
pub use broker::{BrokerBuilder, BrokerParams, BrokerSimulator};
pub use commission::{AutoMargin, CommissionInfo, CommissionScheme, TieredFees};
pub use config::BrokerConfig;
pub use error::{ConfigError, OrderError};
pub use filler::{BarPointPerc, FixedBarPerc, FixedSize, VolumeFiller};
pub use history::{FundHistoryEntry, HistoricalOrder};
pub use notification::Notification;
pub use order::{
    CreatedData, ExecutedData, Execution, Order, OrderKind, OrderRequest, OrderStatus, Trail,
};
pub use position::{Position, PositionUpdate};
pub use side::Side;
pub use slippage::{SlipKind, Slippage};
pub use types::{OrderId, Quantity, Symbol, Timestamp};
pub use validity::Validity;
