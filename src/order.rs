//! Order representation and lifecycle.
//!
//! An [`Order`] is built from an [`OrderRequest`] when the broker accepts a
//! `buy`/`sell` call. It carries the creation snapshot used by the matcher, the
//! cumulative execution record, and the small state machine described by
//! [`OrderStatus`]. Transitions out of a terminal state are no-ops returning `false`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::validity::Validity;
use crate::{OrderId, Quantity, Side, Symbol, Timestamp};

/// Status of an order in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Built but not yet handed to the broker (or held untransmitted)
    #[default]
    Created,
    /// Handed to the broker, awaiting the admission check
    Submitted,
    /// Admitted, waiting for a match
    Accepted,
    /// Some quantity executed, remainder still working
    Partial,
    /// Fully executed
    Completed,
    /// Removed by user request or by a group cascade
    Canceled,
    /// A match could not be funded
    Margin,
    /// Failed the admission check, or a bracket child of a dead parent
    Rejected,
    /// Validity elapsed before a complete fill
    Expired,
}

impl OrderStatus {
    /// Returns true if the order can still change state.
    #[inline]
    pub fn is_alive(self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the order is terminal (no further state changes).
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Canceled
                | OrderStatus::Margin
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Execution type of an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    #[default]
    Market,
    Close,
    Limit,
    Stop,
    StopLimit,
    StopTrail,
    StopTrailLimit,
    /// Replayed from an order-history file; fills at its stored price.
    Historical,
}

impl OrderKind {
    /// Kinds that trigger on a stop price and then work as a limit.
    #[inline]
    pub fn is_stop_limit(self) -> bool {
        matches!(self, OrderKind::StopLimit | OrderKind::StopTrailLimit)
    }

    /// Kinds whose stop ratchets with the close.
    #[inline]
    pub fn is_trailing(self) -> bool {
        matches!(self, OrderKind::StopTrail | OrderKind::StopTrailLimit)
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Trailing distance of a trailing stop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trail {
    /// Absolute price distance from the close
    Amount(f64),
    /// Fraction of the close (0.02 = 2%)
    Percent(f64),
}

impl Trail {
    fn value(self) -> f64 {
        match self {
            Trail::Amount(v) | Trail::Percent(v) => v,
        }
    }

    /// Distance from `price` this trail keeps.
    #[inline]
    pub fn distance(self, price: f64) -> f64 {
        match self {
            Trail::Amount(amount) => amount,
            Trail::Percent(pct) => price * pct,
        }
    }
}

/// Parameters of a `buy`/`sell` call.
///
/// Side comes from the call. `price` is the limit price for `Limit` and the
/// stop price for the stop kinds; `price_limit` is the limit of the stop-limit
/// kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub size: Quantity,
    pub kind: OrderKind,
    pub price: Option<f64>,
    pub price_limit: Option<f64>,
    pub trail: Option<Trail>,
    pub validity: Validity,
    /// Bracket parent; makes this order a bracket child
    pub parent: Option<OrderId>,
    /// Any live member of the OCO group to join
    pub oco: Option<OrderId>,
    /// When false the order is held until a later group member transmits
    pub transmit: bool,
}

impl OrderRequest {
    fn with_kind(symbol: Symbol, size: Quantity, kind: OrderKind) -> Self {
        Self {
            symbol,
            size,
            kind,
            price: None,
            price_limit: None,
            trail: None,
            validity: Validity::GoodTillCancel,
            parent: None,
            oco: None,
            transmit: true,
        }
    }

    pub fn market(symbol: Symbol, size: Quantity) -> Self {
        Self::with_kind(symbol, size, OrderKind::Market)
    }

    pub fn close(symbol: Symbol, size: Quantity) -> Self {
        Self::with_kind(symbol, size, OrderKind::Close)
    }

    pub fn limit(symbol: Symbol, size: Quantity, price: f64) -> Self {
        Self {
            price: Some(price),
            ..Self::with_kind(symbol, size, OrderKind::Limit)
        }
    }

    pub fn stop(symbol: Symbol, size: Quantity, stop: f64) -> Self {
        Self {
            price: Some(stop),
            ..Self::with_kind(symbol, size, OrderKind::Stop)
        }
    }

    pub fn stop_limit(symbol: Symbol, size: Quantity, stop: f64, limit: f64) -> Self {
        Self {
            price: Some(stop),
            price_limit: Some(limit),
            ..Self::with_kind(symbol, size, OrderKind::StopLimit)
        }
    }

    /// Trailing stop starting from the last close.
    pub fn stop_trail(symbol: Symbol, size: Quantity, trail: Trail) -> Self {
        Self {
            trail: Some(trail),
            ..Self::with_kind(symbol, size, OrderKind::StopTrail)
        }
    }

    /// Trailing stop-limit; the limit keeps its initial distance to the stop.
    pub fn stop_trail_limit(
        symbol: Symbol,
        size: Quantity,
        stop: f64,
        limit: f64,
        trail: Trail,
    ) -> Self {
        Self {
            price: Some(stop),
            price_limit: Some(limit),
            trail: Some(trail),
            ..Self::with_kind(symbol, size, OrderKind::StopTrailLimit)
        }
    }

    pub fn validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub fn parent(mut self, parent: OrderId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn oco(mut self, member: OrderId) -> Self {
        self.oco = Some(member);
        self
    }

    pub fn transmit(mut self, transmit: bool) -> Self {
        self.transmit = transmit;
        self
    }

    /// Check the request in isolation; group references are checked by the broker.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.size == 0 {
            return Err(OrderError::ZeroQuantity);
        }
        if self.size > i64::MAX as u64 {
            return Err(OrderError::QuantityTooLarge(self.size));
        }
        let needs_price = matches!(
            self.kind,
            OrderKind::Limit | OrderKind::Stop | OrderKind::StopLimit
        );
        if needs_price && self.price.is_none() {
            return Err(OrderError::MissingPrice { kind: self.kind });
        }
        if self.kind.is_stop_limit() && self.price_limit.is_none() {
            return Err(OrderError::MissingLimitPrice { kind: self.kind });
        }
        for p in [self.price, self.price_limit].into_iter().flatten() {
            if !(p.is_finite() && p > 0.0) {
                return Err(OrderError::InvalidPrice(p));
            }
        }
        if self.kind.is_trailing() {
            let trail = self.trail.ok_or(OrderError::MissingTrail { kind: self.kind })?;
            let v = trail.value();
            if !(v.is_finite() && v > 0.0) {
                return Err(OrderError::InvalidTrail(v));
            }
        }
        Ok(())
    }
}

/// Snapshot taken when the order was created.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedData {
    /// Bar time at creation, if any bar had been seen
    pub timestamp: Option<Timestamp>,
    /// Reference price: limit, stop or last close depending on kind
    pub price: f64,
    /// Limit price of the stop-limit kinds
    pub price_limit: Option<f64>,
    /// Last close of the instrument at creation (0 if none)
    pub prev_close: f64,
}

/// One individual fill.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub timestamp: Timestamp,
    /// Signed executed size
    pub size: i64,
    pub price: f64,
    pub closed: i64,
    pub closed_value: f64,
    pub closed_comm: f64,
    pub opened: i64,
    pub opened_value: f64,
    pub opened_comm: f64,
    pub pnl: f64,
    /// Position after this fill
    pub position_size: i64,
    pub position_price: f64,
}

/// Cumulative execution record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutedData {
    pub timestamp: Option<Timestamp>,
    /// Signed cumulative size
    pub size: i64,
    /// Size-weighted average price
    pub price: f64,
    pub value: f64,
    pub comm: f64,
    pub pnl: f64,
    /// Margin per contract at the last fill (non stock-like instruments)
    pub margin: Option<f64>,
    pub bits: Vec<Execution>,
}

/// A broker order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    /// Requested size (unsigned)
    pub size: Quantity,
    pub validity: Validity,
    pub trail: Option<Trail>,
    pub parent: Option<OrderId>,
    pub oco: Option<OrderId>,
    pub transmit: bool,
    pub status: OrderStatus,
    pub created: CreatedData,
    pub executed: ExecutedData,
    /// Bracket children start inactive until the parent completes
    pub active: bool,
    /// Stop-limit kinds: the stop has been hit
    pub triggered: bool,
    /// Close kind: close seen on an earlier bar of the creation session
    pub close_annotation: Option<f64>,
    /// Stop-trail-limit: fixed stop to limit distance
    pub limit_offset: f64,
}

impl Order {
    /// Build an order from a validated request.
    ///
    /// `last_close` and `now` describe the instrument's most recent bar, if any.
    pub fn new(
        id: OrderId,
        side: Side,
        request: OrderRequest,
        last_close: Option<f64>,
        now: Option<Timestamp>,
    ) -> Result<Self, OrderError> {
        request.validate()?;
        let prev_close = last_close.unwrap_or(0.0);

        let price = match request.kind {
            OrderKind::Market | OrderKind::Close | OrderKind::Historical => prev_close,
            OrderKind::StopTrail | OrderKind::StopTrailLimit => request
                .price
                .or(last_close)
                .ok_or(OrderError::MissingPrice { kind: request.kind })?,
            _ => request.price.unwrap_or(prev_close),
        };

        let mut order = Self {
            id,
            symbol: request.symbol,
            side,
            kind: request.kind,
            size: request.size,
            validity: request.validity,
            trail: request.trail,
            parent: request.parent,
            oco: request.oco,
            transmit: request.transmit,
            status: OrderStatus::Created,
            created: CreatedData {
                timestamp: now,
                price,
                price_limit: request.price_limit,
                prev_close,
            },
            executed: ExecutedData::default(),
            active: request.parent.is_none(),
            triggered: false,
            close_annotation: None,
            limit_offset: 0.0,
        };

        if order.kind.is_trailing() {
            if let Some(limit) = order.created.price_limit {
                order.limit_offset = price - limit;
            }
            order.created.price = match side {
                Side::Buy => f64::INFINITY,
                Side::Sell => f64::NEG_INFINITY,
            };
            order.trail_adjust(price);
        }
        Ok(order)
    }

    /// An order replayed from history: signed size, fixed price and time.
    pub fn historical(id: OrderId, symbol: Symbol, size: i64, price: f64, ts: Timestamp) -> Self {
        Self {
            id,
            symbol,
            side: Side::of(size),
            kind: OrderKind::Historical,
            size: size.unsigned_abs(),
            validity: Validity::GoodTillCancel,
            trail: None,
            parent: None,
            oco: None,
            transmit: true,
            status: OrderStatus::Created,
            created: CreatedData {
                timestamp: Some(ts),
                price,
                price_limit: None,
                prev_close: price,
            },
            executed: ExecutedData::default(),
            active: true,
            triggered: false,
            close_annotation: None,
            limit_offset: 0.0,
        }
    }

    #[inline]
    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    /// Unexecuted size (unsigned).
    #[inline]
    pub fn remaining(&self) -> Quantity {
        self.size.saturating_sub(self.executed.size.unsigned_abs())
    }

    /// Unexecuted size carrying the order's sign.
    #[inline]
    pub fn signed_remaining(&self) -> i64 {
        self.side.signed(self.remaining())
    }

    /// Signed requested size.
    #[inline]
    pub fn signed_size(&self) -> i64 {
        self.side.signed(self.size)
    }

    /// Returns true if the validity window has elapsed at `now`.
    /// Market orders never expire.
    pub fn has_expired(&self, now: Timestamp) -> bool {
        if self.kind == OrderKind::Market {
            return false;
        }
        match (self.validity, self.created.timestamp) {
            (Validity::Until(_), created) => self.validity.has_expired(created.unwrap_or(now), now),
            (_, Some(created)) => self.validity.has_expired(created, now),
            (_, None) => false,
        }
    }

    fn transition(&mut self, allowed: bool, to: OrderStatus) -> bool {
        if !allowed || self.status.is_terminal() {
            return false;
        }
        self.status = to;
        true
    }

    /// Created → Submitted
    pub fn submit(&mut self) -> bool {
        let allowed = self.status == OrderStatus::Created;
        self.transition(allowed, OrderStatus::Submitted)
    }

    /// Submitted → Accepted
    pub fn accept(&mut self) -> bool {
        let allowed = self.status == OrderStatus::Submitted;
        self.transition(allowed, OrderStatus::Accepted)
    }

    pub fn reject(&mut self) -> bool {
        self.transition(true, OrderStatus::Rejected)
    }

    pub fn cancel(&mut self) -> bool {
        self.transition(true, OrderStatus::Canceled)
    }

    pub fn expire(&mut self) -> bool {
        self.transition(true, OrderStatus::Expired)
    }

    pub fn margin(&mut self) -> bool {
        self.transition(true, OrderStatus::Margin)
    }

    /// Record a fill and move to Partial or Completed.
    ///
    /// A zero-size execution (the opening leg was not funded) is recorded
    /// without changing status.
    pub fn execute(&mut self, exec: Execution) {
        if self.status.is_terminal() {
            return;
        }
        let ex = &mut self.executed;
        let new_size = ex.size + exec.size;
        if ex.size == 0 {
            ex.price = exec.price;
        } else if new_size != 0 {
            ex.price = (ex.size as f64 * ex.price + exec.size as f64 * exec.price) / new_size as f64;
        }
        ex.size = new_size;
        ex.value += exec.closed_value + exec.opened_value;
        ex.comm += exec.closed_comm + exec.opened_comm;
        ex.pnl += exec.pnl;
        ex.timestamp = Some(exec.timestamp);
        ex.bits.push(exec);

        if exec.size == 0 {
            return;
        }
        self.status = if self.remaining() == 0 {
            OrderStatus::Completed
        } else {
            OrderStatus::Partial
        };
    }

    /// Ratchet the stop of a trailing order from `price`.
    ///
    /// Sell stops only move up, buy stops only move down.
    pub fn trail_adjust(&mut self, price: f64) {
        let Some(trail) = self.trail else {
            return;
        };
        let amount = trail.distance(price);
        let candidate = match self.side {
            Side::Buy => price + amount,
            Side::Sell => price - amount,
        };
        let improves = match self.side {
            Side::Buy => candidate < self.created.price,
            Side::Sell => candidate > self.created.price,
        };
        if !improves {
            return;
        }
        self.created.price = candidate;
        if self.kind == OrderKind::StopTrailLimit {
            self.created.price_limit = Some(candidate - self.limit_offset);
        }
    }
}
