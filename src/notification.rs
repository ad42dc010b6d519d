//! Order notifications.
//!
//! Every state change of an order is recorded as a [`Notification`] carrying a
//! snapshot of the order at that moment. The driver drains them after each step;
//! each one is delivered exactly once.

use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderStatus};
use crate::OrderId;

/// A snapshot of an order taken when its state changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Broker step during which the change happened (0 before the first step)
    pub step: u64,
    pub order: Order,
}

impl Notification {
    pub fn new(step: u64, order: &Order) -> Self {
        Self {
            step,
            order: order.clone(),
        }
    }

    #[inline]
    pub fn order_id(&self) -> OrderId {
        self.order.id
    }

    #[inline]
    pub fn status(&self) -> OrderStatus {
        self.order.status
    }
}
