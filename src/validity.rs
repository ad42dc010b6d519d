//! Order validity: how long an unfilled order stays pending.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// Validity window of an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Validity {
    /// Good-til-cancelled: stays pending until filled or explicitly cancelled.
    #[default]
    GoodTillCancel,

    /// Valid for the session (calendar day) in which it was created.
    Day,

    /// Valid while the bar time is at or before the given instant.
    Until(Timestamp),
}

impl Validity {
    /// Returns true if an order created at `created` has expired on a bar at `now`.
    pub fn has_expired(self, created: Timestamp, now: Timestamp) -> bool {
        match self {
            Validity::GoodTillCancel => false,
            Validity::Day => now.date() > created.date(),
            Validity::Until(limit) => now > limit,
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::GoodTillCancel => write!(f, "GTC"),
            Validity::Day => write!(f, "DAY"),
            Validity::Until(ts) => write!(f, "GTD({ts})"),
        }
    }
}
