//! Replay of externally recorded orders and fund valuations.
//!
//! Each order batch passed to the broker is consumed in order: an entry is
//! turned into a [`Historical`](crate::OrderKind::Historical) order on the first
//! step whose bar for its instrument is at or after the entry's time. A batch
//! stops at its first entry that is not yet due.
//!
//! A fund history replaces the computed portfolio value: once an entry is due,
//! its net asset value and share value override value, cash, fund value and
//! fund shares at the end of every step until the next entry is due.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{Symbol, Timestamp};

/// One recorded execution to replay.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalOrder {
    pub timestamp: Timestamp,
    pub symbol: Symbol,
    /// Signed size: positive buys, negative sells
    pub size: i64,
    pub price: f64,
}

/// A batch of historical orders and whether their state changes are notified.
#[derive(Clone, Debug)]
pub(crate) struct HistoryBatch {
    entries: VecDeque<HistoricalOrder>,
    pub(crate) notify: bool,
}

impl HistoryBatch {
    pub(crate) fn new(entries: impl IntoIterator<Item = HistoricalOrder>, notify: bool) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            notify,
        }
    }

    /// Pop every leading entry that is due. `bar_time` gives the current bar
    /// time of an instrument, or `None` when it has no bar this step.
    pub(crate) fn take_due(
        &mut self,
        bar_time: impl Fn(Symbol) -> Option<Timestamp>,
    ) -> Vec<HistoricalOrder> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.front() {
            match bar_time(entry.symbol) {
                Some(now) if entry.timestamp <= now => {}
                _ => break,
            }
            if let Some(entry) = self.entries.pop_front() {
                due.push(entry);
            }
        }
        due
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One recorded fund valuation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FundHistoryEntry {
    pub timestamp: Timestamp,
    /// Value of one fund share
    pub share_value: f64,
    /// Net asset value of the whole fund
    pub net_asset_value: f64,
}

/// Fund valuations in time order plus the most recent one that came due.
#[derive(Clone, Debug, Default)]
pub(crate) struct FundHistory {
    entries: VecDeque<FundHistoryEntry>,
    current: Option<FundHistoryEntry>,
}

impl FundHistory {
    pub(crate) fn extend(&mut self, entries: impl IntoIterator<Item = FundHistoryEntry>) {
        for entry in entries {
            if !(entry.share_value.is_finite() && entry.share_value > 0.0)
                || !entry.net_asset_value.is_finite()
            {
                log::warn!(
                    "skipping fund history entry at {} with share value {} and NAV {}",
                    entry.timestamp,
                    entry.share_value,
                    entry.net_asset_value
                );
                continue;
            }
            self.entries.push_back(entry);
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.current.is_some() || !self.entries.is_empty()
    }

    /// Advance past every entry due at `now` and return the latest due one.
    pub(crate) fn advance(&mut self, now: Option<Timestamp>) -> Option<FundHistoryEntry> {
        if let Some(now) = now {
            while self.entries.front().is_some_and(|e| e.timestamp <= now) {
                self.current = self.entries.pop_front();
            }
        }
        self.current
    }
}
