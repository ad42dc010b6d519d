//! Price bars and the bounded per-instrument bar history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// One OHLCV sample for one instrument at one step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Set by the feed on the last bar of a trading session.
    #[serde(default)]
    pub end_of_session: bool,
}

impl Bar {
    /// Create a bar that is not flagged as end of session.
    pub fn new(timestamp: Timestamp, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            end_of_session: false,
        }
    }

    /// Mark this bar as the last of its session.
    pub fn with_end_of_session(mut self) -> Self {
        self.end_of_session = true;
        self
    }
}

/// Ring buffer of the most recent bars, newest last.
///
/// Relative access follows the usual backtesting convention: `ago = 0` is the
/// current bar, `ago = -1` the previous one. Out-of-range offsets return `None`.
#[derive(Clone, Debug)]
pub struct BarHistory {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarHistory {
    /// Default number of bars retained per instrument.
    pub const DEFAULT_CAPACITY: usize = 2;

    /// Create an empty history holding at most `capacity` bars (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a new current bar, evicting the oldest when full.
    pub fn push(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    /// Bar at relative offset `ago` (0 or negative).
    pub fn get(&self, ago: i32) -> Option<&Bar> {
        if ago > 0 {
            return None;
        }
        let back = ago.unsigned_abs() as usize;
        let len = self.bars.len();
        if back >= len {
            return None;
        }
        self.bars.get(len - 1 - back)
    }

    /// The current bar.
    #[inline]
    pub fn current(&self) -> Option<&Bar> {
        self.get(0)
    }

    /// Number of bars held.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Returns true if no bar has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl Default for BarHistory {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}
