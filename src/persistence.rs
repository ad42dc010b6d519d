//! File-based persistence via JSON Lines.
//!
//! Notifications are written as one JSON object per line (`.jsonl` format).
//! Historical order files use the same format, one [`HistoricalOrder`] per
//! line, and can be fed straight into the broker.
//!
//! # Usage
//!
//! ```ignore
//! use nanobroker::persistence;
//! use std::path::Path;
//!
//! broker.load_order_history(Path::new("fills.jsonl"), true)?;
//! broker.step(&bars);
//! persistence::save_notifications(&broker.drain_notifications(), Path::new("notes.jsonl"))?;
//! ```

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::BrokerSimulator;
use crate::history::HistoricalOrder;
use crate::notification::Notification;

fn save_lines<T: Serialize>(items: &[T], path: &Path) -> io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);

    for item in items {
        let json = serde_json::to_string(item).map_err(io::Error::other)?;
        writeln!(writer, "{json}")?;
    }

    writer.flush()
}

fn load_lines<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    let file = std::fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut items = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let item = serde_json::from_str(line).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("line {}: {}", line_num + 1, e))
        })?;
        items.push(item);
    }

    Ok(items)
}

/// Save notifications to a file in JSON Lines format.
///
/// Each notification carries the order snapshot taken when it was queued.
pub fn save_notifications(notifications: &[Notification], path: &Path) -> io::Result<()> {
    save_lines(notifications, path)
}

/// Load notifications written by [`save_notifications`].
pub fn load_notifications(path: &Path) -> io::Result<Vec<Notification>> {
    load_lines(path)
}

/// Save historical orders in JSON Lines format.
pub fn save_order_history(orders: &[HistoricalOrder], path: &Path) -> io::Result<()> {
    save_lines(orders, path)
}

/// Load historical orders from a JSON Lines file. Empty lines are skipped.
pub fn load_order_history(path: &Path) -> io::Result<Vec<HistoricalOrder>> {
    load_lines(path)
}

impl BrokerSimulator {
    /// Read a historical order file and queue it for replay.
    ///
    /// Requires the `persistence` feature.
    pub fn load_order_history(&mut self, path: &Path, notify: bool) -> io::Result<usize> {
        let entries = load_order_history(path)?;
        let count = entries.len();
        log::info!("loaded {count} historical orders from {}", path.display());
        self.add_order_history(entries, notify);
        Ok(count)
    }
}
