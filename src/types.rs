//! Core types: OrderId, Symbol, Quantity, Timestamp

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Requested order size in shares/contracts. Always positive once validated.
pub type Quantity = u64;

/// Bar and order timestamps. The broker uses the calendar date for
/// interest accrual and session boundaries.
pub type Timestamp = chrono::NaiveDateTime;

/// Unique order identifier assigned by the broker, starting at 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Instrument identifier: up to 8 ASCII bytes stored inline, so it is `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    bytes: [u8; Symbol::MAX_LEN],
    len: u8,
}

impl Symbol {
    /// Maximum symbol length in bytes.
    pub const MAX_LEN: usize = 8;

    /// Create a symbol.
    ///
    /// # Panics
    ///
    /// Panics if `s` is longer than [`Symbol::MAX_LEN`] bytes.
    pub fn new(s: &str) -> Self {
        match Self::try_new(s) {
            Some(sym) => sym,
            None => panic!("symbol '{s}' exceeds {} bytes", Self::MAX_LEN),
        }
    }

    /// Create a symbol, returning `None` if `s` is empty or too long.
    pub fn try_new(s: &str) -> Option<Self> {
        let raw = s.as_bytes();
        if raw.is_empty() || raw.len() > Self::MAX_LEN {
            return None;
        }
        let mut bytes = [0u8; Self::MAX_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// The symbol as a string slice.
    pub fn as_str(&self) -> &str {
        // Only ever built from a &str, so the bytes are valid UTF-8.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Symbol::try_new(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "symbol '{s}' must be 1..={} bytes",
                Symbol::MAX_LEN
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_display() {
        assert_eq!(format!("{}", OrderId(42)), "O42");
    }

    #[test]
    fn order_id_ordering() {
        assert!(OrderId(1) < OrderId(2));
    }

    #[test]
    fn symbol_round_trips_text() {
        let sym = Symbol::new("AAPL");
        assert_eq!(sym.as_str(), "AAPL");
        assert_eq!(format!("{sym}"), "AAPL");
        assert_eq!(format!("{sym:?}"), "Symbol(AAPL)");
    }

    #[test]
    fn symbol_rejects_bad_lengths() {
        assert!(Symbol::try_new("").is_none());
        assert!(Symbol::try_new("TOOLONGSYM").is_none());
        assert!(Symbol::try_new("ABCDEFGH").is_some());
    }

    #[test]
    #[should_panic(expected = "exceeds 8 bytes")]
    fn symbol_new_panics_on_long_input() {
        Symbol::new("WAYTOOLONG");
    }

    #[test]
    fn symbol_equality_ignores_padding() {
        assert_eq!(Symbol::new("ES"), Symbol::new("ES"));
        assert_ne!(Symbol::new("ES"), Symbol::new("ESM"));
    }
}
