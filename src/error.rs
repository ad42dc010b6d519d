//! Error types: order construction failures and pre-run configuration errors.
//!
//! Runtime outcomes (rejection, margin, expiry, cancellation) are order
//! statuses delivered as notifications, not errors.

use std::path::PathBuf;

use crate::order::OrderKind;
use crate::{OrderId, Symbol};

/// Errors returned by `buy`/`sell`. An order that fails validation is never queued.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("quantity must be greater than zero")]
    ZeroQuantity,

    #[error("quantity {0} exceeds the largest representable position")]
    QuantityTooLarge(u64),

    #[error("{kind} order requires a price")]
    MissingPrice { kind: OrderKind },

    #[error("{kind} order requires a limit price")]
    MissingLimitPrice { kind: OrderKind },

    #[error("price must be positive and finite, got {0}")]
    InvalidPrice(f64),

    #[error("{kind} order requires a trail amount or trail percent")]
    MissingTrail { kind: OrderKind },

    #[error("trail must be positive and finite, got {0}")]
    InvalidTrail(f64),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(Symbol),

    #[error("unknown parent order: {0}")]
    UnknownParent(OrderId),

    #[error("unknown OCO order: {0}")]
    UnknownOco(OrderId),

    #[error("bracket child must trade the parent's instrument {expected}, got {got}")]
    ParentInstrumentMismatch { expected: Symbol, got: Symbol },
}

/// Configuration errors. These are the only fatal conditions and surface before the run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Invalid(String),

    #[error("no commission scheme for instrument {0} and no default scheme")]
    MissingCommission(Symbol),

    #[error("invalid instrument name '{0}'")]
    InvalidSymbol(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
