//! Per-instrument cost, margin and financing model.
//!
//! A [`CommissionInfo`] answers every money question the broker asks about an
//! instrument: how much cash an operation ties up, how much it is worth, what it
//! costs in fees, how much cash moves on a mark-to-market, and how much interest
//! a held position accrues. All functions are pure over `(size, price)`.
//!
//! ```
//! use nanobroker::{CommissionInfo, CommissionScheme};
//!
//! // 0.1% of notional, stock-like
//! let info = CommissionInfo::stock(CommissionScheme::Percentage { rate: 0.001 });
//! assert!((info.commission(100, 50.0) - 5.0).abs() < 1e-9);
//!
//! // Futures: fixed 2.0 per contract, 2000 margin, multiplier 50
//! let es = CommissionInfo::futures(CommissionScheme::PerUnit { amount: 2.0 }, 2000.0, 50.0);
//! assert_eq!(es.operation_cost(3, 4000.0), 6000.0);
//! assert_eq!(es.cash_adjust(3, 4000.0, 4010.0), 1500.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{Position, Timestamp};

/// How fees are charged for one operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum CommissionScheme {
    /// Fraction of notional: `|size| × price × rate`.
    Percentage { rate: f64 },
    /// Fixed amount per unit: `|size| × amount`.
    PerUnit { amount: f64 },
    /// Broker fee with floor/cap plus regulatory and exchange fees.
    Tiered(TieredFees),
}

impl Default for CommissionScheme {
    fn default() -> Self {
        CommissionScheme::Percentage { rate: 0.0 }
    }
}

/// Tiered fee schedule.
///
/// `broker = clamp(|size| × per_unit, min_per_order, value × max_value_pct)`,
/// then `value_fee_rate × value + per_order_fee + per_unit_fee × |size|` on top.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TieredFees {
    pub per_unit: f64,
    #[serde(default)]
    pub min_per_order: f64,
    #[serde(default)]
    pub max_value_pct: Option<f64>,
    #[serde(default)]
    pub value_fee_rate: f64,
    #[serde(default)]
    pub per_order_fee: f64,
    #[serde(default)]
    pub per_unit_fee: f64,
}

/// Margin derivation for non stock-like instruments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoMargin {
    /// Use the configured fixed margin.
    #[default]
    Off,
    /// Margin is `price × mult`.
    Multiplier,
    /// Margin is `factor × price`.
    Factor(f64),
}

/// Cost, margin and financing model for one instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommissionInfo {
    pub scheme: CommissionScheme,
    /// Stock-like instruments move full notional; others move margin.
    pub stocklike: bool,
    /// Contract multiplier
    pub mult: f64,
    /// Fixed margin per contract (non stock-like)
    pub margin: Option<f64>,
    pub automargin: AutoMargin,
    /// Leverage applied to long-side cash requirements
    pub leverage: f64,
    /// Annual credit interest rate (e.g. 0.05 = 5%)
    pub interest: f64,
    /// Charge interest on long positions too (shorts are always charged)
    pub interest_long: bool,
}

impl CommissionInfo {
    /// A stock-like instrument with the given fee scheme.
    pub fn stock(scheme: CommissionScheme) -> Self {
        Self {
            scheme,
            stocklike: true,
            mult: 1.0,
            margin: None,
            automargin: AutoMargin::Off,
            leverage: 1.0,
            interest: 0.0,
            interest_long: false,
        }
    }

    /// A futures-like instrument with fixed margin and multiplier.
    pub fn futures(scheme: CommissionScheme, margin: f64, mult: f64) -> Self {
        Self {
            stocklike: false,
            mult,
            margin: Some(margin),
            ..Self::stock(scheme)
        }
    }

    /// Interactive-Brokers-like fixed pricing for US stocks, including the
    /// flat trading activity fee charged on every order.
    pub fn tiered_stock() -> Self {
        Self::stock(CommissionScheme::Tiered(TieredFees {
            per_unit: 0.005,
            min_per_order: 1.0,
            max_value_pct: Some(0.01),
            value_fee_rate: 0.000_027_8,
            per_order_fee: 8.3,
            per_unit_fee: 0.000_052,
        }))
    }

    /// A zero-cost stock-like model.
    pub fn zero() -> Self {
        Self::stock(CommissionScheme::default())
    }

    pub fn with_leverage(mut self, leverage: f64) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_interest(mut self, annual_rate: f64, interest_long: bool) -> Self {
        self.interest = annual_rate;
        self.interest_long = interest_long;
        self
    }

    pub fn with_automargin(mut self, automargin: AutoMargin) -> Self {
        self.automargin = automargin;
        self
    }

    /// Check parameter sanity before a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.leverage.is_finite() && self.leverage >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "leverage must be >= 1.0, got {}",
                self.leverage
            )));
        }
        if !(self.mult.is_finite() && self.mult > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "mult must be > 0, got {}",
                self.mult
            )));
        }
        if !(self.interest.is_finite() && self.interest >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "interest must be >= 0, got {}",
                self.interest
            )));
        }
        let fee_ok = match &self.scheme {
            CommissionScheme::Percentage { rate } => rate.is_finite() && *rate >= 0.0,
            CommissionScheme::PerUnit { amount } => amount.is_finite() && *amount >= 0.0,
            CommissionScheme::Tiered(t) => [
                t.per_unit,
                t.min_per_order,
                t.value_fee_rate,
                t.per_order_fee,
                t.per_unit_fee,
                t.max_value_pct.unwrap_or(0.0),
            ]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0),
        };
        if !fee_ok {
            return Err(ConfigError::Invalid(
                "commission amounts must be finite and >= 0".into(),
            ));
        }
        if !self.stocklike && self.margin.is_none() && self.automargin == AutoMargin::Off {
            return Err(ConfigError::Invalid(
                "non stock-like instruments need a margin or automargin".into(),
            ));
        }
        Ok(())
    }

    /// Margin required for one unit at `price`.
    pub fn margin(&self, price: f64) -> f64 {
        match self.automargin {
            AutoMargin::Off => self.margin.unwrap_or(0.0),
            AutoMargin::Multiplier => price * self.mult,
            AutoMargin::Factor(factor) => factor * price,
        }
    }

    /// Leverage divisor for long-side cash requirements.
    #[inline]
    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    /// Cash an operation of `size` at `price` ties up (always >= 0).
    pub fn operation_cost(&self, size: i64, price: f64) -> f64 {
        let units = size.unsigned_abs() as f64;
        if self.stocklike {
            units * price
        } else {
            units * self.margin(price)
        }
    }

    /// Value of `size` at `price`. Negative for stock-like shorts.
    pub fn value_size(&self, size: i64, price: f64) -> f64 {
        if self.stocklike {
            size as f64 * price
        } else {
            size.unsigned_abs() as f64 * self.margin(price)
        }
    }

    /// Value of a held position when short sales do not add cash.
    ///
    /// A stock-like short gains value as the price falls below its entry.
    pub fn position_value(&self, position: &Position, price: f64) -> f64 {
        if !self.stocklike {
            return position.size.unsigned_abs() as f64 * self.margin(price);
        }
        let size = position.size as f64;
        if position.size >= 0 {
            return size * price;
        }
        position.price * size + (position.price - price) * size
    }

    /// Convert a value into the cash it moves: positive values are levered.
    #[inline]
    pub fn cash_requirement(&self, value: f64) -> f64 {
        if value > 0.0 {
            value / self.leverage
        } else {
            value
        }
    }

    /// Fees for an operation of `size` at `price` (always >= 0, zero for zero size).
    pub fn commission(&self, size: i64, price: f64) -> f64 {
        if size == 0 {
            return 0.0;
        }
        let units = size.unsigned_abs() as f64;
        match &self.scheme {
            CommissionScheme::Percentage { rate } => units * price * rate,
            CommissionScheme::PerUnit { amount } => units * amount,
            CommissionScheme::Tiered(t) => {
                let value = (units * price).max(0.0);
                let mut broker = (units * t.per_unit).max(t.min_per_order);
                if let Some(pct) = t.max_value_pct {
                    broker = broker.min(value * pct);
                }
                broker + value * t.value_fee_rate + t.per_order_fee + units * t.per_unit_fee
            }
        }
    }

    /// Profit of `size` units bought at `price` and valued at `new_price`.
    #[inline]
    pub fn profit_and_loss(&self, size: i64, price: f64, new_price: f64) -> f64 {
        size as f64 * (new_price - price) * self.mult
    }

    /// Cash moved by marking `size` units from `base` to `new_price`.
    /// Zero for stock-like instruments.
    #[inline]
    pub fn cash_adjust(&self, size: i64, base: f64, new_price: f64) -> f64 {
        if self.stocklike {
            return 0.0;
        }
        size as f64 * (new_price - base) * self.mult
    }

    /// Interest owed on `position` for the days elapsed since its last update.
    pub fn credit_interest(&self, position: &Position, now: Timestamp) -> f64 {
        if self.interest == 0.0 || position.size == 0 {
            return 0.0;
        }
        if position.size > 0 && !self.interest_long {
            return 0.0;
        }
        let Some(last) = position.updated_at else {
            return 0.0;
        };
        let days = (now.date() - last.date()).num_days();
        if days <= 0 {
            return 0.0;
        }
        days as f64 * (self.interest / 365.0) * position.size.unsigned_abs() as f64 * position.price
    }

    /// Size `cash` pays for at `price`: whole units of price (or margin),
    /// scaled by leverage.
    pub fn size_for_cash(&self, price: f64, cash: f64) -> i64 {
        let unit = if self.stocklike { price } else { self.margin(price) };
        if unit <= 0.0 || !cash.is_finite() {
            return 0;
        }
        let units = (cash / unit).floor().max(0.0);
        (self.leverage * units).trunc() as i64
    }
}

impl Default for CommissionInfo {
    fn default() -> Self {
        Self::zero()
    }
}
