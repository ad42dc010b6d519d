//! TOML configuration loading and validation.
//!
//! ```toml
//! [broker]
//! cash = 100000.0
//! check_submit = true
//!
//! [slippage]
//! slip_perc = 0.001
//!
//! [filler]
//! type = "fixed_bar_perc"
//! perc = 25.0
//!
//! [commission.default]
//! commission = 0.1      # percent of notional
//!
//! [commission.instruments.ES]
//! commission = 2.0
//! margin = 2000.0
//! mult = 50.0
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::commission::{AutoMargin, CommissionInfo, CommissionScheme, TieredFees};
use crate::error::ConfigError;
use crate::filler::{BarPointPerc, FixedBarPerc, FixedSize, VolumeFiller};
use crate::slippage::{SlipKind, Slippage};
use crate::Symbol;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub slippage: SlippageConfig,
    #[serde(default)]
    pub filler: Option<FillerConfig>,
    #[serde(default)]
    pub commission: CommissionTable,
}

/// Account and matching behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSection {
    #[serde(default = "default_cash")]
    pub cash: f64,
    /// Pseudo-execute submitted orders against projected cash before accepting
    #[serde(default = "default_true")]
    pub check_submit: bool,
    /// Short sales of stock-like instruments credit cash
    #[serde(default = "default_true")]
    pub shortcash: bool,
    /// Cheat-on-close: market orders fill at the creation bar's close
    #[serde(default)]
    pub coc: bool,
    /// Cheat-on-open: market orders may fill on the creation bar's open
    #[serde(default)]
    pub coo: bool,
    /// Add accrued credit interest to the commission of closing trades
    #[serde(default = "default_true")]
    pub int2pnl: bool,
    /// Report value per fund share instead of absolute value
    #[serde(default)]
    pub fund_mode: bool,
    #[serde(default = "default_fund_start")]
    pub fund_start_value: f64,
    /// Bars retained per instrument
    #[serde(default = "default_history")]
    pub bar_history: usize,
}

fn default_cash() -> f64 {
    10_000.0
}
fn default_true() -> bool {
    true
}
fn default_fund_start() -> f64 {
    100.0
}
fn default_history() -> usize {
    crate::BarHistory::DEFAULT_CAPACITY
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            cash: default_cash(),
            check_submit: true,
            shortcash: true,
            coc: false,
            coo: false,
            int2pnl: true,
            fund_mode: false,
            fund_start_value: default_fund_start(),
            bar_history: default_history(),
        }
    }
}

/// Slippage settings. A non-zero `slip_perc` takes precedence over `slip_fixed`.
#[derive(Debug, Clone, Deserialize)]
pub struct SlippageConfig {
    #[serde(default)]
    pub slip_perc: f64,
    #[serde(default)]
    pub slip_fixed: f64,
    #[serde(default)]
    pub slip_open: bool,
    #[serde(default = "default_true")]
    pub slip_match: bool,
    #[serde(default = "default_true")]
    pub slip_limit: bool,
    #[serde(default)]
    pub slip_out: bool,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            slip_perc: 0.0,
            slip_fixed: 0.0,
            slip_open: false,
            slip_match: true,
            slip_limit: true,
            slip_out: false,
        }
    }
}

impl SlippageConfig {
    pub fn to_slippage(&self) -> Slippage {
        let kind = if self.slip_perc != 0.0 {
            SlipKind::Percent(self.slip_perc)
        } else if self.slip_fixed != 0.0 {
            SlipKind::Fixed(self.slip_fixed)
        } else {
            SlipKind::None
        };
        Slippage {
            kind,
            slip_open: self.slip_open,
            slip_match: self.slip_match,
            slip_limit: self.slip_limit,
            slip_out: self.slip_out,
        }
    }
}

/// Volume filler selection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FillerConfig {
    FixedSize { size: u64 },
    FixedBarPerc { perc: f64 },
    BarPointPerc {
        #[serde(default = "default_minmov")]
        minmov: f64,
        perc: f64,
    },
}

fn default_minmov() -> f64 {
    0.01
}

impl FillerConfig {
    pub fn build(&self) -> Box<dyn VolumeFiller> {
        match *self {
            FillerConfig::FixedSize { size } => Box::new(FixedSize { size }),
            FillerConfig::FixedBarPerc { perc } => Box::new(FixedBarPerc { perc }),
            FillerConfig::BarPointPerc { minmov, perc } => Box::new(BarPointPerc { minmov, perc }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let perc = match *self {
            FillerConfig::FixedSize { size } => {
                if size == 0 {
                    return Err(ConfigError::Invalid("filler size must be > 0".into()));
                }
                return Ok(());
            }
            FillerConfig::FixedBarPerc { perc } => perc,
            FillerConfig::BarPointPerc { minmov, perc } => {
                if !(minmov > 0.0) {
                    return Err(ConfigError::Invalid("filler minmov must be > 0".into()));
                }
                perc
            }
        };
        if !(perc > 0.0 && perc <= 100.0) {
            return Err(ConfigError::Invalid(
                "filler perc must be in (0.0, 100.0]".into(),
            ));
        }
        Ok(())
    }
}

/// Default and per-instrument commission schemes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommissionTable {
    #[serde(default)]
    pub default: Option<CommissionConfig>,
    #[serde(default)]
    pub instruments: BTreeMap<String, CommissionConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeType {
    Percentage,
    Fixed,
    Tiered,
}

/// One instrument's commission settings.
///
/// Without an explicit `scheme`, a configured `margin` selects a futures-like
/// fixed-per-contract scheme and its absence a stock-like percentage scheme.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommissionConfig {
    #[serde(default)]
    pub scheme: Option<SchemeType>,
    /// Percentage (see `percabs`) or amount per unit
    #[serde(default)]
    pub commission: f64,
    /// `commission` is already a fraction (0.001) rather than percent (0.1)
    #[serde(default)]
    pub percabs: bool,
    #[serde(default)]
    pub stocklike: Option<bool>,
    #[serde(default)]
    pub mult: Option<f64>,
    #[serde(default)]
    pub margin: Option<f64>,
    #[serde(default)]
    pub automargin: AutoMargin,
    #[serde(default)]
    pub leverage: Option<f64>,
    #[serde(default)]
    pub interest: f64,
    #[serde(default)]
    pub interest_long: bool,
    #[serde(default)]
    pub tiered: Option<TieredFees>,
}

impl CommissionConfig {
    pub fn to_info(&self) -> Result<CommissionInfo, ConfigError> {
        let scheme_type = self.scheme.unwrap_or(if self.margin.is_some() {
            SchemeType::Fixed
        } else {
            SchemeType::Percentage
        });
        let stocklike = self.stocklike.unwrap_or(self.margin.is_none());
        let scheme = match scheme_type {
            SchemeType::Percentage => {
                let rate = if self.percabs {
                    self.commission
                } else {
                    self.commission / 100.0
                };
                CommissionScheme::Percentage { rate }
            }
            SchemeType::Fixed => CommissionScheme::PerUnit {
                amount: self.commission,
            },
            SchemeType::Tiered => match &self.tiered {
                Some(fees) => CommissionScheme::Tiered(fees.clone()),
                None => CommissionInfo::tiered_stock().scheme,
            },
        };
        let info = CommissionInfo {
            scheme,
            stocklike,
            mult: self.mult.unwrap_or(1.0),
            margin: self.margin,
            automargin: self.automargin,
            leverage: self.leverage.unwrap_or(1.0),
            interest: self.interest,
            interest_long: self.interest_long,
        };
        info.validate()?;
        Ok(info)
    }
}

impl BrokerConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: BrokerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.broker;
        if !(b.cash.is_finite() && b.cash >= 0.0) {
            return Err(ConfigError::Invalid("cash must be >= 0".into()));
        }
        if !(b.fund_start_value.is_finite() && b.fund_start_value > 0.0) {
            return Err(ConfigError::Invalid("fund_start_value must be > 0".into()));
        }
        if b.bar_history == 0 {
            return Err(ConfigError::Invalid("bar_history must be > 0".into()));
        }
        let s = &self.slippage;
        if !(s.slip_perc >= 0.0 && s.slip_perc < 1.0) {
            return Err(ConfigError::Invalid("slip_perc must be in [0.0, 1.0)".into()));
        }
        if !(s.slip_fixed.is_finite() && s.slip_fixed >= 0.0) {
            return Err(ConfigError::Invalid("slip_fixed must be >= 0".into()));
        }
        if let Some(filler) = &self.filler {
            filler.validate()?;
        }
        if let Some(default) = &self.commission.default {
            default.to_info()?;
        }
        for (name, comm) in &self.commission.instruments {
            Symbol::try_new(name).ok_or_else(|| ConfigError::InvalidSymbol(name.clone()))?;
            comm.to_info()?;
        }
        Ok(())
    }

    /// Instruments with an explicit commission entry.
    pub fn configured_instruments(&self) -> Result<Vec<Symbol>, ConfigError> {
        self.commission
            .instruments
            .keys()
            .map(|name| Symbol::try_new(name).ok_or_else(|| ConfigError::InvalidSymbol(name.clone())))
            .collect()
    }

    /// Commission model for `symbol`: its own entry, else the default.
    pub fn commission_for(&self, symbol: Symbol) -> Result<CommissionInfo, ConfigError> {
        self.commission
            .instruments
            .get(symbol.as_str())
            .or(self.commission.default.as_ref())
            .ok_or(ConfigError::MissingCommission(symbol))?
            .to_info()
    }
}
