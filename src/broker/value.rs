//! End-of-step bookkeeping: credit interest, mark-to-market and valuation.

use super::{BrokerSimulator, Instrument};
use crate::Symbol;

/// Position value of one instrument at its last close.
#[derive(Clone, Copy, Debug, Default)]
struct InstrumentValue {
    /// Value before the short-sale sign is dropped
    raw: f64,
    /// Full (levered) value
    value: f64,
    /// Value with the long notional divided by leverage
    unlevered: f64,
    unrealized: f64,
}

impl BrokerSimulator {
    fn instrument_value(&self, inst: &Instrument) -> Option<InstrumentValue> {
        let close = inst.bars.current()?.close;
        let pos = &inst.position;
        if pos.is_flat() {
            return None;
        }
        let comm = &inst.comm;
        let raw = if self.params.shortcash {
            comm.value_size(pos.size, close)
        } else {
            comm.position_value(pos, close)
        };
        let value = if self.params.shortcash { raw } else { raw.abs() };
        let unrealized = comm.profit_and_loss(pos.size, pos.price, close);
        let unlevered = if value > 0.0 {
            (value - unrealized) / comm.leverage() + unrealized
        } else {
            value
        };
        Some(InstrumentValue {
            raw,
            value,
            unlevered,
            unrealized,
        })
    }

    /// Charge credit interest on open positions with a bar this step.
    pub(crate) fn accrue_interest(&mut self) {
        let step = self.step;
        let mut total = 0.0;
        for symbol in &self.symbols {
            let Some(inst) = self.instruments.get_mut(symbol) else {
                continue;
            };
            if inst.last_step != step || inst.position.is_flat() {
                continue;
            }
            let Some(now) = inst.bars.current().map(|b| b.timestamp) else {
                continue;
            };
            let credit = inst.comm.credit_interest(&inst.position, now);
            if credit != 0.0 {
                log::debug!("{symbol}: credit interest {credit:.4}");
            }
            inst.credit += credit;
            total += credit;
            inst.position.updated_at = Some(now);
        }
        self.cash -= total;
    }

    /// Move cash by the close-to-close change of non stock-like positions.
    pub(crate) fn mark_to_market(&mut self) {
        let step = self.step;
        for symbol in &self.symbols {
            let Some(inst) = self.instruments.get_mut(symbol) else {
                continue;
            };
            if inst.last_step != step || inst.position.is_flat() {
                continue;
            }
            let Some(close) = inst.bars.current().map(|b| b.close) else {
                continue;
            };
            let pos = &mut inst.position;
            self.cash += inst
                .comm
                .cash_adjust(pos.size, pos.adjust_base.unwrap_or(close), close);
            pos.adjust_base = Some(close);
        }
    }

    /// Apply queued cash additions and recompute value and fund value.
    pub(crate) fn update_value(&mut self) {
        while let Some(amount) = self.cash_additions.pop_front() {
            if self.fund_value > 0.0 {
                self.fund_shares += amount / self.fund_value;
            }
            self.cash += amount;
        }

        let mut value = 0.0;
        let mut unlevered = 0.0;
        let mut unrealized = 0.0;
        for symbol in &self.symbols {
            let iv = self.instruments.get(symbol).and_then(|i| self.instrument_value(i));
            let Some(iv) = iv else {
                continue;
            };
            value += iv.value;
            unlevered += iv.unlevered;
            unrealized += iv.unrealized;
        }

        let now = self
            .symbols
            .iter()
            .filter_map(|s| self.fresh_bar(*s))
            .map(|b| b.timestamp)
            .max();
        match self.fund_history.advance(now) {
            Some(entry) => {
                let nav = entry.net_asset_value;
                let lev = value / if unlevered != 0.0 { unlevered } else { 1.0 };
                self.value = nav;
                self.cash = nav - unlevered;
                self.fund_value = entry.share_value;
                self.fund_shares = nav / entry.share_value;
                unlevered = nav;
                value = nav * lev;
            }
            None => {
                self.value = self.cash + unlevered;
                if self.fund_shares > 0.0 {
                    self.fund_value = self.value / self.fund_shares;
                }
            }
        }

        self.value_lever = self.cash + value;
        self.leverage = if unlevered != 0.0 { value / unlevered } else { value };
        self.unrealized = unrealized;
    }

    /// Value of a subset of instruments at their last close.
    ///
    /// For a single instrument this is its raw position value (negative for
    /// shorts). With `lever` set, a positive value is returned with its
    /// notional divided by leverage. For several instruments it is cash plus
    /// their unlevered values.
    pub fn value_of(&self, symbols: &[Symbol], lever: bool) -> f64 {
        let of = |symbol: &Symbol| {
            self.instruments
                .get(symbol)
                .and_then(|i| self.instrument_value(i))
                .unwrap_or_default()
        };
        if let [symbol] = symbols {
            let iv = of(symbol);
            return if lever && iv.raw > 0.0 { iv.unlevered } else { iv.raw };
        }
        self.cash + symbols.iter().map(|s| of(s).unlevered).sum::<f64>()
    }
}
