//! Fill accounting and the admission check.
//!
//! An execution is split into a closing part (reduces the existing position)
//! and an opening part (increases it or opens the reversed side). The closing
//! part always goes through. The opening part is nullified when it would drive
//! cash negative, and the order then ends in Margin.

use rustc_hash::FxHashMap;

use super::matching::Fill;
use super::BrokerSimulator;
use crate::order::{Execution, Order, OrderKind, OrderStatus};
use crate::{Bar, CommissionInfo, OrderId, Position, Symbol};

/// Cash movements of one execution.
#[derive(Clone, Copy, Debug, Default)]
struct Legs {
    closed: i64,
    closed_value: f64,
    closed_comm: f64,
    opened: i64,
    opened_value: f64,
    opened_comm: f64,
    pnl: f64,
    /// The opening part could not be funded
    margin_call: bool,
}

impl BrokerSimulator {
    /// Value of a leg as the broker books it.
    fn leg_value(&self, comm: &CommissionInfo, size: i64, price: f64) -> f64 {
        if self.params.shortcash {
            comm.value_size(size, price)
        } else {
            comm.operation_cost(size, price)
        }
    }

    /// Execute `fill` for order `id` on `bar`.
    pub(crate) fn execute(&mut self, id: OrderId, fill: Fill, bar: &Bar) {
        let Some(order) = self.orders.get(&id) else {
            return;
        };
        let symbol = order.symbol;
        let Some(inst) = self.instruments.get(&symbol) else {
            return;
        };
        let exec_bar = if fill.ago < 0 {
            inst.bars.get(fill.ago).copied().unwrap_or(*bar)
        } else {
            *bar
        };
        let price = fill.price;
        let size = match &self.filler {
            Some(filler) => order.side.signed(filler.fill_size(order, price, &exec_bar)),
            None => order.signed_remaining(),
        };
        if size == 0 {
            return;
        }

        let comm = inst.comm.clone();
        let position = &inst.position;
        let pprice_orig = position.price;
        let adjust_base = position.adjust_base.unwrap_or(price);
        let preview = position.pseudo_update(size, price);
        let mut legs = Legs {
            closed: preview.closed,
            opened: preview.opened,
            pnl: comm.profit_and_loss(-preview.closed, pprice_orig, price),
            ..Legs::default()
        };
        let stocklike = if comm.stocklike { 1.0 } else { 0.0 };
        let mut cash = self.cash;

        if legs.closed != 0 {
            legs.closed_value = self.leg_value(&comm, -legs.closed, pprice_orig);
            cash += comm.cash_requirement(legs.closed_value) + legs.pnl * stocklike;
            legs.closed_comm = comm.commission(legs.closed, price);
            cash -= legs.closed_comm;
            cash += comm.cash_adjust(-legs.closed, adjust_base, price);
            self.cash = cash;
        }

        let mut new_adjust_base = None;
        if legs.opened != 0 {
            let opened_value = self.leg_value(&comm, legs.opened, price);
            let opened_comm = comm.commission(legs.opened, price);
            cash -= comm.cash_requirement(opened_value);
            cash -= opened_comm;
            if cash < 0.0 {
                legs.opened = 0;
                legs.margin_call = true;
            } else {
                if preview.size.abs() > legs.opened.abs() {
                    // earlier contracts are marked to the fill price
                    cash += comm.cash_adjust(preview.size - legs.opened, adjust_base, price);
                }
                new_adjust_base = Some(price);
                legs.opened_value = opened_value;
                legs.opened_comm = opened_comm;
                self.cash = cash;
            }
        }

        let exec_size = legs.closed + legs.opened;
        if exec_size != 0 {
            let Some(inst) = self.instruments.get_mut(&symbol) else {
                return;
            };
            if let Some(base) = new_adjust_base {
                inst.position.adjust_base = Some(base);
            }
            inst.position.update(exec_size, price, Some(bar.timestamp));
            if legs.closed != 0 && self.params.int2pnl {
                legs.closed_comm += std::mem::take(&mut inst.credit);
            }
            let execution = Execution {
                timestamp: fill.timestamp.unwrap_or(exec_bar.timestamp),
                size: exec_size,
                price,
                closed: legs.closed,
                closed_value: legs.closed_value,
                closed_comm: legs.closed_comm,
                opened: legs.opened,
                opened_value: legs.opened_value,
                opened_comm: legs.opened_comm,
                pnl: legs.pnl,
                position_size: inst.position.size,
                position_price: inst.position.price,
            };
            if let Some(order) = self.orders.get_mut(&id) {
                if !comm.stocklike {
                    order.executed.margin = Some(comm.margin(price));
                }
                order.execute(execution);
                log::debug!(
                    "{id}: {} {exec_size} {symbol} @ {price:.4} -> {}",
                    order.kind,
                    order.status
                );
            }
            self.notify(id);
            self.oco_check(id);
        }

        if legs.margin_call {
            if let Some(order) = self.orders.get_mut(&id) {
                order.margin();
            }
            log::info!("{id}: margin, cash {:.2} cannot fund the opening part", self.cash);
            self.notify(id);
            self.oco_check(id);
            self.bracket_cancel(id);
        }
    }

    /// Cash left after executing `order` against `position` at its creation price.
    ///
    /// Ignores pnl, interest and mark-to-market. `position` is updated.
    fn projected_cash(&self, order: &Order, cash: f64, position: &mut Position, comm: &CommissionInfo) -> f64 {
        let price = match (order.kind, self.params.coo) {
            (OrderKind::Market, true) => self
                .instruments
                .get(&order.symbol)
                .and_then(|i| i.bars.current())
                .map_or(order.created.price, |b| b.open),
            _ => order.created.price,
        };
        let up = position.update(order.signed_remaining(), price, None);
        let mut cash = cash;
        if up.closed != 0 {
            let value = self.leg_value(comm, -up.closed, price);
            cash += comm.cash_requirement(value);
            cash -= comm.commission(up.closed, price);
        }
        if up.opened != 0 {
            let value = self.leg_value(comm, up.opened, price);
            cash -= comm.cash_requirement(value);
            cash -= comm.commission(up.opened, price);
        }
        cash
    }

    /// Admission check: pseudo-execute submitted orders in FIFO order against
    /// running projected cash and positions. Every order moves the projection,
    /// and orders that leave it negative are Rejected.
    pub(crate) fn check_submitted(&mut self) {
        let mut cash = self.cash;
        let mut projected: FxHashMap<Symbol, Position> = FxHashMap::default();
        let queue: Vec<OrderId> = self.submitted.drain(..).collect();

        for id in queue {
            let Some(order) = self.orders.get(&id) else {
                continue;
            };
            if order.status != OrderStatus::Submitted {
                continue;
            }
            let parent_gone = order.parent.is_some_and(|p| !self.brackets.contains_key(&p));
            let funded = if parent_gone {
                false
            } else {
                let Some(inst) = self.instruments.get(&order.symbol) else {
                    continue;
                };
                let mut position = projected
                    .get(&order.symbol)
                    .cloned()
                    .unwrap_or_else(|| inst.position.clone());
                cash = self.projected_cash(order, cash, &mut position, &inst.comm);
                projected.insert(position.symbol, position);
                cash >= 0.0
            };

            if funded {
                self.accept(id);
                continue;
            }
            if let Some(order) = self.orders.get_mut(&id) {
                order.reject();
            }
            log::info!("{id}: rejected at admission (projected cash {cash:.2})");
            self.notify(id);
            self.oco_check(id);
            self.bracket_cancel(id);
        }
    }
}
