//! OCO groups, bracket groups and cancellation cascades.
//!
//! OCO: members share a leader. Any fill or termination of one member cancels
//! the remaining live members, pending ones first in queue order.
//!
//! Bracket: a root order plus children. Children stay inactive until the root
//! completes; they are then activated at the start of the next step. Root
//! termination without completion, or any child completion or cancellation,
//! cancels every remaining member.

use std::collections::VecDeque;

use super::BrokerSimulator;
use crate::OrderId;

impl BrokerSimulator {
    /// Add `id` to the OCO group of `member`, creating the group if needed.
    pub(crate) fn join_oco(&mut self, id: OrderId, member: OrderId) {
        let leader = match self.oco_leader.get(&member) {
            Some(&leader) => leader,
            None => {
                self.oco_leader.insert(member, member);
                self.oco_groups.entry(member).or_default().push(member);
                member
            }
        };
        self.oco_leader.insert(id, leader);
        self.oco_groups.entry(leader).or_default().push(id);
    }

    /// Resolve the OCO group of `id` after a fill or termination.
    pub(crate) fn oco_check(&mut self, id: OrderId) {
        let Some(&leader) = self.oco_leader.get(&id) else {
            return;
        };
        let Some(members) = self.oco_groups.remove(&leader) else {
            return;
        };

        let mut victims: Vec<OrderId> = self
            .pending
            .iter()
            .copied()
            .filter(|o| *o != id && members.contains(o))
            .collect();
        let rest: Vec<OrderId> = members
            .iter()
            .copied()
            .filter(|o| *o != id && !victims.contains(o))
            .collect();
        victims.extend(rest);
        for victim in victims {
            if self.cancel_order(victim, true) {
                log::debug!("{victim}: canceled by OCO with {id}");
            }
        }
    }

    /// Cancel every remaining member of the bracket that `id` belongs to.
    pub(crate) fn bracket_cancel(&mut self, id: OrderId) {
        let Some(order) = self.orders.get(&id) else {
            return;
        };
        let root = order.parent.unwrap_or(id);
        let Some(members) = self.brackets.remove(&root) else {
            return;
        };
        for member in members {
            if member != id && self.cancel_order(member, false) {
                log::debug!("{member}: canceled with bracket {root}");
            }
        }
    }

    /// Bracket handling for a completed order: a root releases its children,
    /// a child cancels its siblings.
    pub(crate) fn bracket_complete(&mut self, id: OrderId) {
        let Some(order) = self.orders.get(&id) else {
            return;
        };
        if order.parent.is_some() {
            self.bracket_cancel(id);
            return;
        }
        let Some(group) = self.brackets.get_mut(&id) else {
            return;
        };
        if group.front() == Some(&id) {
            group.pop_front();
        }
        let children: VecDeque<OrderId> = group.iter().copied().collect();
        if group.is_empty() {
            self.brackets.remove(&id);
        }
        for child in children {
            log::debug!("{child}: activating after parent {id} completed");
            self.to_activate.push_back(child);
        }
    }

    /// Cancel a live order wherever it is queued. Returns false if it is
    /// unknown or terminal.
    pub(crate) fn cancel_order(&mut self, id: OrderId, cascade_bracket: bool) -> bool {
        let Some(order) = self.orders.get_mut(&id) else {
            return false;
        };
        if !order.cancel() {
            return false;
        }
        self.pending.retain(|o| *o != id);
        self.submitted.retain(|o| *o != id);
        self.to_activate.retain(|o| *o != id);
        self.notify(id);
        self.oco_check(id);
        if cascade_bracket {
            self.bracket_cancel(id);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, CommissionInfo, OrderRequest, OrderStatus, Symbol};
    use chrono::NaiveDate;

    fn sym() -> Symbol {
        Symbol::new("X")
    }

    fn bar(day: u32, o: f64, h: f64, l: f64, c: f64) -> (Symbol, Bar) {
        let ts = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap();
        (sym(), Bar::new(ts, o, h, l, c, 1e6))
    }

    fn broker() -> BrokerSimulator {
        let mut b = BrokerSimulator::builder()
            .cash(100_000.0)
            .default_commission(CommissionInfo::zero())
            .instrument(sym())
            .build()
            .unwrap();
        b.step(&[bar(1, 100.0, 100.0, 100.0, 100.0)]);
        b
    }

    #[test]
    fn oco_groups_share_leader() {
        let mut b = broker();
        let a = b.buy(OrderRequest::limit(sym(), 1, 90.0)).unwrap();
        let c = b.buy(OrderRequest::stop(sym(), 1, 110.0).oco(a)).unwrap();
        let d = b.buy(OrderRequest::stop(sym(), 1, 120.0).oco(c)).unwrap();
        assert_eq!(b.oco_leader[&c], a);
        assert_eq!(b.oco_leader[&d], a);
        assert_eq!(b.oco_groups[&a], vec![a, c, d]);
    }

    #[test]
    fn oco_cancel_cascades() {
        let mut b = broker();
        let a = b.buy(OrderRequest::limit(sym(), 1, 90.0)).unwrap();
        let c = b.buy(OrderRequest::stop(sym(), 1, 110.0).oco(a)).unwrap();
        b.step(&[bar(2, 100.0, 100.0, 100.0, 100.0)]);
        assert!(b.cancel(a));
        assert_eq!(b.order(c).unwrap().status, OrderStatus::Canceled);
        assert!(b.oco_groups.is_empty());
    }

    #[test]
    fn held_orders_transmit_with_last_member() {
        let mut b = broker();
        let parent = b
            .buy(OrderRequest::limit(sym(), 1, 95.0).transmit(false))
            .unwrap();
        let child = b
            .sell(OrderRequest::stop(sym(), 1, 90.0).parent(parent).transmit(false))
            .unwrap();
        assert_eq!(b.order(parent).unwrap().status, OrderStatus::Created);
        assert_eq!(b.order(child).unwrap().status, OrderStatus::Created);

        let last = b
            .sell(OrderRequest::limit(sym(), 1, 105.0).parent(parent))
            .unwrap();
        for id in [parent, child, last] {
            assert_eq!(b.order(id).unwrap().status, OrderStatus::Submitted);
        }
        assert_eq!(b.submitted.iter().copied().collect::<Vec<_>>(), vec![parent, child, last]);
    }

    #[test]
    fn cancel_held_parent_cancels_children() {
        let mut b = broker();
        let parent = b
            .buy(OrderRequest::limit(sym(), 1, 95.0).transmit(false))
            .unwrap();
        let child = b
            .sell(OrderRequest::stop(sym(), 1, 90.0).parent(parent).transmit(false))
            .unwrap();
        assert!(b.cancel(parent));
        assert_eq!(b.order(child).unwrap().status, OrderStatus::Canceled);
        assert!(b.brackets.is_empty());
    }

    #[test]
    fn child_of_dead_parent_is_rejected() {
        let mut b = broker();
        let parent = b.buy(OrderRequest::limit(sym(), 1, 95.0)).unwrap();
        b.cancel(parent);
        b.drain_notifications();
        let child = b
            .sell(OrderRequest::stop(sym(), 1, 90.0).parent(parent))
            .unwrap();
        assert_eq!(b.order(child).unwrap().status, OrderStatus::Rejected);
        let notes = b.drain_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].status(), OrderStatus::Rejected);
    }

    #[test]
    fn completed_parent_activates_children_next_step() {
        let mut b = broker();
        let parent = b
            .buy(OrderRequest::market(sym(), 1).transmit(false))
            .unwrap();
        let child = b
            .sell(OrderRequest::limit(sym(), 1, 101.0).parent(parent))
            .unwrap();
        b.step(&[bar(2, 100.0, 102.0, 99.0, 100.0)]);
        assert_eq!(b.order(parent).unwrap().status, OrderStatus::Completed);
        // inactive during the parent's step even though the bar crossed 101
        assert_eq!(b.order(child).unwrap().status, OrderStatus::Accepted);
        assert!(!b.order(child).unwrap().active);
        assert_eq!(b.to_activate.len(), 1);

        b.step(&[bar(3, 100.0, 102.0, 99.0, 100.0)]);
        assert_eq!(b.order(child).unwrap().status, OrderStatus::Completed);
        assert!(b.brackets.is_empty());
    }
}
