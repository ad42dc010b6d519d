//! Broker simulator: the high-level API for order submission and per-bar matching.
//!
//! A [`BrokerSimulator`] owns cash, positions, the order queues, OCO groups and
//! bracket groups. The driver calls [`buy`](BrokerSimulator::buy) /
//! [`sell`](BrokerSimulator::sell) between steps, feeds every instrument's bar
//! for the step to [`step`](BrokerSimulator::step), and drains notifications.
//!
//! ```
//! use chrono::NaiveDate;
//! use nanobroker::{Bar, BrokerSimulator, OrderRequest, OrderStatus, Symbol};
//!
//! let aapl = Symbol::new("AAPL");
//! let mut broker = BrokerSimulator::builder()
//!     .cash(10_000.0)
//!     .instrument(aapl)
//!     .build()
//!     .unwrap();
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(16, 0, 0).unwrap();
//! broker.step(&[(aapl, Bar::new(day(2), 100.0, 101.0, 99.0, 100.0, 1e6))]);
//!
//! let id = broker.buy(OrderRequest::market(aapl, 10)).unwrap();
//! broker.step(&[(aapl, Bar::new(day(3), 102.0, 103.0, 101.0, 102.5, 1e6))]);
//!
//! assert_eq!(broker.order(id).unwrap().status, OrderStatus::Completed);
//! assert_eq!(broker.position(aapl).size, 10);
//! assert_eq!(broker.cash(), 10_000.0 - 10.0 * 102.0);
//! ```

mod execution;
mod groups;
pub(crate) mod matching;
mod value;

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::BrokerConfig;
use crate::error::{ConfigError, OrderError};
use crate::filler::VolumeFiller;
use crate::history::{FundHistory, FundHistoryEntry, HistoricalOrder, HistoryBatch};
use crate::notification::Notification;
use crate::order::{Order, OrderRequest, OrderStatus};
use crate::slippage::Slippage;
use crate::{Bar, BarHistory, CommissionInfo, OrderId, Position, Side, Symbol};

/// Behaviour switches of the broker.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrokerParams {
    /// Admission check of submitted orders against projected cash
    pub check_submit: bool,
    /// Short sales of stock-like instruments credit cash
    pub shortcash: bool,
    /// Cheat-on-close for market orders
    pub coc: bool,
    /// Cheat-on-open for market orders
    pub coo: bool,
    /// Add accrued credit interest to closing commissions
    pub int2pnl: bool,
    /// Report value per fund share
    pub fund_mode: bool,
}

impl Default for BrokerParams {
    fn default() -> Self {
        Self {
            check_submit: true,
            shortcash: true,
            coc: false,
            coo: false,
            int2pnl: true,
            fund_mode: false,
        }
    }
}

/// Per-instrument state.
#[derive(Debug)]
pub(crate) struct Instrument {
    pub(crate) comm: CommissionInfo,
    pub(crate) position: Position,
    pub(crate) bars: BarHistory,
    /// Accrued credit interest not yet assigned to a closing trade
    pub(crate) credit: f64,
    /// Step of the most recent bar
    pub(crate) last_step: u64,
}

/// Deterministic bar-driven broker.
#[derive(Debug)]
pub struct BrokerSimulator {
    pub(crate) params: BrokerParams,
    pub(crate) slippage: Slippage,
    pub(crate) filler: Option<Box<dyn VolumeFiller>>,
    pub(crate) instruments: FxHashMap<Symbol, Instrument>,
    /// Registration order, for deterministic iteration
    pub(crate) symbols: Vec<Symbol>,

    /// Every order ever created, by id
    pub(crate) orders: FxHashMap<OrderId, Order>,
    next_id: u64,
    /// Accepted orders waiting for a match, FIFO
    pub(crate) pending: VecDeque<OrderId>,
    /// Orders waiting for the admission check, FIFO
    pub(crate) submitted: VecDeque<OrderId>,
    /// Bracket children to activate at the start of the next step
    pub(crate) to_activate: VecDeque<OrderId>,
    /// OCO member -> group leader
    pub(crate) oco_leader: FxHashMap<OrderId, OrderId>,
    /// OCO leader -> members in join order
    pub(crate) oco_groups: FxHashMap<OrderId, Vec<OrderId>>,
    /// Bracket root -> members (root first while it is alive)
    pub(crate) brackets: FxHashMap<OrderId, VecDeque<OrderId>>,

    history: Vec<HistoryBatch>,
    /// Recorded valuations overriding the computed value
    pub(crate) fund_history: FundHistory,
    /// Historical orders whose notifications are suppressed
    silent: FxHashSet<OrderId>,
    notifications: Vec<Notification>,

    pub(crate) cash: f64,
    starting_cash: f64,
    pub(crate) cash_additions: VecDeque<f64>,
    pub(crate) value: f64,
    pub(crate) value_lever: f64,
    pub(crate) leverage: f64,
    pub(crate) unrealized: f64,
    pub(crate) fund_shares: f64,
    pub(crate) fund_value: f64,
    step: u64,
}

/// Builder for [`BrokerSimulator`].
#[derive(Debug)]
pub struct BrokerBuilder {
    cash: f64,
    params: BrokerParams,
    fund_start_value: f64,
    bar_history: usize,
    slippage: Slippage,
    filler: Option<Box<dyn VolumeFiller>>,
    default_commission: Option<CommissionInfo>,
    instruments: Vec<(Symbol, Option<CommissionInfo>)>,
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self {
            cash: 10_000.0,
            params: BrokerParams::default(),
            fund_start_value: 100.0,
            bar_history: BarHistory::DEFAULT_CAPACITY,
            slippage: Slippage::default(),
            filler: None,
            default_commission: None,
            instruments: Vec::new(),
        }
    }
}

impl BrokerBuilder {
    pub fn cash(mut self, cash: f64) -> Self {
        self.cash = cash;
        self
    }

    pub fn params(mut self, params: BrokerParams) -> Self {
        self.params = params;
        self
    }

    pub fn check_submit(mut self, on: bool) -> Self {
        self.params.check_submit = on;
        self
    }

    pub fn shortcash(mut self, on: bool) -> Self {
        self.params.shortcash = on;
        self
    }

    pub fn cheat_on_close(mut self, on: bool) -> Self {
        self.params.coc = on;
        self
    }

    pub fn cheat_on_open(mut self, on: bool) -> Self {
        self.params.coo = on;
        self
    }

    pub fn interest_to_pnl(mut self, on: bool) -> Self {
        self.params.int2pnl = on;
        self
    }

    pub fn fund_mode(mut self, on: bool) -> Self {
        self.params.fund_mode = on;
        self
    }

    pub fn fund_start_value(mut self, value: f64) -> Self {
        self.fund_start_value = value;
        self
    }

    /// Bars retained per instrument (at least 2 for deferred close fills).
    pub fn bar_history(mut self, capacity: usize) -> Self {
        self.bar_history = capacity;
        self
    }

    pub fn slippage(mut self, slippage: Slippage) -> Self {
        self.slippage = slippage;
        self
    }

    pub fn filler(mut self, filler: impl VolumeFiller + 'static) -> Self {
        self.filler = Some(Box::new(filler));
        self
    }

    pub fn boxed_filler(mut self, filler: Option<Box<dyn VolumeFiller>>) -> Self {
        self.filler = filler;
        self
    }

    /// Commission model for instruments registered without their own.
    pub fn default_commission(mut self, comm: CommissionInfo) -> Self {
        self.default_commission = Some(comm);
        self
    }

    /// Register an instrument using the default commission model.
    pub fn instrument(mut self, symbol: Symbol) -> Self {
        self.instruments.push((symbol, None));
        self
    }

    /// Register an instrument with its own commission model.
    pub fn instrument_with(mut self, symbol: Symbol, comm: CommissionInfo) -> Self {
        self.instruments.push((symbol, Some(comm)));
        self
    }

    /// Validate and build. Instruments without a commission model fall back to
    /// the default; with no default either, the build fails.
    pub fn build(self) -> Result<BrokerSimulator, ConfigError> {
        if !(self.cash.is_finite() && self.cash >= 0.0) {
            return Err(ConfigError::Invalid(format!("cash must be >= 0, got {}", self.cash)));
        }
        if !(self.fund_start_value.is_finite() && self.fund_start_value > 0.0) {
            return Err(ConfigError::Invalid("fund_start_value must be > 0".into()));
        }
        if let Some(default) = &self.default_commission {
            default.validate()?;
        }

        let mut instruments = FxHashMap::default();
        let mut symbols = Vec::with_capacity(self.instruments.len());
        for (symbol, comm) in self.instruments {
            let comm = match comm.or_else(|| self.default_commission.clone()) {
                Some(comm) => comm,
                None => return Err(ConfigError::MissingCommission(symbol)),
            };
            comm.validate()?;
            let inst = Instrument {
                comm,
                position: Position::new(symbol),
                bars: BarHistory::with_capacity(self.bar_history),
                credit: 0.0,
                last_step: 0,
            };
            if instruments.insert(symbol, inst).is_none() {
                symbols.push(symbol);
            }
        }

        Ok(BrokerSimulator {
            params: self.params,
            slippage: self.slippage,
            filler: self.filler,
            instruments,
            symbols,
            orders: FxHashMap::default(),
            next_id: 1,
            pending: VecDeque::new(),
            submitted: VecDeque::new(),
            to_activate: VecDeque::new(),
            oco_leader: FxHashMap::default(),
            oco_groups: FxHashMap::default(),
            brackets: FxHashMap::default(),
            history: Vec::new(),
            fund_history: FundHistory::default(),
            silent: FxHashSet::default(),
            notifications: Vec::new(),
            cash: self.cash,
            starting_cash: self.cash,
            cash_additions: VecDeque::new(),
            value: self.cash,
            value_lever: self.cash,
            leverage: 1.0,
            unrealized: 0.0,
            fund_shares: self.cash / self.fund_start_value,
            fund_value: self.fund_start_value,
            step: 0,
        })
    }
}

impl BrokerSimulator {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    /// Build a broker from a loaded configuration.
    ///
    /// Registers `instruments` plus every instrument with its own commission
    /// entry in the configuration.
    pub fn from_config(config: &BrokerConfig, instruments: &[Symbol]) -> Result<Self, ConfigError> {
        config.validate()?;
        let b = &config.broker;
        let params = BrokerParams {
            check_submit: b.check_submit,
            shortcash: b.shortcash,
            coc: b.coc,
            coo: b.coo,
            int2pnl: b.int2pnl,
            fund_mode: b.fund_mode,
        };
        let mut builder = Self::builder()
            .cash(b.cash)
            .params(params)
            .fund_start_value(b.fund_start_value)
            .bar_history(b.bar_history)
            .slippage(config.slippage.to_slippage())
            .boxed_filler(config.filler.as_ref().map(|f| f.build()));

        let mut all: Vec<Symbol> = instruments.to_vec();
        for symbol in config.configured_instruments()? {
            if !all.contains(&symbol) {
                all.push(symbol);
            }
        }
        for symbol in all {
            builder = builder.instrument_with(symbol, config.commission_for(symbol)?);
        }
        builder.build()
    }

    // === Order Submission ===

    /// Submit a buy order. Returns the id of the created order.
    ///
    /// A bracket child whose parent is already dead is created and
    /// immediately Rejected; the rejection arrives as a notification.
    pub fn buy(&mut self, request: OrderRequest) -> Result<OrderId, OrderError> {
        self.submit(Side::Buy, request)
    }

    /// Submit a sell order. See [`buy`](Self::buy).
    pub fn sell(&mut self, request: OrderRequest) -> Result<OrderId, OrderError> {
        self.submit(Side::Sell, request)
    }

    fn submit(&mut self, side: Side, request: OrderRequest) -> Result<OrderId, OrderError> {
        let symbol = request.symbol;
        let inst = self
            .instruments
            .get(&symbol)
            .ok_or(OrderError::UnknownInstrument(symbol))?;
        let (last_close, now) = match inst.bars.current() {
            Some(bar) => (Some(bar.close), Some(bar.timestamp)),
            None => (None, None),
        };

        let mut parent_alive = true;
        if let Some(parent) = request.parent {
            let p = self.orders.get(&parent).ok_or(OrderError::UnknownParent(parent))?;
            if p.symbol != symbol {
                return Err(OrderError::ParentInstrumentMismatch {
                    expected: p.symbol,
                    got: symbol,
                });
            }
            parent_alive = p.is_alive();
        }
        if let Some(member) = request.oco {
            if !self.orders.contains_key(&member) {
                return Err(OrderError::UnknownOco(member));
            }
        }

        let id = OrderId(self.next_id);
        let order = Order::new(id, side, request, last_close, now)?;
        self.next_id += 1;
        log::debug!(
            "{id}: created {side} {} {} {} ({})",
            order.size,
            order.symbol,
            order.kind,
            order.validity
        );
        let (parent, oco, transmit) = (order.parent, order.oco, order.transmit);
        self.orders.insert(id, order);

        if let Some(parent) = parent {
            if !parent_alive {
                if let Some(order) = self.orders.get_mut(&id) {
                    order.reject();
                }
                log::info!("{id}: rejected, bracket parent {parent} is no longer alive");
                self.notify(id);
                return Ok(id);
            }
            self.brackets
                .entry(parent)
                .or_insert_with(|| VecDeque::from([parent]))
                .push_back(id);
        } else if !transmit {
            self.brackets.insert(id, VecDeque::from([id]));
        }

        if let Some(member) = oco {
            self.join_oco(id, member);
        }

        if transmit {
            let root = parent.unwrap_or(id);
            let held: Vec<OrderId> = match self.brackets.get(&root) {
                Some(group) => group
                    .iter()
                    .copied()
                    .filter(|m| self.orders.get(m).is_some_and(|o| o.status == OrderStatus::Created))
                    .collect(),
                None => vec![id],
            };
            for member in held {
                self.transmit(member, self.params.check_submit);
            }
        }
        Ok(id)
    }

    /// Hand a created order to the broker: to the admission queue when
    /// `check` is set, else straight to pending.
    fn transmit(&mut self, id: OrderId, check: bool) {
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        if !order.submit() {
            return;
        }
        self.notify(id);
        if check {
            self.submitted.push_back(id);
        } else {
            self.accept(id);
        }
    }

    pub(crate) fn accept(&mut self, id: OrderId) {
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        if order.accept() {
            order.close_annotation = None;
            self.pending.push_back(id);
            self.notify(id);
        }
    }

    /// Cancel a live order (pending, awaiting admission, or held).
    ///
    /// Returns false if the order is unknown or already terminal. Cancelling
    /// cascades to its OCO group and bracket.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        self.cancel_order(id, true)
    }

    /// Add cash at the end of the next step, adjusting fund shares at the
    /// then current fund value. Negative amounts withdraw.
    pub fn add_cash(&mut self, amount: f64) {
        self.cash_additions.push_back(amount);
    }

    /// Reset cash and starting cash. Before the first step this also resets fund shares.
    pub fn set_cash(&mut self, cash: f64) {
        self.cash = cash;
        self.starting_cash = cash;
        self.value = cash;
        self.value_lever = cash;
        if self.step == 0 && self.fund_value > 0.0 {
            self.fund_shares = cash / self.fund_value;
        }
    }

    /// Queue recorded orders for replay. With `notify` false their state
    /// changes produce no notifications.
    pub fn add_order_history(&mut self, entries: impl IntoIterator<Item = HistoricalOrder>, notify: bool) {
        let batch = HistoryBatch::new(entries, notify);
        if !batch.is_empty() {
            self.history.push(batch);
        }
    }

    /// Queue recorded fund valuations, sorted by time. From the step at
    /// which the first entry is due, value, cash, fund value and fund shares
    /// follow the latest due entry instead of the positions. Turns fund mode on.
    pub fn add_fund_history(&mut self, entries: impl IntoIterator<Item = FundHistoryEntry>) {
        self.fund_history.extend(entries);
        if self.fund_history.is_active() {
            self.params.fund_mode = true;
        }
    }

    // === Step ===

    /// Process one step. `bars` holds this step's bar for each instrument
    /// that has one; bars for unregistered instruments are ignored.
    pub fn step(&mut self, bars: &[(Symbol, Bar)]) {
        self.step += 1;
        for (symbol, bar) in bars {
            match self.instruments.get_mut(symbol) {
                Some(inst) => {
                    inst.bars.push(*bar);
                    inst.last_step = self.step;
                }
                None => log::warn!("ignoring bar for unknown instrument {symbol}"),
            }
        }

        while let Some(id) = self.to_activate.pop_front() {
            if let Some(order) = self.orders.get_mut(&id) {
                order.active = true;
            }
        }
        if self.params.check_submit {
            self.check_submitted();
        }
        self.accrue_interest();
        self.process_history();
        self.process_pending();
        self.mark_to_market();
        self.update_value();
    }

    /// Current bar of `symbol` if it received one this step.
    pub(crate) fn fresh_bar(&self, symbol: Symbol) -> Option<Bar> {
        let inst = self.instruments.get(&symbol)?;
        if inst.last_step != self.step {
            return None;
        }
        inst.bars.current().copied()
    }

    fn process_history(&mut self) {
        let step = self.step;
        let instruments = &self.instruments;
        let bar_time = |symbol: Symbol| {
            let inst = instruments.get(&symbol)?;
            if inst.last_step != step {
                return None;
            }
            inst.bars.current().map(|b| b.timestamp)
        };
        let mut due = Vec::new();
        for batch in &mut self.history {
            let notify = batch.notify;
            due.extend(batch.take_due(&bar_time).into_iter().map(|e| (e, notify)));
        }
        self.history.retain(|b| !b.is_empty());

        for (entry, notify) in due {
            if entry.size == 0 {
                log::warn!("skipping zero-size historical order for {}", entry.symbol);
                continue;
            }
            let id = OrderId(self.next_id);
            self.next_id += 1;
            let order = Order::historical(id, entry.symbol, entry.size, entry.price, entry.timestamp);
            self.orders.insert(id, order);
            if !notify {
                self.silent.insert(id);
            }
            self.transmit(id, false);
        }
    }

    fn process_pending(&mut self) {
        let ctx_slippage = self.slippage;
        let queue: Vec<OrderId> = self.pending.drain(..).collect();
        for id in queue {
            let Some(order) = self.orders.get(&id) else {
                continue;
            };
            if !order.is_alive() {
                continue;
            }
            let Some(bar) = self.fresh_bar(order.symbol) else {
                self.pending.push_back(id);
                continue;
            };

            if order.has_expired(bar.timestamp) {
                if let Some(order) = self.orders.get_mut(&id) {
                    order.expire();
                }
                log::debug!("{id}: expired");
                self.notify(id);
                self.oco_check(id);
                self.bracket_cancel(id);
                continue;
            }
            if !order.active {
                self.pending.push_back(id);
                continue;
            }

            self.try_exec(id, &bar, &ctx_slippage);

            let Some(order) = self.orders.get(&id) else {
                continue;
            };
            if order.is_alive() {
                self.pending.push_back(id);
            } else if order.status == OrderStatus::Completed {
                self.bracket_complete(id);
            }
        }
    }

    fn try_exec(&mut self, id: OrderId, bar: &Bar, slippage: &Slippage) {
        let ctx = matching::MatchContext {
            slippage,
            coc: self.params.coc,
            coo: self.params.coo,
        };
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        let was_triggered = order.triggered;
        if let Some(fill) = matching::try_match(order, bar, &ctx) {
            self.execute(id, fill, bar);
        }
        if let Some(order) = self.orders.get_mut(&id) {
            if order.is_alive() && order.kind.is_trailing() && !was_triggered {
                order.trail_adjust(bar.close);
            }
        }
    }

    pub(crate) fn notify(&mut self, id: OrderId) {
        if self.silent.contains(&id) {
            return;
        }
        if let Some(order) = self.orders.get(&id) {
            self.notifications.push(Notification::new(self.step, order));
        }
    }

    // === Queries ===

    /// Take all notifications queued since the last drain, oldest first.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Orders awaiting admission or a match, in FIFO order.
    pub fn open_orders(&self) -> Vec<&Order> {
        self.submitted
            .iter()
            .chain(self.pending.iter())
            .filter_map(|id| self.orders.get(id))
            .filter(|o| o.is_alive())
            .collect()
    }

    /// Snapshot of the position in `symbol` (flat for unknown instruments).
    pub fn position(&self, symbol: Symbol) -> Position {
        self.instruments
            .get(&symbol)
            .map(|i| i.position.clone())
            .unwrap_or_else(|| Position::new(symbol))
    }

    pub fn commission_info(&self, symbol: Symbol) -> Option<&CommissionInfo> {
        self.instruments.get(&symbol).map(|i| &i.comm)
    }

    /// Bar of `symbol` at relative offset `ago` (0 current, -1 previous).
    pub fn bar(&self, symbol: Symbol, ago: i32) -> Option<&Bar> {
        self.instruments.get(&symbol)?.bars.get(ago)
    }

    /// Registered instruments in registration order.
    pub fn instruments(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn starting_cash(&self) -> f64 {
        self.starting_cash
    }

    /// Portfolio value: cash plus unlevered position values.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Portfolio value with full (levered) position values.
    pub fn value_lever(&self) -> f64 {
        self.value_lever
    }

    /// Ratio of levered to unlevered position value.
    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    /// Unrealized profit over all positions at the last value update.
    pub fn unrealized(&self) -> f64 {
        self.unrealized
    }

    pub fn fund_value(&self) -> f64 {
        self.fund_value
    }

    pub fn fund_shares(&self) -> f64 {
        self.fund_shares
    }

    pub fn fund_mode(&self) -> bool {
        self.params.fund_mode
    }

    pub fn params(&self) -> &BrokerParams {
        &self.params
    }

    /// Number of completed steps.
    pub fn current_step(&self) -> u64 {
        self.step
    }
}
