//! Strategy orchestrator: owns the registrations and drives the run.
//!
//! A run moves through `Configuring -> IndicatorsComputed -> SignalsComputed
//! -> RulesRun -> Complete`. Indicators and signals are computed in batch for
//! the whole time axis; the rule pass then walks the axis once. At step `i`:
//!
//! 1. orders decided at `i - trade_lag` go to the market simulator and the
//!    resulting trades are applied to the account,
//! 2. the account is marked to market at `i`,
//! 3. triggered rules run and emit orders,
//! 4. those orders execute at `i + trade_lag`, or immediately when the lag is
//!    zero. Orders whose execution step is past the axis expire.
//!
//! A step either commits completely or not at all: when anything in it fails
//! the account is rolled back to the previous step and the run aborts.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::account::Account;
use super::backtest::BacktestConfig;
use super::error::{BarstepError, ConfigError};
use super::indicator::{IndicatorDef, IndicatorEngine};
use super::instrument::{Instrument, InstrumentGroup, InstrumentRegistry};
use super::market::{MarketContext, MarketSimulator};
use super::metrics::ReturnMetrics;
use super::order::{Order, OrderId, OrderStatus};
use super::rule::{RuleDef, RuleEngine, StepInputs};
use super::series::{GroupSeries, SignalValue};
use super::signal::{SignalDef, SignalEngine};
use super::time_axis::TimeAxis;

/// Mark price of `instrument` at step `index`.
///
/// Must be total over every instrument the strategy trades; an unknown
/// instrument should be reported as [`BarstepError::UnknownInstrument`].
pub type PriceLookupFn<C> =
    Box<dyn Fn(&Instrument, &TimeAxis, usize, &C) -> Result<f64, BarstepError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Configuring,
    IndicatorsComputed,
    SignalsComputed,
    RulesRun,
    Complete,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Configuring => "configuring",
            RunState::IndicatorsComputed => "indicators computed",
            RunState::SignalsComputed => "signals computed",
            RunState::RulesRun => "running rules",
            RunState::Complete => "complete",
        };
        f.write_str(s)
    }
}

struct StepOutcome {
    executed: Vec<Order>,
    scheduled: Vec<Order>,
    execute_at: usize,
    expired: Vec<Order>,
    next_id: u64,
}

pub struct Strategy<C> {
    axis: TimeAxis,
    registry: InstrumentRegistry,
    groups: Vec<InstrumentGroup>,
    price_lookup: PriceLookupFn<C>,
    config: BacktestConfig,
    context: C,
    indicator_engine: IndicatorEngine<C>,
    signal_engine: SignalEngine<C>,
    rule_engine: RuleEngine<C>,
    market_sim: Option<Box<dyn MarketSimulator<C>>>,
    state: RunState,
    indicators: GroupSeries<f64>,
    signals: GroupSeries<SignalValue>,
    account: Account,
    orders: Vec<Order>,
    next_order_id: u64,
}

impl<C> Strategy<C> {
    /// Build a strategy over every group in `registry`.
    pub fn new<P>(
        axis: TimeAxis,
        registry: InstrumentRegistry,
        price_lookup: P,
        config: BacktestConfig,
        context: C,
    ) -> Result<Self, BarstepError>
    where
        P: Fn(&Instrument, &TimeAxis, usize, &C) -> Result<f64, BarstepError> + 'static,
    {
        let groups = registry.groups().to_vec();
        if groups.is_empty() {
            return Err(ConfigError::NoGroups.into());
        }
        if !config.initial_capital.is_finite() {
            return Err(BarstepError::ConfigInvalid {
                section: "backtest".into(),
                key: "initial_capital".into(),
                reason: format!("must be finite, got {}", config.initial_capital),
            });
        }
        let account = Account::new(config.initial_capital, &groups);
        Ok(Self {
            axis,
            registry,
            groups,
            price_lookup: Box::new(price_lookup),
            config,
            context,
            indicator_engine: IndicatorEngine::new(),
            signal_engine: SignalEngine::new(),
            rule_engine: RuleEngine::new(),
            market_sim: None,
            state: RunState::Configuring,
            indicators: GroupSeries::new(),
            signals: GroupSeries::new(),
            account,
            orders: Vec::new(),
            next_order_id: 1,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn axis(&self) -> &TimeAxis {
        &self.axis
    }

    pub fn groups(&self) -> &[InstrumentGroup] {
        &self.groups
    }

    pub fn instruments(&self) -> &InstrumentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn indicators(&self) -> &GroupSeries<f64> {
        &self.indicators
    }

    pub fn signals(&self) -> &GroupSeries<SignalValue> {
        &self.signals
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Every order that reached a final state, ordered by id.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Orders decided too close to the end of the axis to execute.
    pub fn expired_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders
            .iter()
            .filter(|o| o.status() == OrderStatus::Expired)
    }

    fn require_at_most(&self, latest: RunState, operation: &'static str) -> Result<(), BarstepError> {
        if self.state > latest {
            return Err(BarstepError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn require_at_least(&self, earliest: RunState, operation: &'static str) -> Result<(), BarstepError> {
        if self.state < earliest {
            return Err(BarstepError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    pub fn add_indicator(&mut self, def: IndicatorDef<C>) -> Result<(), BarstepError> {
        self.require_at_most(RunState::Configuring, "add an indicator")?;
        self.indicator_engine.register(def, &self.groups)?;
        Ok(())
    }

    pub fn add_signal(&mut self, def: SignalDef<C>) -> Result<(), BarstepError> {
        self.require_at_most(RunState::IndicatorsComputed, "add a signal")?;
        self.signal_engine.register(def, &self.groups)?;
        Ok(())
    }

    pub fn add_rule(&mut self, def: RuleDef<C>) -> Result<(), BarstepError> {
        self.require_at_most(RunState::SignalsComputed, "add a rule")?;
        self.rule_engine.register(def)?;
        Ok(())
    }

    /// Install the market simulator, replacing any previous one.
    pub fn add_market_sim<S>(&mut self, sim: S) -> Result<(), BarstepError>
    where
        S: MarketSimulator<C> + 'static,
    {
        self.require_at_most(RunState::SignalsComputed, "set the market simulator")?;
        self.market_sim = Some(Box::new(sim));
        Ok(())
    }

    /// Compute every indicator. Discards signals and any previous rule pass.
    pub fn run_indicators(&mut self) -> Result<(), BarstepError> {
        let indicators = self
            .indicator_engine
            .compute_all(&self.axis, &self.groups, &self.context)?;
        self.indicators = indicators;
        self.signals.clear();
        self.reset_ledger();
        self.state = RunState::IndicatorsComputed;
        tracing::info!(
            indicators = self.indicator_engine.len(),
            groups = self.groups.len(),
            steps = self.axis.len(),
            "computed indicators"
        );
        Ok(())
    }

    /// Compute every signal. Discards any previous rule pass.
    pub fn run_signals(&mut self) -> Result<(), BarstepError> {
        self.require_at_least(RunState::IndicatorsComputed, "compute signals")?;
        let signals = self.signal_engine.compute_all(
            &self.axis,
            &self.groups,
            &self.indicators,
            &self.context,
        )?;
        self.signals = signals;
        self.reset_ledger();
        self.state = RunState::SignalsComputed;
        tracing::info!(signals = self.signal_engine.len(), "computed signals");
        Ok(())
    }

    /// Walk the time axis once, running rules and simulating fills.
    ///
    /// Always starts from a fresh account, so running it again replays the
    /// same pass rather than trading on top of the previous one.
    pub fn run_rules(&mut self) -> Result<(), BarstepError> {
        self.require_at_least(RunState::SignalsComputed, "run rules")?;
        self.rule_engine
            .validate(|name| self.signal_engine.is_known(name))?;
        if !self.rule_engine.is_empty() && self.market_sim.is_none() {
            return Err(ConfigError::MissingMarketSimulator.into());
        }

        self.reset_ledger();
        self.state = RunState::RulesRun;
        let mut pending: BTreeMap<usize, Vec<Order>> = BTreeMap::new();
        for i in 0..self.axis.len() {
            if let Err(e) = self.step(i, &mut pending) {
                tracing::error!(step = i, timestamp = %self.axis[i], error = %e, "run aborted");
                return Err(e);
            }
        }
        self.orders.sort_by_key(|o| o.id());
        self.state = RunState::Complete;

        let expired = self.expired_orders().count();
        tracing::info!(
            orders = self.orders.len(),
            trades = self.account.trades().len(),
            expired,
            final_equity = self.account.equity(self.axis.last())?,
            "run complete"
        );
        Ok(())
    }

    /// Run every stage in order.
    pub fn run(&mut self) -> Result<(), BarstepError> {
        self.run_indicators()?;
        self.run_signals()?;
        self.run_rules()
    }

    /// Summary statistics over the finished equity curve.
    pub fn evaluate_returns(&self) -> Result<ReturnMetrics, BarstepError> {
        if self.state != RunState::Complete {
            return Err(BarstepError::InvalidState {
                operation: "evaluate returns",
                state: self.state,
            });
        }
        Ok(ReturnMetrics::from_equity_curve(
            &self.account.equity_curve(),
            self.config.periods_per_year,
            self.config.risk_free_rate,
        ))
    }

    fn reset_ledger(&mut self) {
        self.account = Account::new(self.config.initial_capital, &self.groups);
        self.orders.clear();
        self.next_order_id = 1;
        if self.state > RunState::SignalsComputed {
            self.state = RunState::SignalsComputed;
        }
    }

    fn step(
        &mut self,
        i: usize,
        pending: &mut BTreeMap<usize, Vec<Order>>,
    ) -> Result<(), BarstepError> {
        let checkpoint = self.account.checkpoint();
        let due = pending.get(&i).cloned().unwrap_or_default();
        match self.try_step(i, due) {
            Ok(outcome) => {
                pending.remove(&i);
                self.orders.extend(outcome.executed);
                self.orders.extend(outcome.expired);
                if !outcome.scheduled.is_empty() {
                    pending
                        .entry(outcome.execute_at)
                        .or_default()
                        .extend(outcome.scheduled);
                }
                self.next_order_id = outcome.next_id;
                Ok(())
            }
            Err(e) => {
                self.account.restore(checkpoint);
                Err(e)
            }
        }
    }

    fn try_step(&mut self, i: usize, due: Vec<Order>) -> Result<StepOutcome, BarstepError> {
        let timestamp = self.axis[i];
        self.account.advance_to(i, timestamp)?;
        let executed = self.execute(i, due)?;
        self.mark(i)?;

        let mut next_id = self.next_order_id;
        let inputs = StepInputs {
            index: i,
            axis: &self.axis,
            groups: &self.groups,
            indicators: &self.indicators,
            signals: &self.signals,
            account: &self.account,
            instruments: &self.registry,
            context: &self.context,
        };
        let decided = self.rule_engine.evaluate_step(&inputs, &mut next_id)?;

        let mut outcome = StepOutcome {
            executed,
            scheduled: Vec::new(),
            execute_at: i,
            expired: Vec::new(),
            next_id,
        };
        if decided.is_empty() {
            return Ok(outcome);
        }

        let lag = self.config.trade_lag;
        if lag == 0 {
            let done = self.execute(i, decided)?;
            self.mark(i)?;
            outcome.executed.extend(done);
        } else if let Some(target) = i.checked_add(lag).filter(|&t| t < self.axis.len()) {
            outcome.scheduled = decided;
            outcome.execute_at = target;
        } else {
            for mut order in decided {
                order.set_status(OrderStatus::Expired);
                tracing::warn!(
                    %order,
                    lag,
                    steps = self.axis.len(),
                    "order expires past the end of the time axis"
                );
                outcome.expired.push(order);
            }
        }
        Ok(outcome)
    }

    /// Hand `orders` to the simulator at step `i` and apply the trades.
    fn execute(&mut self, i: usize, mut orders: Vec<Order>) -> Result<Vec<Order>, BarstepError> {
        if orders.is_empty() {
            return Ok(orders);
        }
        let sim = self
            .market_sim
            .as_ref()
            .ok_or(ConfigError::MissingMarketSimulator)?;
        let market = MarketContext {
            index: i,
            timestamps: &self.axis,
            indicators: &self.indicators,
            signals: &self.signals,
            context: &self.context,
        };
        let trades = sim.execute(&mut orders, &market)?;
        let timestamp = self.axis[i];

        let mut traded: HashSet<OrderId> = HashSet::new();
        let mut accepted = Vec::with_capacity(trades.len());
        for trade in trades {
            let Some(order) = orders.iter_mut().find(|o| o.id() == trade.order_id()) else {
                return Err(BarstepError::InvariantViolation {
                    reason: format!("{} does not belong to an order due at {}", trade, timestamp),
                });
            };
            if !traded.insert(order.id()) {
                return Err(BarstepError::InvariantViolation {
                    reason: format!("order {} produced more than one trade", order.id()),
                });
            }
            if trade.timestamp() != timestamp {
                return Err(BarstepError::InvariantViolation {
                    reason: format!("{} is not stamped with execution step {}", trade, timestamp),
                });
            }
            if !trade.price().is_finite() {
                tracing::warn!(%order, price = trade.price(), "dropping trade without a finite price");
                order.set_status(OrderStatus::Unfilled);
                continue;
            }
            if order.status() == OrderStatus::Open {
                order.fill()?;
            }
            accepted.push(trade);
        }

        for order in orders.iter_mut() {
            match order.status() {
                OrderStatus::Filled if !traded.contains(&order.id()) => {
                    return Err(BarstepError::InvariantViolation {
                        reason: format!("order {} marked filled without a trade", order.id()),
                    });
                }
                OrderStatus::Open => {
                    tracing::debug!(%order, "order not filled");
                    order.set_status(OrderStatus::Unfilled);
                }
                _ => {}
            }
        }

        for trade in accepted {
            self.account.apply(trade)?;
        }
        Ok(orders)
    }

    fn mark(&mut self, i: usize) -> Result<(), BarstepError> {
        let lookup = &self.price_lookup;
        let axis = &self.axis;
        let context = &self.context;
        self.account
            .mark_to_market(i, axis[i], |instrument| lookup(instrument, axis, i, context))?;
        Ok(())
    }
}
