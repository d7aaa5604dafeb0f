//! Trading rules: signal-triggered callbacks that emit orders.
//!
//! A rule watches one signal. At each step where the signal's value is in the
//! rule's trigger set, and the group's position passes the rule's position
//! filter, the callback runs and may return orders. Rules run in registration
//! order and, within a rule, in group order.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;

use super::account::{is_flat, Account};
use super::error::{BarstepError, ConfigError, Namespace};
use super::instrument::{Instrument, InstrumentGroup, InstrumentRegistry};
use super::order::{Order, OrderId};
use super::series::{GroupSeries, SeriesMap, SignalValue};
use super::time_axis::TimeAxis;

/// Gate on the group's position at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionFilter {
    /// Always eligible.
    #[default]
    None,
    /// Eligible only while flat.
    Zero,
    /// Eligible only while holding a position.
    NonZero,
}

impl PositionFilter {
    pub fn admits(self, position: f64) -> bool {
        match self {
            PositionFilter::None => true,
            PositionFilter::Zero => is_flat(position),
            PositionFilter::NonZero => !is_flat(position),
        }
    }
}

impl fmt::Display for PositionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionFilter::None => write!(f, "none"),
            PositionFilter::Zero => write!(f, "zero"),
            PositionFilter::NonZero => write!(f, "nonzero"),
        }
    }
}

/// Exact signal values that fire a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSet(BTreeSet<SignalValue>);

impl TriggerSet {
    pub fn contains(&self, value: SignalValue) -> bool {
        self.0.contains(&value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = SignalValue> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<SignalValue> for TriggerSet {
    fn from_iter<I: IntoIterator<Item = SignalValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything a rule callback may look at when it fires.
pub struct RuleContext<'a, C> {
    pub group: &'a InstrumentGroup,
    pub index: usize,
    pub timestamps: &'a TimeAxis,
    pub indicators: &'a SeriesMap<f64>,
    pub signal: &'a [SignalValue],
    pub account: &'a Account,
    /// Orders already emitted at this step by earlier rules.
    pub pending: &'a [Order],
    pub instruments: &'a InstrumentRegistry,
    pub context: &'a C,
}

impl<C> RuleContext<'_, C> {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamps[self.index]
    }

    /// The group's position now.
    pub fn position(&self) -> Result<f64, BarstepError> {
        self.account.position(self.group, self.timestamp())
    }

    pub fn equity(&self) -> Result<f64, BarstepError> {
        self.account.equity(self.timestamp())
    }

    pub fn instrument(&self, symbol: &str) -> Result<&Instrument, BarstepError> {
        self.instruments
            .instrument(symbol)
            .ok_or_else(|| BarstepError::UnknownInstrument(symbol.to_string()))
    }

    pub fn signal_value(&self) -> SignalValue {
        self.signal[self.index]
    }
}

pub type RuleFn<C> = Box<dyn Fn(&RuleContext<'_, C>) -> Result<Vec<Order>, BarstepError>>;

pub struct RuleDef<C> {
    name: String,
    signal: String,
    func: RuleFn<C>,
    triggers: TriggerSet,
    position_filter: PositionFilter,
}

impl<C> RuleDef<C> {
    pub fn new<F>(name: impl Into<String>, signal: impl Into<String>, f: F) -> Self
    where
        F: Fn(&RuleContext<'_, C>) -> Result<Vec<Order>, BarstepError> + 'static,
    {
        Self {
            name: name.into(),
            signal: signal.into(),
            func: Box::new(f),
            triggers: TriggerSet::default(),
            position_filter: PositionFilter::None,
        }
    }

    pub fn triggers<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = SignalValue>,
    {
        self.triggers = values.into_iter().collect();
        self
    }

    pub fn position_filter(mut self, filter: PositionFilter) -> Self {
        self.position_filter = filter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }
}

/// Inputs shared by every rule at one step.
pub(crate) struct StepInputs<'a, C> {
    pub index: usize,
    pub axis: &'a TimeAxis,
    pub groups: &'a [InstrumentGroup],
    pub indicators: &'a GroupSeries<f64>,
    pub signals: &'a GroupSeries<SignalValue>,
    pub account: &'a Account,
    pub instruments: &'a InstrumentRegistry,
    pub context: &'a C,
}

pub struct RuleEngine<C> {
    rules: Vec<RuleDef<C>>,
}

impl<C> Default for RuleEngine<C> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<C> RuleEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    pub fn register(&mut self, def: RuleDef<C>) -> Result<(), ConfigError> {
        if self.rules.iter().any(|r| r.name == def.name) {
            return Err(ConfigError::DuplicateName {
                kind: Namespace::Rule,
                name: def.name,
                group: "*".to_string(),
            });
        }
        if def.triggers.is_empty() {
            return Err(ConfigError::EmptyTriggerSet { rule: def.name });
        }
        self.rules.push(def);
        Ok(())
    }

    /// Check that every rule's signal exists for at least one group.
    pub fn validate(&self, is_known_signal: impl Fn(&str) -> bool) -> Result<(), ConfigError> {
        match self.rules.iter().find(|r| !is_known_signal(&r.signal)) {
            Some(rule) => Err(ConfigError::UnknownSignal {
                rule: rule.name.clone(),
                signal: rule.signal.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Run every triggered rule at one step and collect the accepted orders.
    ///
    /// Accepted orders are stamped with sequential ids starting at
    /// `*next_id`. An order for another timestamp or an instrument the
    /// registry does not know aborts the step.
    pub(crate) fn evaluate_step(
        &self,
        step: &StepInputs<'_, C>,
        next_id: &mut u64,
    ) -> Result<Vec<Order>, BarstepError> {
        let i = step.index;
        let timestamp = step.axis[i];
        let mut orders: Vec<Order> = Vec::new();

        for rule in &self.rules {
            for group in step.groups {
                let Some(signal) = step.signals.group(group)?.try_get(&rule.signal) else {
                    continue;
                };
                if !rule.triggers.contains(signal[i]) {
                    continue;
                }
                let position = step.account.position(group, timestamp)?;
                if !rule.position_filter.admits(position) {
                    tracing::trace!(rule = %rule.name, group = %group, position, "position filter blocked rule");
                    continue;
                }

                let ctx = RuleContext {
                    group,
                    index: i,
                    timestamps: step.axis,
                    indicators: step.indicators.group(group)?,
                    signal,
                    account: step.account,
                    pending: &orders,
                    instruments: step.instruments,
                    context: step.context,
                };
                let emitted = (rule.func)(&ctx).map_err(|e| BarstepError::RuleFailed {
                    rule: rule.name.clone(),
                    group: group.name().to_string(),
                    index: i,
                    source: Box::new(e),
                })?;

                for mut order in emitted {
                    if order.timestamp() != timestamp {
                        return Err(BarstepError::InvalidOrder {
                            reason: format!(
                                "rule {} emitted an order for {} at step {}",
                                rule.name,
                                order.timestamp(),
                                timestamp
                            ),
                        });
                    }
                    let symbol = order.instrument().symbol();
                    if step.instruments.instrument(symbol) != Some(order.instrument()) {
                        return Err(BarstepError::UnknownInstrument(symbol.to_string()));
                    }
                    order.assign_id(OrderId(*next_id));
                    *next_id += 1;
                    tracing::debug!(rule = %rule.name, %order, "rule emitted order");
                    orders.push(order);
                }
            }
        }
        Ok(orders)
    }
}
