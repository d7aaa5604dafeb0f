//! Signal registration and batch computation.
//!
//! Signals are per-group decision arrays computed from indicators and,
//! optionally, from parent signals. Dependencies span both namespaces:
//! indicator dependencies must already be computed for the group, signal
//! dependencies are ordered through the group's signal graph.

use super::error::{BarstepError, ConfigError, Namespace};
use super::graph::DependencyGraph;
use super::indicator::{check_length, resolve_groups};
use super::instrument::InstrumentGroup;
use super::series::{GroupSeries, SeriesMap, SignalValue};
use super::time_axis::TimeAxis;

/// Callback computing one signal array for one group.
///
/// Receives the group, the time axis, the group's indicators, the parent
/// signals computed so far and the strategy context.
pub type SignalFn<C> = Box<
    dyn Fn(
        &InstrumentGroup,
        &TimeAxis,
        &SeriesMap<f64>,
        &SeriesMap<SignalValue>,
        &C,
    ) -> Result<Vec<SignalValue>, BarstepError>,
>;

pub struct SignalDef<C> {
    name: String,
    func: SignalFn<C>,
    depends_on_indicators: Vec<String>,
    depends_on_signals: Vec<String>,
    groups: Option<Vec<InstrumentGroup>>,
}

impl<C> SignalDef<C> {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(
                &InstrumentGroup,
                &TimeAxis,
                &SeriesMap<f64>,
                &SeriesMap<SignalValue>,
                &C,
            ) -> Result<Vec<SignalValue>, BarstepError>
            + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(f),
            depends_on_indicators: Vec::new(),
            depends_on_signals: Vec::new(),
            groups: None,
        }
    }

    pub fn depends_on_indicators<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on_indicators = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn depends_on_signals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on_signals = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn groups(mut self, groups: &[InstrumentGroup]) -> Self {
        self.groups = Some(groups.to_vec());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Registered<C> {
    def: SignalDef<C>,
    groups: Vec<InstrumentGroup>,
}

pub struct SignalEngine<C> {
    registered: Vec<Registered<C>>,
}

impl<C> Default for SignalEngine<C> {
    fn default() -> Self {
        Self {
            registered: Vec::new(),
        }
    }
}

impl<C> SignalEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    pub fn register(
        &mut self,
        mut def: SignalDef<C>,
        strategy_groups: &[InstrumentGroup],
    ) -> Result<(), ConfigError> {
        let groups = resolve_groups(def.groups.take(), strategy_groups)?;
        for group in &groups {
            if self.is_registered(&def.name, group) {
                return Err(ConfigError::DuplicateName {
                    kind: Namespace::Signal,
                    name: def.name.clone(),
                    group: group.name().to_string(),
                });
            }
        }
        self.registered.push(Registered { def, groups });
        Ok(())
    }

    /// Whether a signal called `name` is registered for `group`.
    pub fn is_registered(&self, name: &str, group: &InstrumentGroup) -> bool {
        self.registered
            .iter()
            .any(|r| r.def.name == name && r.groups.contains(group))
    }

    /// Whether a signal called `name` is registered for any group.
    pub fn is_known(&self, name: &str) -> bool {
        self.registered.iter().any(|r| r.def.name == name)
    }

    pub fn compute_all(
        &self,
        axis: &TimeAxis,
        strategy_groups: &[InstrumentGroup],
        indicators: &GroupSeries<f64>,
        context: &C,
    ) -> Result<GroupSeries<SignalValue>, BarstepError> {
        let mut all = GroupSeries::new();
        for group in strategy_groups {
            let group_indicators = indicators.group(group)?;
            all.insert(
                group,
                self.compute_group(axis, group, group_indicators, context)?,
            );
        }
        Ok(all)
    }

    fn compute_group(
        &self,
        axis: &TimeAxis,
        group: &InstrumentGroup,
        indicators: &SeriesMap<f64>,
        context: &C,
    ) -> Result<SeriesMap<SignalValue>, BarstepError> {
        let members: Vec<&SignalDef<C>> = self
            .registered
            .iter()
            .filter(|r| r.groups.contains(group))
            .map(|r| &r.def)
            .collect();

        let mut graph = DependencyGraph::new(Namespace::Signal, group.name());
        for def in &members {
            if let Some(missing) = def
                .depends_on_indicators
                .iter()
                .find(|name| !indicators.contains(name))
            {
                return Err(ConfigError::UnresolvedDependency {
                    kind: Namespace::Signal,
                    name: def.name.clone(),
                    dependency_kind: Namespace::Indicator,
                    dependency: missing.clone(),
                    group: group.name().to_string(),
                }
                .into());
            }
            graph.add_node(def.name.clone(), def.depends_on_signals.clone())?;
        }
        let order = graph.topological_order()?;

        let mut computed = SeriesMap::new();
        for name in order {
            let Some(def) = members.iter().find(|d| d.name == name) else {
                continue;
            };
            let values = (def.func)(group, axis, indicators, &computed, context)?;
            check_length(Namespace::Signal, &def.name, group, axis, values.len())?;
            tracing::debug!(signal = %def.name, group = %group, "computed signal");
            computed.insert(name, values);
        }
        Ok(computed)
    }
}
