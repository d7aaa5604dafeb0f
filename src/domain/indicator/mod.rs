//! Indicator registration and batch computation.
//!
//! An indicator is a named per-group `f64` array aligned to the time axis. It
//! is either a fixed vector or computed by a callback from indicators it
//! declares as dependencies. Each group resolves its own dependency graph, so
//! an indicator may be registered under the same name with different sources
//! for different groups.

pub mod rolling;

use super::error::{BarstepError, ConfigError, Namespace};
use super::graph::DependencyGraph;
use super::instrument::InstrumentGroup;
use super::series::{GroupSeries, SeriesMap};
use super::time_axis::TimeAxis;

/// Callback computing one indicator array for one group.
///
/// Receives the group, the time axis, the indicators already computed for the
/// group and the strategy context. Must return one value per timestamp.
pub type IndicatorFn<C> =
    Box<dyn Fn(&InstrumentGroup, &TimeAxis, &SeriesMap<f64>, &C) -> Result<Vec<f64>, BarstepError>>;

pub enum IndicatorSource<C> {
    Vector(Vec<f64>),
    Function(IndicatorFn<C>),
}

/// An indicator registration, built fluently.
pub struct IndicatorDef<C> {
    name: String,
    source: IndicatorSource<C>,
    depends_on: Vec<String>,
    groups: Option<Vec<InstrumentGroup>>,
}

impl<C> IndicatorDef<C> {
    pub fn vector(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            source: IndicatorSource::Vector(values),
            depends_on: Vec::new(),
            groups: None,
        }
    }

    pub fn computed<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&InstrumentGroup, &TimeAxis, &SeriesMap<f64>, &C) -> Result<Vec<f64>, BarstepError>
            + 'static,
    {
        Self {
            name: name.into(),
            source: IndicatorSource::Function(Box::new(f)),
            depends_on: Vec::new(),
            groups: None,
        }
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the indicator to `groups`. Without this it applies to every
    /// group of the strategy.
    pub fn groups(mut self, groups: &[InstrumentGroup]) -> Self {
        self.groups = Some(groups.to_vec());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Registered<C> {
    def: IndicatorDef<C>,
    groups: Vec<InstrumentGroup>,
}

pub struct IndicatorEngine<C> {
    registered: Vec<Registered<C>>,
}

impl<C> Default for IndicatorEngine<C> {
    fn default() -> Self {
        Self {
            registered: Vec::new(),
        }
    }
}

impl<C> IndicatorEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Register `def` for its groups (or all of `strategy_groups`).
    pub fn register(
        &mut self,
        mut def: IndicatorDef<C>,
        strategy_groups: &[InstrumentGroup],
    ) -> Result<(), ConfigError> {
        let groups = resolve_groups(def.groups.take(), strategy_groups)?;
        for group in &groups {
            let taken = self
                .registered
                .iter()
                .any(|r| r.def.name == def.name && r.groups.contains(group));
            if taken {
                return Err(ConfigError::DuplicateName {
                    kind: Namespace::Indicator,
                    name: def.name.clone(),
                    group: group.name().to_string(),
                });
            }
        }
        self.registered.push(Registered { def, groups });
        Ok(())
    }

    /// Compute every indicator for every group, dependencies first.
    ///
    /// Pure with respect to the registrations: calling it twice yields equal
    /// output.
    pub fn compute_all(
        &self,
        axis: &TimeAxis,
        strategy_groups: &[InstrumentGroup],
        context: &C,
    ) -> Result<GroupSeries<f64>, BarstepError> {
        let mut all = GroupSeries::new();
        for group in strategy_groups {
            all.insert(group, self.compute_group(axis, group, context)?);
        }
        Ok(all)
    }

    fn compute_group(
        &self,
        axis: &TimeAxis,
        group: &InstrumentGroup,
        context: &C,
    ) -> Result<SeriesMap<f64>, BarstepError> {
        let members: Vec<&IndicatorDef<C>> = self
            .registered
            .iter()
            .filter(|r| r.groups.contains(group))
            .map(|r| &r.def)
            .collect();

        let mut graph = DependencyGraph::new(Namespace::Indicator, group.name());
        for def in &members {
            graph.add_node(def.name.clone(), def.depends_on.clone())?;
        }
        let order = graph.topological_order()?;

        let mut computed = SeriesMap::new();
        for name in order {
            let Some(def) = members.iter().find(|d| d.name == name) else {
                continue;
            };
            let values = match &def.source {
                IndicatorSource::Vector(values) => values.clone(),
                IndicatorSource::Function(f) => f(group, axis, &computed, context)?,
            };
            check_length(Namespace::Indicator, &def.name, group, axis, values.len())?;
            tracing::debug!(indicator = %def.name, group = %group, "computed indicator");
            computed.insert(name, values);
        }
        Ok(computed)
    }
}

pub(crate) fn resolve_groups(
    requested: Option<Vec<InstrumentGroup>>,
    strategy_groups: &[InstrumentGroup],
) -> Result<Vec<InstrumentGroup>, ConfigError> {
    match requested {
        None => Ok(strategy_groups.to_vec()),
        Some(groups) => {
            if let Some(unknown) = groups.iter().find(|g| !strategy_groups.contains(g)) {
                return Err(ConfigError::UnknownGroup(unknown.name().to_string()));
            }
            Ok(groups)
        }
    }
}

pub(crate) fn check_length(
    kind: Namespace,
    name: &str,
    group: &InstrumentGroup,
    axis: &TimeAxis,
    actual: usize,
) -> Result<(), ConfigError> {
    if actual != axis.len() {
        return Err(ConfigError::LengthMismatch {
            kind,
            name: name.to_string(),
            group: group.name().to_string(),
            expected: axis.len(),
            actual,
        });
    }
    Ok(())
}
