//! Named, time-aligned arrays handed to callbacks by reference.

use std::collections::BTreeMap;

use super::error::BarstepError;
use super::instrument::InstrumentGroup;

/// Value type of signal arrays. Signals encode decisions as small integer
/// codes (e.g. -2..=2); booleans map to 0 and 1.
pub type SignalValue = i64;

/// Name to array mapping for one instrument group.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMap<T> {
    series: BTreeMap<String, Vec<T>>,
}

impl<T> Default for SeriesMap<T> {
    fn default() -> Self {
        Self {
            series: BTreeMap::new(),
        }
    }
}

impl<T> SeriesMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<T>) {
        self.series.insert(name.into(), values);
    }

    /// Array called `name`, or [`BarstepError::MissingSeries`].
    pub fn get(&self, name: &str) -> Result<&[T], BarstepError> {
        self.try_get(name).ok_or_else(|| BarstepError::MissingSeries {
            name: name.to_string(),
        })
    }

    pub fn try_get(&self, name: &str) -> Option<&[T]> {
        self.series.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Per-group [`SeriesMap`]s, keyed by group name.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSeries<T> {
    groups: BTreeMap<String, SeriesMap<T>>,
}

impl<T> Default for GroupSeries<T> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<T> GroupSeries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, group: &InstrumentGroup, series: SeriesMap<T>) {
        self.groups.insert(group.name().to_string(), series);
    }

    pub fn group(&self, group: &InstrumentGroup) -> Result<&SeriesMap<T>, BarstepError> {
        self.by_name(group.name())
    }

    pub fn by_name(&self, name: &str) -> Result<&SeriesMap<T>, BarstepError> {
        self.groups
            .get(name)
            .ok_or_else(|| BarstepError::UnknownGroup(name.to_string()))
    }

    pub fn try_group(&self, group: &InstrumentGroup) -> Option<&SeriesMap<T>> {
        self.groups.get(group.name())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::InstrumentRegistry;

    #[test]
    fn series_map_get_and_missing() {
        let mut map = SeriesMap::new();
        map.insert("c", vec![1.0, 2.0]);
        assert_eq!(map.get("c").unwrap(), &[1.0, 2.0]);
        assert!(map.contains("c"));
        let err = map.get("o").unwrap_err();
        assert!(matches!(err, BarstepError::MissingSeries { name } if name == "o"));
    }

    #[test]
    fn names_are_sorted() {
        let mut map: SeriesMap<SignalValue> = SeriesMap::new();
        map.insert("z", vec![]);
        map.insert("a", vec![]);
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["a", "z"]);
    }

    #[test]
    fn group_series_lookup() {
        let mut registry = InstrumentRegistry::new();
        let aapl = registry.group("AAPL");
        let ibm = registry.group("IBM");
        let mut groups = GroupSeries::new();
        let mut map = SeriesMap::new();
        map.insert("c", vec![1.0]);
        groups.insert(&aapl, map);
        assert!(groups.group(&aapl).is_ok());
        assert!(matches!(
            groups.group(&ibm),
            Err(BarstepError::UnknownGroup(name)) if name == "IBM"
        ));
    }
}
