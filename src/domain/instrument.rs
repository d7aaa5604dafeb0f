//! Instrument groups, instruments and the per-run registry that caches them.

use std::collections::HashMap;
use std::fmt;

use super::error::BarstepError;

/// A logical trading unit: one strategy decision covers every instrument in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentGroup {
    name: String,
}

impl InstrumentGroup {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for InstrumentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A concrete tradable contract. Belongs to exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    symbol: String,
    group: InstrumentGroup,
}

impl Instrument {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn group(&self) -> &InstrumentGroup {
        &self.group
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.group)
    }
}

/// Name-keyed cache of groups and symbol-keyed cache of instruments.
///
/// A registry lives for one run. Call [`InstrumentRegistry::clear`] (or build a
/// new one) before starting an independent run so identities never leak.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    groups: Vec<InstrumentGroup>,
    group_index: HashMap<String, usize>,
    instruments: HashMap<String, Instrument>,
    members: HashMap<String, Vec<String>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the group called `name`, creating it on first use.
    pub fn group(&mut self, name: &str) -> InstrumentGroup {
        if let Some(&i) = self.group_index.get(name) {
            return self.groups[i].clone();
        }
        let group = InstrumentGroup {
            name: name.to_string(),
        };
        self.group_index.insert(name.to_string(), self.groups.len());
        self.groups.push(group.clone());
        group
    }

    pub fn find_group(&self, name: &str) -> Option<&InstrumentGroup> {
        self.group_index.get(name).map(|&i| &self.groups[i])
    }

    /// Groups in creation order.
    pub fn groups(&self) -> &[InstrumentGroup] {
        &self.groups
    }

    /// Create the instrument `symbol` in `group`, or return the cached one.
    ///
    /// A symbol can only ever belong to one group within a registry.
    pub fn create_instrument(
        &mut self,
        symbol: &str,
        group: &InstrumentGroup,
    ) -> Result<Instrument, BarstepError> {
        if self.find_group(group.name()).is_none() {
            return Err(BarstepError::UnknownGroup(group.name().to_string()));
        }
        if let Some(existing) = self.instruments.get(symbol) {
            if existing.group != *group {
                return Err(BarstepError::InvariantViolation {
                    reason: format!(
                        "instrument {} already belongs to group {}, cannot move it to {}",
                        symbol, existing.group, group
                    ),
                });
            }
            return Ok(existing.clone());
        }
        let instrument = Instrument {
            symbol: symbol.to_string(),
            group: group.clone(),
        };
        self.instruments
            .insert(symbol.to_string(), instrument.clone());
        self.members
            .entry(group.name().to_string())
            .or_default()
            .push(symbol.to_string());
        Ok(instrument)
    }

    pub fn instrument(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    /// Instruments of `group` in creation order.
    pub fn instruments_in(&self, group: &InstrumentGroup) -> Vec<&Instrument> {
        self.members
            .get(group.name())
            .map(|symbols| {
                symbols
                    .iter()
                    .filter_map(|s| self.instruments.get(s))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.group_index.clear();
        self.instruments.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_is_cached_by_name() {
        let mut registry = InstrumentRegistry::new();
        let a = registry.group("AAPL");
        let b = registry.group("AAPL");
        assert_eq!(a, b);
        assert_eq!(registry.group_count(), 1);
    }

    #[test]
    fn groups_keep_creation_order() {
        let mut registry = InstrumentRegistry::new();
        registry.group("MSFT");
        registry.group("AAPL");
        let names: Vec<&str> = registry.groups().iter().map(|g| g.name()).collect();
        assert_eq!(names, vec!["MSFT", "AAPL"]);
    }

    #[test]
    fn instrument_is_cached_by_symbol() {
        let mut registry = InstrumentRegistry::new();
        let group = registry.group("AAPL");
        let first = registry.create_instrument("AAPL", &group).unwrap();
        let second = registry.create_instrument("AAPL", &group).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.instrument_count(), 1);
        assert_eq!(registry.instruments_in(&group).len(), 1);
    }

    #[test]
    fn instrument_cannot_change_group() {
        let mut registry = InstrumentRegistry::new();
        let aapl = registry.group("AAPL");
        let ibm = registry.group("IBM");
        registry.create_instrument("X", &aapl).unwrap();
        let err = registry.create_instrument("X", &ibm).unwrap_err();
        assert!(matches!(err, BarstepError::InvariantViolation { .. }));
    }

    #[test]
    fn instrument_requires_known_group() {
        let mut registry = InstrumentRegistry::new();
        let group = InstrumentRegistry::new().group("GHOST");
        let err = registry.create_instrument("GHOST", &group).unwrap_err();
        assert!(matches!(err, BarstepError::UnknownGroup(name) if name == "GHOST"));
    }

    #[test]
    fn clear_drops_everything() {
        let mut registry = InstrumentRegistry::new();
        let group = registry.group("AAPL");
        registry.create_instrument("AAPL", &group).unwrap();
        registry.clear();
        assert_eq!(registry.group_count(), 0);
        assert_eq!(registry.instrument_count(), 0);
        assert!(registry.instrument("AAPL").is_none());
        assert!(registry.find_group("AAPL").is_none());
    }
}
