//! The shared, strictly increasing time axis of a run.

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::ops::Index;

use super::error::ConfigError;
use super::ohlcv::PriceBar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeAxis {
    timestamps: Vec<NaiveDateTime>,
}

impl TimeAxis {
    /// Build an axis, rejecting empty or non strictly increasing input.
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Result<Self, ConfigError> {
        if timestamps.is_empty() {
            return Err(ConfigError::TimeAxis {
                reason: "time axis is empty".to_string(),
            });
        }
        if let Some(i) = timestamps.windows(2).position(|w| w[0] >= w[1]) {
            return Err(ConfigError::TimeAxis {
                reason: format!(
                    "timestamps not strictly increasing at index {}: {} then {}",
                    i + 1,
                    timestamps[i],
                    timestamps[i + 1]
                ),
            });
        }
        Ok(Self { timestamps })
    }

    /// Sorted union of the timestamps of several bar sets.
    pub fn union(bar_sets: &[&[PriceBar]]) -> Result<Self, ConfigError> {
        let unique: BTreeSet<NaiveDateTime> = bar_sets
            .iter()
            .flat_map(|bars| bars.iter().map(|bar| bar.timestamp))
            .collect();
        Self::new(unique.into_iter().collect())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn as_slice(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn get(&self, i: usize) -> Option<NaiveDateTime> {
        self.timestamps.get(i).copied()
    }

    pub fn first(&self) -> NaiveDateTime {
        self.timestamps[0]
    }

    pub fn last(&self) -> NaiveDateTime {
        self.timestamps[self.timestamps.len() - 1]
    }

    /// Index of `timestamp` if it lies on the axis.
    pub fn index_of(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.timestamps.binary_search(&timestamp).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaiveDateTime> {
        self.timestamps.iter()
    }
}

impl Index<usize> for TimeAxis {
    type Output = NaiveDateTime;

    fn index(&self, i: usize) -> &NaiveDateTime {
        &self.timestamps[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 1, 5)
            .unwrap()
            .and_hms_opt(8, minute, 0)
            .unwrap()
    }

    fn bar(minute: u32) -> PriceBar {
        PriceBar {
            symbol: "X".into(),
            timestamp: ts(minute),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0,
        }
    }

    #[test]
    fn accepts_increasing() {
        let axis = TimeAxis::new(vec![ts(0), ts(1), ts(2)]).unwrap();
        assert_eq!(axis.len(), 3);
        assert_eq!(axis[1], ts(1));
        assert_eq!(axis.first(), ts(0));
        assert_eq!(axis.last(), ts(2));
        assert_eq!(axis.index_of(ts(2)), Some(2));
        assert_eq!(axis.index_of(ts(9)), None);
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            TimeAxis::new(vec![]),
            Err(ConfigError::TimeAxis { .. })
        ));
    }

    #[test]
    fn rejects_duplicates_and_disorder() {
        assert!(TimeAxis::new(vec![ts(0), ts(0)]).is_err());
        assert!(TimeAxis::new(vec![ts(1), ts(0)]).is_err());
    }

    #[test]
    fn union_merges_and_sorts() {
        let a = vec![bar(0), bar(2)];
        let b = vec![bar(1), bar(2), bar(3)];
        let axis = TimeAxis::union(&[&a, &b]).unwrap();
        assert_eq!(axis.as_slice(), &[ts(0), ts(1), ts(2), ts(3)]);
    }
}
