//! Raw price bars and their alignment onto a time axis.

use chrono::NaiveDateTime;
use std::collections::HashMap;

use super::time_axis::TimeAxis;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Column arrays of one symbol reindexed onto a time axis.
///
/// Timestamps the symbol has no bar for hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedBars {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
}

impl AlignedBars {
    /// Reindex `bars` onto `axis`. Bars off the axis are ignored.
    pub fn align(axis: &TimeAxis, bars: &[PriceBar]) -> Self {
        let by_time: HashMap<NaiveDateTime, &PriceBar> =
            bars.iter().map(|bar| (bar.timestamp, bar)).collect();
        let n = axis.len();
        let mut aligned = AlignedBars {
            open: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
        };
        for timestamp in axis.iter() {
            match by_time.get(timestamp) {
                Some(bar) => {
                    aligned.open.push(bar.open);
                    aligned.high.push(bar.high);
                    aligned.low.push(bar.low);
                    aligned.close.push(bar.close);
                }
                None => {
                    aligned.open.push(f64::NAN);
                    aligned.high.push(f64::NAN);
                    aligned.low.push(f64::NAN);
                    aligned.close.push(f64::NAN);
                }
            }
        }
        aligned
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Columns keyed by the short indicator names used by the market simulators.
    pub fn columns(&self) -> [(&'static str, &[f64]); 4] {
        [
            ("o", self.open.as_slice()),
            ("h", self.high.as_slice()),
            ("l", self.low.as_slice()),
            ("c", self.close.as_slice()),
        ]
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

    fn bar(minute: u32, close: f64) -> PriceBar {
        PriceBar {
            symbol: "AAPL".into(),
            timestamp: ts(minute),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 100,
        }
    }

    #[test]
    fn align_fills_gaps_with_nan() {
        let axis = TimeAxis::new(vec![ts(0), ts(1), ts(2)]).unwrap();
        let aligned = AlignedBars::align(&axis, &[bar(0, 10.0), bar(2, 12.0)]);
        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned.close[0], 10.0);
        assert!(aligned.close[1].is_nan());
        assert!(aligned.open[1].is_nan());
        assert_eq!(aligned.high[2], 13.0);
        assert_eq!(aligned.low[2], 10.0);
    }

    #[test]
    fn align_ignores_bars_off_axis() {
        let axis = TimeAxis::new(vec![ts(0)]).unwrap();
        let aligned = AlignedBars::align(&axis, &[bar(0, 10.0), bar(5, 99.0)]);
        assert_eq!(aligned.close, vec![10.0]);
    }

    #[test]
    fn columns_use_short_names() {
        let axis = TimeAxis::new(vec![ts(0)]).unwrap();
        let aligned = AlignedBars::align(&axis, &[bar(0, 10.0)]);
        let names: Vec<&str> = aligned.columns().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["o", "h", "l", "c"]);
    }
}
