//! Price history source.

use crate::domain::error::BarstepError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` in timestamp order, restricted to the inclusive
    /// `[start, end]` date range when bounds are given.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, BarstepError>;

    fn list_symbols(&self) -> Result<Vec<String>, BarstepError>;
}
