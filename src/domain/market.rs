//! Market simulator contract.
//!
//! A simulator receives every order due at one step and returns the trades it
//! fills. It owns price discovery and may decline to fill an order (missing
//! data, for example) by returning no trade for it.

use chrono::NaiveDateTime;

use super::error::BarstepError;
use super::order::{Order, Trade};
use super::series::{GroupSeries, SignalValue};
use super::time_axis::TimeAxis;

/// Read-only view of the run handed to the simulator at one step.
pub struct MarketContext<'a, C> {
    pub index: usize,
    pub timestamps: &'a TimeAxis,
    pub indicators: &'a GroupSeries<f64>,
    pub signals: &'a GroupSeries<SignalValue>,
    pub context: &'a C,
}

impl<C> MarketContext<'_, C> {
    /// Timestamp of the execution step.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamps[self.index]
    }
}

pub trait MarketSimulator<C> {
    /// Fill `orders`, all due at `market.index`.
    ///
    /// Every trade must reference one of `orders` and carry the step's
    /// timestamp. Orders the simulator fills may be marked with
    /// [`Order::fill`]; the strategy marks any it leaves open.
    fn execute(
        &self,
        orders: &mut [Order],
        market: &MarketContext<'_, C>,
    ) -> Result<Vec<Trade>, BarstepError>;
}

impl<C, F> MarketSimulator<C> for F
where
    F: Fn(&mut [Order], &MarketContext<'_, C>) -> Result<Vec<Trade>, BarstepError>,
{
    fn execute(
        &self,
        orders: &mut [Order],
        market: &MarketContext<'_, C>,
    ) -> Result<Vec<Trade>, BarstepError> {
        self(orders, market)
    }
}
