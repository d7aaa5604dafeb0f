//! Fill models: commission, slippage and the provided market simulators.

use chrono::NaiveDateTime;

use super::error::BarstepError;
use super::market::{MarketContext, MarketSimulator};
use super::order::{Order, Trade};

/// Cost parameters applied to every simulated fill.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
        }
    }
}

/// Calculate commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value.abs() * config.commission_pct / 100.0)
}

/// Move `market_price` against the trader: buys pay up, sells receive less.
pub fn apply_slippage(market_price: f64, quantity: f64, slippage_pct: f64) -> f64 {
    if quantity > 0.0 {
        market_price * (1.0 + slippage_pct / 100.0)
    } else {
        market_price * (1.0 - slippage_pct / 100.0)
    }
}

fn fill_at(
    order: &mut Order,
    price: f64,
    config: &ExecutionConfig,
    timestamp: NaiveDateTime,
) -> Result<Trade, BarstepError> {
    let execution_price = apply_slippage(price, order.quantity(), config.slippage_pct);
    let commission = calculate_commission(order.quantity() * execution_price, config);
    order.fill()?;
    Ok(Trade::new(order, timestamp, execution_price, commission, 0.0))
}

/// Fills every order at one fixed price.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPriceSimulator {
    price: f64,
    config: ExecutionConfig,
}

impl FixedPriceSimulator {
    pub fn new(price: f64) -> Self {
        Self {
            price,
            config: ExecutionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }
}

impl<C> MarketSimulator<C> for FixedPriceSimulator {
    fn execute(
        &self,
        orders: &mut [Order],
        market: &MarketContext<'_, C>,
    ) -> Result<Vec<Trade>, BarstepError> {
        let timestamp = market.timestamp();
        orders
            .iter_mut()
            .map(|order| fill_at(order, self.price, &self.config, timestamp))
            .collect()
    }
}

/// Fills at the midpoint of the bar's open and its adverse extreme.
///
/// Buys execute at `(open + high) / 2`, sells at `(open + low) / 2`, read from
/// the `o`, `h` and `l` indicators of the order's group. A non-finite
/// midpoint leaves the order unfilled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarMidpointSimulator {
    config: ExecutionConfig,
}

impl BarMidpointSimulator {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }
}

impl<C> MarketSimulator<C> for BarMidpointSimulator {
    fn execute(
        &self,
        orders: &mut [Order],
        market: &MarketContext<'_, C>,
    ) -> Result<Vec<Trade>, BarstepError> {
        let i = market.index;
        let timestamp = market.timestamp();
        let mut trades = Vec::with_capacity(orders.len());
        for order in orders.iter_mut() {
            let bars = market.indicators.group(order.instrument().group())?;
            let open = bars.get("o")?[i];
            let extreme = if order.is_buy() {
                bars.get("h")?[i]
            } else {
                bars.get("l")?[i]
            };
            let price = (open + extreme) / 2.0;
            if !price.is_finite() {
                tracing::debug!(order = %order, "no price for order, leaving unfilled");
                continue;
            }
            trades.push(fill_at(order, price, &self.config, timestamp)?);
        }
        Ok(trades)
    }
}
