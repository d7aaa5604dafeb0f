//! Run-level backtest parameters.

/// Parameters shared by every run of a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Steps between the decision that emits an order and its execution.
    pub trade_lag: usize,
    pub periods_per_year: f64,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 1_000_000.0,
            trade_lag: 1,
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
        }
    }
}
