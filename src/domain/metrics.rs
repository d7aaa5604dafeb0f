//! Return statistics computed from a finished equity curve.
//!
//! Equity is first resampled to one value per calendar day (the last mark of
//! the day) so intraday runs annualise the same way daily runs do.

use chrono::NaiveDate;

use super::account::EquityPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnMetrics {
    pub start_equity: f64,
    pub end_equity: f64,
    pub total_return: f64,
    /// Annualised geometric mean of periodic returns.
    pub gmean: f64,
    pub amean: f64,
    pub std: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Largest fall from a running peak, as a fraction of that peak.
    pub mdd_pct: f64,
    /// Largest fall from a running peak, in currency.
    pub mdd: f64,
    /// Longest run of periods spent below a previous peak.
    pub mdd_duration: usize,
    pub periods: usize,
}

impl ReturnMetrics {
    pub fn from_equity_curve(
        curve: &[EquityPoint],
        periods_per_year: f64,
        risk_free_rate: f64,
    ) -> Self {
        let daily = resample_daily(curve);
        let start_equity = daily.first().map(|(_, e)| *e).unwrap_or(0.0);
        let end_equity = daily.last().map(|(_, e)| *e).unwrap_or(0.0);
        let total_return = if start_equity > 0.0 {
            (end_equity - start_equity) / start_equity
        } else {
            0.0
        };

        let equity: Vec<f64> = daily.iter().map(|(_, e)| *e).collect();
        let returns = periodic_returns(&equity);
        let (mdd_pct, mdd, mdd_duration) = compute_drawdown(&equity);
        let period_rf = risk_free_rate / periods_per_year;
        let (sharpe, sortino) = compute_risk_adjusted(&returns, period_rf, periods_per_year);

        ReturnMetrics {
            start_equity,
            end_equity,
            total_return,
            gmean: compute_gmean(&returns, periods_per_year),
            amean: mean(&returns),
            std: population_std(&returns),
            sharpe,
            sortino,
            mdd_pct,
            mdd,
            mdd_duration,
            periods: returns.len(),
        }
    }
}

/// Last equity value of every calendar day, in order.
pub fn resample_daily(curve: &[EquityPoint]) -> Vec<(NaiveDate, f64)> {
    let mut out: Vec<(NaiveDate, f64)> = Vec::new();
    for point in curve {
        let day = point.timestamp.date();
        match out.last_mut() {
            Some((last, equity)) if *last == day => *equity = point.equity,
            _ => out.push((day, point.equity)),
        }
    }
    out
}

fn periodic_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn compute_gmean(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
    growth.powf(periods_per_year / returns.len() as f64) - 1.0
}

fn compute_drawdown(equity: &[f64]) -> (f64, f64, usize) {
    let Some(&first) = equity.first() else {
        return (0.0, 0.0, 0);
    };
    let mut peak = first;
    let mut max_dd_pct = 0.0_f64;
    let mut max_dd = 0.0_f64;
    let mut duration = 0usize;
    let mut max_duration = 0usize;

    for &value in equity {
        if value >= peak {
            peak = value;
            duration = 0;
            continue;
        }
        duration += 1;
        max_duration = max_duration.max(duration);
        max_dd = max_dd.max(peak - value);
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max((peak - value) / peak);
        }
    }
    (max_dd_pct, max_dd, max_duration)
}

fn compute_risk_adjusted(returns: &[f64], period_rf: f64, periods_per_year: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let n = returns.len() as f64;
    let excess_return = mean(returns) - period_rf;
    let stddev = population_std(returns);

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * periods_per_year.sqrt()
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * periods_per_year.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}
