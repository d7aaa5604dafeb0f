//! Rolling-window statistics over raw `f64` arrays.
//!
//! MEAN(n)[i] = sum(x[i-j] for j in 0..n) / n
//! STDDEV(n)[i] = sqrt(sum((x[i-j] - MEAN(n)[i])^2 for j in 0..n) / n)   (population)
//! Warmup: the first (n-1) values are NaN, as is any window containing a NaN.

fn window_at(values: &[f64], i: usize, period: usize) -> Option<&[f64]> {
    if period == 0 || i + 1 < period {
        return None;
    }
    let window = &values[i + 1 - period..=i];
    if window.iter().any(|v| v.is_nan()) {
        None
    } else {
        Some(window)
    }
}

pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| match window_at(values, i, period) {
            Some(window) => window.iter().sum::<f64>() / period as f64,
            None => f64::NAN,
        })
        .collect()
}

pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| match window_at(values, i, period) {
            Some(window) => {
                let mean = window.iter().sum::<f64>() / period as f64;
                let variance = window
                    .iter()
                    .map(|v| {
                        let diff = v - mean;
                        diff * diff
                    })
                    .sum::<f64>()
                    / period as f64;
                variance.sqrt()
            }
            None => f64::NAN,
        })
        .collect()
}

/// (x - MEAN(n)) / STDDEV(n), with warmup and every non-finite result set to 0.
pub fn rolling_zscore(values: &[f64], period: usize) -> Vec<f64> {
    let mean = rolling_mean(values, period);
    let std = rolling_std(values, period);
    values
        .iter()
        .zip(mean.iter().zip(std.iter()))
        .map(|(x, (m, s))| {
            let z = (x - m) / s;
            if z.is_finite() { z } else { 0.0 }
        })
        .collect()
}
