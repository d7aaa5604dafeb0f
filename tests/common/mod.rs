#![allow(dead_code)]

use barstep::domain::backtest::BacktestConfig;
use barstep::domain::error::BarstepError;
use barstep::domain::instrument::{Instrument, InstrumentGroup, InstrumentRegistry};
pub use barstep::domain::ohlcv::PriceBar;
use barstep::domain::order::{Order, ReasonCode};
use barstep::domain::time_axis::TimeAxis;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Close prices per symbol, used as the strategy context in most tests.
pub type Closes = HashMap<String, Vec<f64>>;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Midnight of the `day`-th day after 2024-01-01.
pub fn ts(day: i64) -> NaiveDateTime {
    date(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::days(day)
}

pub fn daily_axis(n: usize) -> TimeAxis {
    TimeAxis::new((0..n as i64).map(ts).collect()).unwrap()
}

/// A registry with one group per symbol, each group named after its symbol.
pub fn registry_for(symbols: &[&str]) -> (InstrumentRegistry, Vec<InstrumentGroup>) {
    let mut registry = InstrumentRegistry::new();
    let mut groups = Vec::new();
    for symbol in symbols {
        let group = registry.group(symbol);
        registry.create_instrument(symbol, &group).unwrap();
        groups.push(group);
    }
    (registry, groups)
}

pub fn config(initial_capital: f64, trade_lag: usize) -> BacktestConfig {
    BacktestConfig {
        initial_capital,
        trade_lag,
        ..Default::default()
    }
}

/// Close-price lookup against a [`Closes`] context.
pub fn close_lookup(
    instrument: &Instrument,
    _: &TimeAxis,
    index: usize,
    closes: &Closes,
) -> Result<f64, BarstepError> {
    closes
        .get(instrument.symbol())
        .map(|c| c[index])
        .ok_or_else(|| BarstepError::UnknownInstrument(instrument.symbol().to_string()))
}

pub fn market_buy(
    instrument: &Instrument,
    at: NaiveDateTime,
    quantity: f64,
) -> Result<Vec<Order>, BarstepError> {
    Ok(vec![Order::market(instrument, at, quantity, ReasonCode::EnterLong)?])
}

pub fn make_bar(symbol: &str, timestamp: NaiveDateTime, close: f64) -> PriceBar {
    PriceBar {
        symbol: symbol.to_string(),
        timestamp,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1000,
    }
}

/// Deterministic pseudo-random walk (64-bit LCG), one bar per day.
pub fn random_walk(symbol: &str, seed: u64, n: usize, start: f64) -> Vec<PriceBar> {
    let mut state = seed;
    let mut price = start;
    (0..n)
        .map(|i| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let u = (state >> 11) as f64 / (1u64 << 53) as f64;
            price *= 1.0 + (u - 0.5) * 0.02;
            make_bar(symbol, ts(i as i64), price)
        })
        .collect()
}

/// A second leg tracking `base` with an oscillating spread.
pub fn partner_of(base: &[PriceBar], symbol: &str, scale: f64, period: f64) -> Vec<PriceBar> {
    base.iter()
        .enumerate()
        .map(|(i, bar)| {
            let spread = 1.0 + 0.04 * (i as f64 * std::f64::consts::TAU / period).sin();
            make_bar(symbol, bar.timestamp, bar.close * scale * spread)
        })
        .collect()
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn write_csv(dir: &Path, symbol: &str, bars: &[PriceBar]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for bar in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    std::fs::write(dir.join(format!("{}.csv", symbol)), content).unwrap();
}
