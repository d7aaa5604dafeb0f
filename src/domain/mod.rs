//! Core domain types and simulation logic.

pub mod error;
pub mod instrument;
pub mod time_axis;
pub mod ohlcv;
pub mod series;
pub mod graph;
pub mod indicator;
pub mod signal;
pub mod order;
pub mod rule;
pub mod market;
pub mod execution;
pub mod account;
pub mod backtest;
pub mod strategy;
pub mod metrics;
pub mod config_validation;
