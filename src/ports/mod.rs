//! Narrow interfaces to the outside world: configuration and price data.

pub mod config_port;
pub mod data_port;
