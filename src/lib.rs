//! barstep: event-stepped multi-instrument backtesting engine.
//!
//! Hexagonal architecture: simulation logic in [`domain`], port traits in
//! [`ports`], concrete implementations in [`adapters`], ready-made strategies
//! in [`strategies`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod strategies;
pub mod cli;
