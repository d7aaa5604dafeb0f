//! Concrete implementations of the ports.

pub mod csv_adapter;
pub mod file_config_adapter;
