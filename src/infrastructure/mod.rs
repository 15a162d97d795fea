//! Process wiring: layered configuration and structured logging.

pub mod config;
pub mod logging;
