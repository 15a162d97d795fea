//! Structured logging via `tracing`: JSON or pretty stdout output, plus
//! optional rotating file output.

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
