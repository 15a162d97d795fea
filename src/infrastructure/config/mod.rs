//! Layered configuration: compiled-in defaults, an optional project YAML
//! file, then `SCHEDULER_`-prefixed environment overrides.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, SchedulerConfig};
