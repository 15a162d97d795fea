use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::logging::LogConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid concurrency: {0}. Must be at least 1")]
    InvalidConcurrency(usize),

    #[error("invalid read_ahead: {0}. Must be at least 1")]
    InvalidReadAhead(usize),

    #[error("invalid sleep_interval_ms: {0}. Must be positive")]
    InvalidSleepInterval(u64),

    #[error("invalid backoff configuration: base_ms ({0}) must not exceed cap_ms ({1})")]
    InvalidBackoff(u64, u64),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// The layered, on-disk-configurable settings for the scheduling engine.
/// `TypeResolver` and `Store` are not represented here — they're
/// constructed in code by the binary that owns the handler
/// implementations and passed alongside this bundle at `Control::start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// If false, newly submitted tasks execute synchronously and bypass
    /// the store entirely.
    #[serde(default = "default_delay_tasks")]
    pub delay_tasks: bool,

    /// Pool size shared across every priority queue.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Poller tick period, in milliseconds.
    #[serde(default = "default_sleep_interval_ms")]
    pub sleep_interval_ms: u64,

    /// Batch size for each poller fetch.
    #[serde(default = "default_read_ahead")]
    pub read_ahead: usize,

    /// Exponential backoff base, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Exponential backoff cap, in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Default priority applied to newly provisioned tasks.
    #[serde(default)]
    pub default_priority: i64,

    /// Default maximum attempts applied to newly provisioned tasks.
    pub default_maximum_attempts: Option<u32>,

    /// Default maximum runtime (milliseconds) applied to newly
    /// provisioned tasks.
    pub default_maximum_runtime_ms: Option<u64>,

    #[serde(default)]
    pub default_delete_on_success: bool,

    #[serde(default)]
    pub default_delete_on_failure: bool,

    #[serde(default)]
    pub default_delete_on_error: bool,

    /// SQLite connection string for the durable store.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Identifier this process records as `locked_by` on claimed rows.
    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    #[serde(default)]
    pub logging: LogConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delay_tasks: default_delay_tasks(),
            concurrency: default_concurrency(),
            sleep_interval_ms: default_sleep_interval_ms(),
            read_ahead: default_read_ahead(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            default_priority: 0,
            default_maximum_attempts: None,
            default_maximum_runtime_ms: None,
            default_delete_on_success: false,
            default_delete_on_failure: false,
            default_delete_on_error: false,
            database_url: default_database_url(),
            worker_id: default_worker_id(),
            logging: LogConfig::default(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

fn default_delay_tasks() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_sleep_interval_ms() -> u64 {
    1_000
}

fn default_read_ahead() -> usize {
    10
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

fn default_database_url() -> String {
    "sqlite:.scheduler/scheduler.db".to_string()
}

fn default_worker_id() -> String {
    hostname_or_fallback()
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "scheduler-worker".to_string())
}

/// Loads `SchedulerConfig` with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest): compiled-in defaults,
    /// `.scheduler/config.yaml` (project config), then
    /// `SCHEDULER_`-prefixed environment variables.
    pub fn load() -> Result<SchedulerConfig> {
        let config: SchedulerConfig = Figment::new()
            .merge(Serialized::defaults(SchedulerConfig::default()))
            .merge(Yaml::file(".scheduler/config.yaml"))
            .merge(Env::prefixed("SCHEDULER_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping the project
    /// default path. Used by tests and the CLI's `--config` flag.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SchedulerConfig> {
        let config: SchedulerConfig = Figment::new()
            .merge(Serialized::defaults(SchedulerConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("SCHEDULER_").split("__"))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &SchedulerConfig) -> Result<(), ConfigError> {
        if config.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(config.concurrency));
        }
        if config.read_ahead == 0 {
            return Err(ConfigError::InvalidReadAhead(config.read_ahead));
        }
        if config.sleep_interval_ms == 0 {
            return Err(ConfigError::InvalidSleepInterval(config.sleep_interval_ms));
        }
        if config.backoff_base_ms > config.backoff_cap_ms {
            return Err(ConfigError::InvalidBackoff(config.backoff_base_ms, config.backoff_cap_ms));
        }
        if config.database_url.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert!(config.delay_tasks);
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let yaml = r"
concurrency: 8
read_ahead: 50
logging:
  level: debug
  format: pretty
";
        let config: SchedulerConfig = Figment::new()
            .merge(Serialized::defaults(SchedulerConfig::default()))
            .merge(figment::providers::Yaml::string(yaml))
            .extract()
            .unwrap();

        assert_eq!(config.concurrency, 8);
        assert_eq!(config.read_ahead, 50);
        assert_eq!(config.logging.level, "debug");
        assert!(config.delay_tasks, "unset fields keep their default");
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let config = SchedulerConfig {
            concurrency: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn validate_rejects_backoff_base_above_cap() {
        let config = SchedulerConfig {
            backoff_base_ms: 5_000,
            backoff_cap_ms: 1_000,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(5_000, 1_000))
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = SchedulerConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn env_override_takes_precedence() {
        temp_env::with_var("SCHEDULER_CONCURRENCY", Some("16"), || {
            let config: SchedulerConfig = Figment::new()
                .merge(Serialized::defaults(SchedulerConfig::default()))
                .merge(Env::prefixed("SCHEDULER_").split("__"))
                .extract()
                .unwrap();
            assert_eq!(config.concurrency, 16);
        });
    }
}
