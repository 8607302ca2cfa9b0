//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `dealflow.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use dealflow_app::execution_coordinator::RetryPolicy;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Retry behaviour of rule executions.
    pub automation: AutomationConfig,
    /// Periodic trigger sweeps.
    pub scheduler: SchedulerConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
    /// Pool size for file-backed databases.
    pub max_connections: u32,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Execution retry settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Retries allowed after the first failed attempt.
    pub max_retries: u32,
    /// Backoff unit in milliseconds; retry `n` waits `n` units.
    pub retry_base_delay_ms: u64,
    /// How often the retry worker polls for due entries.
    pub retry_poll_interval_ms: u64,
    /// Capacity of the in-process event bus.
    pub event_bus_capacity: usize,
    /// How often the outbox relay polls `domain_events`.
    pub event_poll_interval_ms: u64,
    /// How long a claimed retry stays hidden from other polls.
    pub retry_lease_secs: u64,
}

/// Sweep intervals for date- and time-based triggers.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub date_sweep_interval_secs: u64,
    pub time_sweep_interval_secs: u64,
}

impl Config {
    /// Load configuration from `dealflow.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("dealflow.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DEALFLOW_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("DEALFLOW_MAX_RETRIES") {
            if let Ok(max_retries) = val.parse() {
                self.automation.max_retries = max_retries;
            }
        }
        if let Ok(val) = std::env::var("DEALFLOW_RETRY_BASE_DELAY_MS") {
            if let Ok(delay) = val.parse() {
                self.automation.retry_base_delay_ms = delay;
            }
        }
        if let Ok(val) = std::env::var("DEALFLOW_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database url must not be empty".to_string(),
            ));
        }
        if self.automation.retry_poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "retry poll interval must be non-zero".to_string(),
            ));
        }
        if self.automation.event_poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "event poll interval must be non-zero".to_string(),
            ));
        }
        if self.automation.retry_lease_secs == 0 {
            return Err(ConfigError::Validation(
                "retry lease must be non-zero".to_string(),
            ));
        }
        if self.automation.event_bus_capacity == 0 {
            return Err(ConfigError::Validation(
                "event bus capacity must be non-zero".to_string(),
            ));
        }
        if self.scheduler.date_sweep_interval_secs == 0
            || self.scheduler.time_sweep_interval_secs == 0
        {
            return Err(ConfigError::Validation(
                "sweep intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Retry budget and backoff for the execution coordinator.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.automation.max_retries,
            base_delay: Duration::from_millis(self.automation.retry_base_delay_ms),
        }
    }

    #[must_use]
    pub fn retry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.automation.retry_poll_interval_ms)
    }

    #[must_use]
    pub fn retry_lease(&self) -> Duration {
        Duration::from_secs(self.automation.retry_lease_secs)
    }

    #[must_use]
    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.automation.event_poll_interval_ms)
    }

    #[must_use]
    pub fn date_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.date_sweep_interval_secs)
    }

    #[must_use]
    pub fn time_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.time_sweep_interval_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:dealflow.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "dealflowd=info,dealflow_app=info,dealflow_adapter_storage_sqlite_sqlx=info"
                .to_string(),
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            retry_base_delay_ms: u64::try_from(policy.base_delay.as_millis()).unwrap_or(1000),
            retry_poll_interval_ms: 250,
            event_bus_capacity: 256,
            event_poll_interval_ms: 500,
            retry_lease_secs: 300,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            date_sweep_interval_secs: 3600,
            time_sweep_interval_secs: 60,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
