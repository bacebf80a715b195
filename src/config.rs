//! Operator configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional TOML or JSON file, and `WEBAPP_OPERATOR_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use webapp_reconciler::{ExponentialBackoff, ReconcilerConfig};

use crate::error::{Error, Result};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "WEBAPP_OPERATOR_";

/// Upper bound on worker count.
pub const MAX_WORKERS: usize = 64;

/// Configuration for the operator process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    /// Number of concurrent reconciler workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delay before re-checking a converged WebApp.
    #[serde(
        rename = "resync_secs",
        with = "duration_secs",
        default = "default_resync_interval"
    )]
    pub resync_interval: Duration,

    /// Retry delay after the first failure.
    #[serde(
        rename = "backoff_base_ms",
        with = "duration_millis",
        default = "default_backoff_base"
    )]
    pub backoff_base: Duration,

    /// Ceiling on the retry delay.
    #[serde(
        rename = "backoff_max_secs",
        with = "duration_secs",
        default = "default_backoff_max"
    )]
    pub backoff_max: Duration,

    /// Time the simulated rollout takes to report replicas available.
    #[serde(
        rename = "rollout_delay_ms",
        with = "duration_millis",
        default = "default_rollout_delay"
    )]
    pub rollout_delay: Duration,

    /// Tracing filter directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log")]
    pub log: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resync_interval: default_resync_interval(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            rollout_delay: default_rollout_delay(),
            log: default_log(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a file; `.json` files are read as JSON,
    /// everything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| Error::config_parse(path, e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| Error::config_parse(path, e.to_string()))
        }
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is not a valid number.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `WEBAPP_OPERATOR_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is not a valid number.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("WORKERS") {
            self.workers = parse_number("WORKERS", &value)?;
        }
        if let Some(value) = var("RESYNC_SECS") {
            self.resync_interval = Duration::from_secs(parse_number("RESYNC_SECS", &value)?);
        }
        if let Some(value) = var("BACKOFF_BASE_MS") {
            self.backoff_base = Duration::from_millis(parse_number("BACKOFF_BASE_MS", &value)?);
        }
        if let Some(value) = var("BACKOFF_MAX_SECS") {
            self.backoff_max = Duration::from_secs(parse_number("BACKOFF_MAX_SECS", &value)?);
        }
        if let Some(value) = var("ROLLOUT_DELAY_MS") {
            self.rollout_delay = Duration::from_millis(parse_number("ROLLOUT_DELAY_MS", &value)?);
        }
        if let Some(value) = var("LOG") {
            self.log = value;
        }
        Ok(self)
    }

    /// Set the number of workers.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(Error::invalid_config(format!(
                "workers must be between 1 and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if self.resync_interval.is_zero() {
            return Err(Error::invalid_config("resync_secs must be positive"));
        }
        if self.backoff_base.is_zero() {
            return Err(Error::invalid_config("backoff_base_ms must be positive"));
        }
        if self.backoff_max < self.backoff_base {
            return Err(Error::invalid_config(
                "backoff_max_secs must not be below backoff_base_ms",
            ));
        }
        Ok(())
    }

    /// Failure backoff curve for the work queue.
    #[must_use]
    pub const fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.backoff_base, self.backoff_max)
    }

    /// Settings for the reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            resync_interval: self.resync_interval,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        Error::invalid_config(format!("{ENV_PREFIX}{name}='{value}' is not a valid number: {e}"))
    })
}

const fn default_workers() -> usize {
    webapp_reconciler::controller::DEFAULT_WORKERS
}

const fn default_resync_interval() -> Duration {
    webapp_reconciler::DEFAULT_RESYNC_INTERVAL
}

const fn default_backoff_base() -> Duration {
    webapp_reconciler::backoff::DEFAULT_BASE_DELAY
}

const fn default_backoff_max() -> Duration {
    webapp_reconciler::backoff::DEFAULT_MAX_DELAY
}

const fn default_rollout_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_log() -> String {
    "info".to_string()
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serialization helper for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
