//! Engine configuration.

use crate::errors::FlightdeckError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_max_workers() -> usize {
    10
}

fn default_polling_interval_ms() -> u64 {
    1_000
}

fn default_timeout_seconds() -> u64 {
    1_800
}

fn default_domain_name() -> String {
    "localhost:8080".to_string()
}

/// Configuration for an `Engine`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of flights running at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Interval between status checks in `await_completion`, in milliseconds.
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Default bound for `await_completion`, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Domain used to build job result URLs.
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            polling_interval_ms: default_polling_interval_ms(),
            timeout_seconds: default_timeout_seconds(),
            domain_name: default_domain_name(),
        }
    }
}

impl EngineConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a config from a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `FlightdeckError::Config` if the document is malformed or
    /// `max_workers` is zero.
    pub fn from_json_str(json: &str) -> Result<Self, FlightdeckError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| FlightdeckError::Config(e.to_string()))?;
        if config.max_workers == 0 {
            return Err(FlightdeckError::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_polling_interval_ms(mut self, ms: u64) -> Self {
        self.polling_interval_ms = ms;
        self
    }

    /// Sets the default wait bound.
    #[must_use]
    pub fn with_timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    /// Sets the domain name.
    #[must_use]
    pub fn with_domain_name(mut self, domain: impl Into<String>) -> Self {
        self.domain_name = domain.into();
        self
    }

    /// The polling interval as a duration, never zero.
    #[must_use]
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms.max(1))
    }

    /// The default wait bound as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
