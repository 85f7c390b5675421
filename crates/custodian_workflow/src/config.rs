//! Workflow timing and retry configuration.

use config::{Config, File};
use custodian_error::{ConfigError, ConfigErrorKind, CustodianResult};
use derive_builder::Builder;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_ATTEMPTS_LIMIT: u32 = 5;

/// Bounded retry policy for one external step.
///
/// # Examples
///
/// ```
/// use custodian_workflow::RetryPolicy;
///
/// let policy = RetryPolicy::with_attempts(3);
/// assert_eq!(*policy.max_attempts(), 3);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, Builder)]
#[builder(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1..=5).
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,

    /// Base of the exponential backoff, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    initial_backoff_ms: u64,

    /// Upper bound of a single backoff delay, in seconds.
    #[serde(default = "default_max_delay_secs")]
    max_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_delay_secs() -> u64 {
    30
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetryPolicy {
    /// Default backoff with the given attempt count.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Check the attempt bound.
    ///
    /// # Errors
    ///
    /// Returns an error unless `max_attempts` lies in 1..=5.
    pub fn validate(&self) -> CustodianResult<()> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ConfigError::invalid(
                "max_attempts",
                format!(
                    "must be in 1..={}, got {}",
                    MAX_ATTEMPTS_LIMIT, self.max_attempts
                ),
            )
            .into());
        }
        Ok(())
    }
}

/// Configuration of the orchestration workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, Builder)]
#[builder(default)]
pub struct WorkflowConfig {
    /// Interval between status re-checks of in-progress items, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,

    /// Retry policy of the orchestrator's external steps.
    #[serde(default = "default_orchestrator_retry")]
    orchestrator_retry: RetryPolicy,

    /// Retry policy of a silo coordinator's external steps.
    #[serde(default = "default_coordinator_retry")]
    coordinator_retry: RetryPolicy,
}

fn default_poll_interval_secs() -> u64 {
    3600
}

fn default_orchestrator_retry() -> RetryPolicy {
    RetryPolicy::with_attempts(2)
}

fn default_coordinator_retry() -> RetryPolicy {
    RetryPolicy::with_attempts(5)
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            orchestrator_retry: default_orchestrator_retry(),
            coordinator_retry: default_coordinator_retry(),
        }
    }
}

impl WorkflowConfig {
    /// Creates a new config builder.
    pub fn builder() -> WorkflowConfigBuilder {
        WorkflowConfigBuilder::default()
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validate both retry policies and the poll interval.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting.
    pub fn validate(&self) -> CustodianResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::invalid("poll_interval_secs", "must be positive").into());
        }
        self.orchestrator_retry.validate()?;
        self.coordinator_retry.validate()?;
        Ok(())
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> CustodianResult<Self> {
        debug!("Loading workflow configuration from file");

        let config: WorkflowConfig = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                ConfigError::new(ConfigErrorKind::Load {
                    origin: path.as_ref().display().to_string(),
                    reason: e.to_string(),
                })
            })?
            .try_deserialize()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Parse(e.to_string())))?;

        config.validate()?;
        Ok(config)
    }
}
