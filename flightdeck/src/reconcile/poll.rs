//! Fixed-interval polling of a resource's provisioning state.

use super::{ExistingResource, ProvisioningState};
use crate::cancellation::CancellationToken;
use crate::provider::ProviderError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

fn default_interval_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    30
}

/// Settings for waiting on a resource that is still provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Seconds between polls.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Number of polls before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Sets the number of polls.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Total wait when every poll is used.
    #[must_use]
    pub fn total_wait_secs(&self) -> u64 {
        u64::from(self.max_attempts) * self.interval_secs
    }

    /// Waits one interval, then polls, until the resource is ready, fails,
    /// the attempts run out, or `cancel` fires.
    pub async fn poll_until_ready<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut fetch: F,
    ) -> PollOutcome
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Option<ExistingResource>, ProviderError>> + Send,
    {
        let interval = Duration::from_secs(self.interval_secs);

        for attempt in 1..=self.max_attempts {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = cancel.cancelled() => return PollOutcome::Interrupted,
            }

            match fetch().await {
                Ok(Some(existing)) if existing.state == ProvisioningState::Succeeded => {
                    return PollOutcome::Ready(existing);
                }
                Ok(Some(existing)) if existing.state.is_terminal_failure() => {
                    return PollOutcome::Failed(existing.state);
                }
                Ok(state) => {
                    debug!(
                        attempt,
                        state = ?state.map(|e| e.state),
                        "Resource not ready yet"
                    );
                }
                Err(e) if e.is_transient() || e.is_not_found() => {
                    debug!(attempt, error = %e, "Poll failed, will try again");
                }
                Err(e) => return PollOutcome::ProviderFailed(e),
            }
        }

        PollOutcome::NotReady {
            waited_secs: self.total_wait_secs(),
        }
    }
}

/// Result of `PollSettings::poll_until_ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The resource reached `Succeeded`.
    Ready(ExistingResource),
    /// The resource reached a failed state.
    Failed(ProvisioningState),
    /// Attempts ran out.
    NotReady {
        /// Seconds spent waiting.
        waited_secs: u64,
    },
    /// The wait was cancelled.
    Interrupted,
    /// The provider returned a non-retryable error while polling.
    ProviderFailed(ProviderError),
}
