//! Step trait and the per-step configuration of a flight.
//!
//! Steps are the reversible units of work that a flight runs in order.

mod outcome;
mod retry;

pub use outcome::{StepOutcome, StepStatus};
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};

use crate::naming::NameRequirement;
use crate::state::WorkingState;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// A reversible unit of work.
///
/// `execute` may be called again with the same state after an ambiguous
/// failure or a restart, so it must be idempotent or reconcile with what
/// already exists. `compensate` may be called when `execute` never ran or
/// never finished, and must treat an already-missing resource as success.
/// Steps keep no state between invocations; everything they need to share
/// goes through the `WorkingState`.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the stable name of the step.
    fn name(&self) -> &str;

    /// Performs the step's work.
    async fn execute(&self, state: &WorkingState) -> StepOutcome;

    /// Undoes the step's work.
    async fn compensate(&self, state: &WorkingState) -> StepOutcome;

    /// Names this step needs generated, with their maximum lengths.
    fn name_requirements(&self) -> Vec<NameRequirement> {
        Vec::new()
    }
}

/// A step together with its retry policy.
#[derive(Debug, Clone)]
pub struct StepEntry {
    /// The step.
    pub step: Arc<dyn Step>,
    /// Retry policy; `None` turns the first `Retry` outcome into `Fatal`.
    pub retry: Option<RetryPolicy>,
}

impl StepEntry {
    /// Creates an entry with no retry policy.
    #[must_use]
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self { step, retry: None }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// The step's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.step.name()
    }
}
