//! Scripted steps.

use crate::state::WorkingState;
use crate::step::{Step, StepOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Ordered record of step calls, shared between steps.
///
/// Entries look like `execute:<step>` and `compensate:<step>`.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.calls.lock().push(entry.into());
    }

    /// All entries so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// How many times `entry` was recorded.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == entry).count()
    }
}

/// A step that returns queued outcomes.
///
/// Once a queue is drained the step succeeds. On a successful execute it
/// writes its outputs to the working state.
#[derive(Debug)]
pub struct ScriptedStep {
    name: String,
    log: Option<CallLog>,
    executions: Mutex<VecDeque<StepOutcome>>,
    compensations: Mutex<VecDeque<StepOutcome>>,
    outputs: Vec<(String, serde_json::Value)>,
}

impl ScriptedStep {
    /// Creates a step that always succeeds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: None,
            executions: Mutex::new(VecDeque::new()),
            compensations: Mutex::new(VecDeque::new()),
            outputs: Vec::new(),
        }
    }

    /// Records calls in `log`.
    #[must_use]
    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    /// Queues an outcome for the next unscripted `execute`.
    #[must_use]
    pub fn then(self, outcome: StepOutcome) -> Self {
        self.executions.lock().push_back(outcome);
        self
    }

    /// Queues an outcome for the next unscripted `compensate`.
    #[must_use]
    pub fn undo_with(self, outcome: StepOutcome) -> Self {
        self.compensations.lock().push_back(outcome);
        self
    }

    /// Writes `value` under `key` whenever `execute` succeeds.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.push((key.into(), value));
        self
    }

    fn record(&self, phase: &str) {
        if let Some(log) = &self.log {
            log.record(format!("{phase}:{}", self.name));
        }
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, state: &WorkingState) -> StepOutcome {
        self.record("execute");
        let outcome = self
            .executions
            .lock()
            .pop_front()
            .unwrap_or_else(StepOutcome::success);
        if outcome.is_success() {
            for (key, value) in &self.outputs {
                state.working().put_raw(key.clone(), value.clone());
            }
        }
        outcome
    }

    async fn compensate(&self, _state: &WorkingState) -> StepOutcome {
        self.record("compensate");
        self.compensations
            .lock()
            .pop_front()
            .unwrap_or_else(StepOutcome::success)
    }
}
