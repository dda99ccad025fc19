//! The flight state machine.

use super::{Direction, FlightCheckpoint, FlightStatus};
use crate::cancellation::CancellationToken;
use crate::errors::{StepError, StoreError};
use crate::state::WorkingState;
use crate::step::{StepEntry, StepOutcome, StepStatus};
use crate::store::CheckpointStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Which step operation is being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Execute,
    Compensate,
}

/// Drives one flight from its checkpoint to a terminal status.
///
/// The checkpoint is written after every step outcome, so a crashed flight
/// resumes at the exact step and direction it stopped at.
pub struct Flight {
    checkpoint: FlightCheckpoint,
    steps: Vec<StepEntry>,
    state: WorkingState,
    store: Arc<dyn CheckpointStore>,
    cancel: Arc<CancellationToken>,
}

impl Flight {
    /// Prepares a flight for running from a stored checkpoint.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch if the steps do not match the
    /// ones recorded in the checkpoint.
    pub fn resume(
        checkpoint: FlightCheckpoint,
        steps: Vec<StepEntry>,
        store: Arc<dyn CheckpointStore>,
        cancel: Arc<CancellationToken>,
    ) -> Result<Self, String> {
        let names: Vec<&str> = steps.iter().map(StepEntry::name).collect();
        if names != checkpoint.step_names() {
            return Err(format!(
                "flight {} was checkpointed with steps {:?} but was rebuilt with {:?}",
                checkpoint.flight_id,
                checkpoint.step_names(),
                names
            ));
        }

        let state = WorkingState::from_snapshot(checkpoint.state.clone());
        Ok(Self {
            checkpoint,
            steps,
            state,
            store,
            cancel,
        })
    }

    /// The current checkpoint.
    #[must_use]
    pub fn checkpoint(&self) -> &FlightCheckpoint {
        &self.checkpoint
    }

    /// Runs until the flight terminates or is interrupted.
    ///
    /// Returns the last checkpoint written. An interrupted flight comes back
    /// with status `Running` and can be resumed later.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a checkpoint could not be written; the flight
    /// stops immediately in that case.
    pub async fn run(mut self) -> Result<FlightCheckpoint, StoreError> {
        info!(
            flight_id = %self.checkpoint.flight_id,
            flight_type = %self.checkpoint.flight_type,
            cursor = self.checkpoint.cursor,
            direction = ?self.checkpoint.direction,
            "Running flight"
        );

        while !self.checkpoint.is_complete() {
            if self.cancel.is_cancelled() {
                return Ok(self.halt());
            }

            let keep_going = match self.checkpoint.direction {
                Direction::Forward => self.step_forward().await?,
                Direction::Reverse => self.step_reverse().await?,
            };
            if !keep_going {
                return Ok(self.halt());
            }
        }

        Ok(self.checkpoint)
    }

    fn halt(self) -> FlightCheckpoint {
        warn!(
            flight_id = %self.checkpoint.flight_id,
            cursor = self.checkpoint.cursor,
            direction = ?self.checkpoint.direction,
            reason = ?self.cancel.reason(),
            "Flight interrupted, checkpoint left resumable"
        );
        self.checkpoint
    }

    /// Executes the step at the cursor. Returns false if interrupted.
    async fn step_forward(&mut self) -> Result<bool, StoreError> {
        let index = self.checkpoint.cursor;
        if index >= self.steps.len() {
            self.finish(FlightStatus::Success).await?;
            info!(flight_id = %self.checkpoint.flight_id, "Flight succeeded");
            return Ok(true);
        }

        let outcome = self.drive(index, Phase::Execute).await?;
        if outcome.is_interrupted() {
            return Ok(false);
        }

        let step = self.steps[index].name().to_string();
        if outcome.is_success() {
            self.checkpoint.steps[index].succeeded = true;
            self.checkpoint.cursor += 1;
            info!(flight_id = %self.checkpoint.flight_id, step = %step, "Step succeeded");
        } else {
            let error = outcome
                .into_error()
                .unwrap_or_else(|| StepError::internal("step failed without an error"));
            warn!(
                flight_id = %self.checkpoint.flight_id,
                step = %step,
                kind = %error.kind,
                error = %error,
                "Step failed, compensating completed steps"
            );
            self.checkpoint.error = Some(error);
            self.checkpoint.direction = Direction::Reverse;
        }
        self.save().await?;
        Ok(true)
    }

    /// Compensates the step before the cursor. Returns false if interrupted.
    async fn step_reverse(&mut self) -> Result<bool, StoreError> {
        if self.checkpoint.cursor == 0 {
            self.finish(FlightStatus::Error).await?;
            info!(
                flight_id = %self.checkpoint.flight_id,
                compensated = ?self.checkpoint.compensated_steps(),
                "Flight failed, compensation complete"
            );
            return Ok(true);
        }

        let index = self.checkpoint.cursor - 1;
        if !self.checkpoint.steps[index].succeeded || self.checkpoint.steps[index].compensated {
            self.checkpoint.cursor -= 1;
            self.save().await?;
            return Ok(true);
        }

        let outcome = self.drive(index, Phase::Compensate).await?;
        if outcome.is_interrupted() {
            return Ok(false);
        }

        let step = self.steps[index].name().to_string();
        if outcome.is_success() {
            self.checkpoint.steps[index].compensated = true;
            self.checkpoint.cursor -= 1;
            info!(flight_id = %self.checkpoint.flight_id, step = %step, "Step compensated");
            self.save().await?;
        } else {
            let error = outcome
                .into_error()
                .unwrap_or_else(|| StepError::compensation("compensation failed without an error"));
            error!(
                alert = true,
                flight_id = %self.checkpoint.flight_id,
                step = %step,
                error = %error,
                cause = ?error.cause,
                "Compensation failed, flight is in a dismal state and needs manual cleanup"
            );
            self.checkpoint.compensation_error = Some(error);
            self.finish(FlightStatus::Fatal).await?;
        }
        Ok(true)
    }

    /// Runs one step operation, retrying per the step's policy.
    ///
    /// Only `Success`, `Fatal` or an interrupted outcome come back; an
    /// exhausted `Retry` is turned into `Fatal`.
    async fn drive(&mut self, index: usize, phase: Phase) -> Result<StepOutcome, StoreError> {
        let entry = self.steps[index].clone();
        let mut previous_delay: Option<Duration> = None;

        loop {
            let attempts = {
                let record = &mut self.checkpoint.steps[index];
                let counter = match phase {
                    Phase::Execute => &mut record.attempts,
                    Phase::Compensate => &mut record.compensation_attempts,
                };
                *counter += 1;
                *counter
            };
            debug!(
                flight_id = %self.checkpoint.flight_id,
                step = %entry.name(),
                attempt = attempts,
                phase = ?phase,
                "Invoking step"
            );

            let outcome = match phase {
                Phase::Execute => entry.step.execute(&self.state).await,
                Phase::Compensate => entry.step.compensate(&self.state).await,
            };
            self.checkpoint.state = self.state.snapshot();

            if outcome.is_interrupted() {
                self.save().await?;
                return Ok(outcome);
            }

            match outcome.status() {
                StepStatus::Success | StepStatus::Fatal => return Ok(outcome),
                StepStatus::Retry => {}
            }

            let error = outcome
                .into_error()
                .unwrap_or_else(|| StepError::internal("retry requested without an error"));
            let Some(policy) = entry.retry.as_ref().filter(|p| p.allows_another(attempts)) else {
                warn!(
                    flight_id = %self.checkpoint.flight_id,
                    step = %entry.name(),
                    attempts,
                    error = %error,
                    "Retries exhausted"
                );
                return Ok(StepOutcome::fatal(error));
            };

            self.save().await?;
            let delay = policy.delay_after(attempts, previous_delay);
            warn!(
                flight_id = %self.checkpoint.flight_id,
                step = %entry.name(),
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Step asked for retry"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => {
                    return Ok(StepOutcome::fatal(
                        StepError::interrupted("Retry wait was interrupted").with_step(entry.name()),
                    ));
                }
            }
            previous_delay = Some(delay);
        }
    }

    async fn finish(&mut self, status: FlightStatus) -> Result<(), StoreError> {
        self.checkpoint.status = status;
        self.checkpoint.completed_at = Some(Utc::now());
        self.save().await
    }

    async fn save(&mut self) -> Result<(), StoreError> {
        self.checkpoint.updated_at = Utc::now();
        self.store.save_checkpoint(&self.checkpoint).await
    }
}

impl std::fmt::Debug for Flight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight")
            .field("flight_id", &self.checkpoint.flight_id)
            .field("status", &self.checkpoint.status)
            .field("cursor", &self.checkpoint.cursor)
            .finish_non_exhaustive()
    }
}
