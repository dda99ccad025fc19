//! Job submission, execution and result retrieval.
//!
//! The `Engine` persists a checkpoint for every submitted job and runs the
//! flight on a tokio task. At most `max_workers` flights execute at once;
//! the rest wait for a permit. Callers poll with `retrieve_job`, block with
//! `await_completion`, or fetch the outcome with `retrieve_result`.

mod builder;
mod config;
mod report;

pub use builder::JobBuilder;
pub use config::EngineConfig;
pub use report::{result_url, AsyncJobResult, ErrorReport, JobReport, JobStatus};

use crate::cancellation::CancellationToken;
use crate::errors::{JobError, StoreError};
use crate::flight::{
    Flight, FlightCheckpoint, FlightContext, FlightDefinition, FlightRegistry, FlightStatus,
};
use crate::observability;
use crate::state::{keys, InputParameters, WorkingState};
use crate::store::{CheckpointStore, InMemoryCheckpointStore};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

/// Outcome of `Engine::recover`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Flights that were resumed.
    pub recovered: Vec<String>,
    /// Flights that could not be resumed, with the reason.
    pub failed: Vec<(String, String)>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn CheckpointStore>,
    registry: FlightRegistry,
    workers: Arc<Semaphore>,
    running: DashMap<String, Arc<CancellationToken>>,
    tasks: Mutex<JoinSet<()>>,
    root: CancellationToken,
}

/// Runs flights and answers questions about them.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine over a checkpoint store.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn CheckpointStore>,
        registry: FlightRegistry,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                registry,
                workers,
                running: DashMap::new(),
                tasks: Mutex::new(JoinSet::new()),
                root: CancellationToken::new(),
            }),
        }
    }

    /// Creates an engine with default config and an in-memory store.
    #[must_use]
    pub fn in_memory(registry: FlightRegistry) -> Self {
        Self::new(
            EngineConfig::default(),
            Arc::new(InMemoryCheckpointStore::new()),
            registry,
        )
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The checkpoint store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.inner.store)
    }

    /// Starts building a job.
    pub fn new_job(&self) -> JobBuilder<'_> {
        JobBuilder::new(self)
    }

    /// Number of flights owned by this engine that have not finished.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.inner.running.len()
    }

    /// Submits a flight and returns its job id.
    ///
    /// The initial checkpoint is stored before the flight is scheduled. When
    /// no id is given a UUID is generated.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidJobId` for a blank id,
    /// `JobError::UnknownFlightType`, `JobError::FlightConstruction`,
    /// `JobError::DuplicateJobId` if the id was used before, or a store error.
    pub async fn submit(
        &self,
        flight_type: &str,
        inputs: InputParameters,
        job_id: Option<String>,
    ) -> Result<String, JobError> {
        if self.inner.root.is_cancelled() {
            return Err(JobError::Internal("Engine is shutting down".to_string()));
        }
        let job_id = match job_id {
            Some(id) if id.trim().is_empty() => {
                return Err(JobError::InvalidJobId("jobId cannot be whitespace".to_string()));
            }
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };

        let cancel = CancellationToken::child_of(&self.inner.root);
        let definition = self.build_flight(flight_type, &job_id, &inputs, &cancel)?;
        let state = WorkingState::new(inputs);
        let checkpoint = FlightCheckpoint::new(
            &job_id,
            flight_type,
            definition.step_names(),
            state.snapshot(),
        );

        self.inner
            .store
            .create(&checkpoint)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(id) => JobError::DuplicateJobId(id),
                other => JobError::Store(other),
            })?;

        info!(job_id = %job_id, flight_type = %flight_type, steps = definition.len(), "Submitted job");
        self.launch(checkpoint, definition, cancel)
            .map_err(JobError::Internal)?;
        Ok(job_id)
    }

    /// Submits a flight, waits for it and returns its result.
    ///
    /// # Errors
    ///
    /// See `submit`, `await_completion` and `retrieve_result`.
    pub async fn submit_and_wait<T: DeserializeOwned>(
        &self,
        flight_type: &str,
        inputs: InputParameters,
        job_id: Option<String>,
    ) -> Result<T, JobError> {
        let job_id = self.submit(flight_type, inputs, job_id).await?;
        self.await_completion(&job_id, None).await?;
        self.retrieve_result(&job_id).await
    }

    /// Polls until the job reaches a terminal status.
    ///
    /// Checks at the configured interval, at most `timeout / interval` times.
    /// `timeout` defaults to the configured bound.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Timeout` if the bound is exceeded, and
    /// `JobError::JobNotFound` for unknown ids.
    pub async fn await_completion(
        &self,
        job_id: &str,
        timeout: Option<Duration>,
    ) -> Result<JobReport, JobError> {
        let interval = self.inner.config.polling_interval();
        let timeout = timeout.unwrap_or_else(|| self.inner.config.timeout());
        let cycles = (timeout.as_millis() / interval.as_millis()).max(1);

        for _ in 0..cycles {
            let checkpoint = self.load(job_id).await?;
            if checkpoint.is_complete() {
                return Ok(self.report(&checkpoint));
            }
            tokio::time::sleep(interval).await;
        }
        let checkpoint = self.load(job_id).await?;
        if checkpoint.is_complete() {
            return Ok(self.report(&checkpoint));
        }

        warn!(job_id = %job_id, waited_secs = timeout.as_secs(), "Flight did not complete in the allowed wait time");
        Err(JobError::Timeout {
            job_id: job_id.to_string(),
            waited_secs: timeout.as_secs(),
        })
    }

    /// Waits for several jobs at once, each with the same bound.
    ///
    /// # Errors
    ///
    /// Returns the first error any of the waits produced.
    pub async fn await_all(
        &self,
        job_ids: &[String],
        timeout: Option<Duration>,
    ) -> Result<Vec<JobReport>, JobError> {
        futures::future::try_join_all(
            job_ids
                .iter()
                .map(|job_id| self.await_completion(job_id, timeout)),
        )
        .await
    }

    /// Returns the current report of a job.
    ///
    /// # Errors
    ///
    /// Returns `JobError::JobNotFound` for unknown ids.
    pub async fn retrieve_job(&self, job_id: &str) -> Result<JobReport, JobError> {
        let checkpoint = self.load(job_id).await?;
        Ok(self.report(&checkpoint))
    }

    /// Returns the result of a finished job.
    ///
    /// # Errors
    ///
    /// Returns `JobError::JobNotComplete` while running,
    /// `JobError::FlightFailed` with the recorded error if the job failed,
    /// `JobError::InvalidResultState` if it failed without one, and
    /// `JobError::ResultDeserialization` if the result is not a `T`.
    pub async fn retrieve_result<T: DeserializeOwned>(&self, job_id: &str) -> Result<T, JobError> {
        let checkpoint = self.load(job_id).await?;
        Self::result_of(checkpoint)
    }

    /// Returns the report and, for a finished job, its result or error.
    ///
    /// Unlike `retrieve_result` this does not fail for a running job.
    ///
    /// # Errors
    ///
    /// Returns `JobError::JobNotFound` for unknown ids and
    /// `JobError::ResultDeserialization` if the result is not a `T`.
    pub async fn retrieve_async_result<T: DeserializeOwned>(
        &self,
        job_id: &str,
    ) -> Result<AsyncJobResult<T>, JobError> {
        let checkpoint = self.load(job_id).await?;
        let job_report = self.report(&checkpoint);

        let (result, error_report) = match job_report.status {
            JobStatus::Running => (None, None),
            JobStatus::Succeeded => (Some(Self::result_of::<T>(checkpoint)?), None),
            JobStatus::Failed => match Self::result_of::<T>(checkpoint) {
                Err(e) => (None, Some(ErrorReport::from(&e))),
                Ok(_) => (None, None),
            },
        };

        Ok(AsyncJobResult {
            job_report,
            result,
            error_report,
        })
    }

    /// Resumes every unfinished flight in the store that this engine is not
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns a store error if the active flights cannot be listed.
    pub async fn recover(&self) -> Result<RecoveryReport, JobError> {
        let mut report = RecoveryReport::default();

        for checkpoint in self.inner.store.list_active().await? {
            let flight_id = checkpoint.flight_id.clone();
            if self.inner.running.contains_key(&flight_id) {
                continue;
            }

            let cancel = CancellationToken::child_of(&self.inner.root);
            let inputs = InputParameters::from_data(checkpoint.state.inputs.clone());
            let launched = self
                .build_flight(&checkpoint.flight_type, &flight_id, &inputs, &cancel)
                .map_err(|e| e.to_string())
                .and_then(|definition| self.launch(checkpoint, definition, cancel));

            match launched {
                Ok(()) => {
                    info!(flight_id = %flight_id, "Recovered flight");
                    report.recovered.push(flight_id);
                }
                Err(reason) => {
                    error!(flight_id = %flight_id, reason = %reason, "Could not recover flight");
                    report.failed.push((flight_id, reason));
                }
            }
        }
        Ok(report)
    }

    /// Interrupts every running flight and waits for their tasks to stop.
    ///
    /// Interrupted flights keep a `Running` checkpoint and are picked up by
    /// `recover` on the next start.
    pub async fn shutdown(&self) {
        info!(running = self.inner.running.len(), "Shutting down engine");
        self.inner.root.cancel("engine shutdown");

        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Flight task ended abnormally");
            }
        }
    }

    fn build_flight(
        &self,
        flight_type: &str,
        flight_id: &str,
        inputs: &InputParameters,
        cancel: &Arc<CancellationToken>,
    ) -> Result<FlightDefinition, JobError> {
        let factory = self
            .inner
            .registry
            .get(flight_type)
            .ok_or_else(|| JobError::UnknownFlightType(flight_type.to_string()))?;
        let context = FlightContext::new(flight_id, inputs.clone(), Arc::clone(cancel));
        factory
            .build(&context)
            .map_err(|e| JobError::FlightConstruction(e.to_string()))
    }

    fn launch(
        &self,
        checkpoint: FlightCheckpoint,
        definition: FlightDefinition,
        cancel: Arc<CancellationToken>,
    ) -> Result<(), String> {
        let flight_id = checkpoint.flight_id.clone();
        let flight_type = checkpoint.flight_type.clone();
        let flight = Flight::resume(
            checkpoint,
            definition.into_steps(),
            Arc::clone(&self.inner.store),
            Arc::clone(&cancel),
        )?;

        self.inner.running.insert(flight_id.clone(), Arc::clone(&cancel));
        let span = observability::flight_span(&flight_id, &flight_type);
        let inner = Arc::clone(&self.inner);
        let mut tasks = self.inner.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(
            async move {
                Self::run_flight(&inner, &flight_id, flight, &cancel).await;
                inner.running.remove(&flight_id);
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn run_flight(
        inner: &EngineInner,
        flight_id: &str,
        flight: Flight,
        cancel: &CancellationToken,
    ) {
        let permit = tokio::select! {
            permit = Arc::clone(&inner.workers).acquire_owned() => permit,
            () = cancel.cancelled() => {
                debug!(flight_id = %flight_id, "Flight cancelled before it got a worker");
                return;
            }
        };
        let Ok(_permit) = permit else {
            return;
        };

        match flight.run().await {
            Ok(checkpoint) if checkpoint.is_complete() => info!(
                summary = %observability::flight_summary(&checkpoint),
                "Flight finished"
            ),
            Ok(checkpoint) => debug!(
                flight_id = %flight_id,
                cursor = checkpoint.cursor,
                "Flight task stopped before completion"
            ),
            Err(e) => error!(
                flight_id = %flight_id,
                error = %e,
                "Could not persist flight checkpoint, flight stopped"
            ),
        }
    }

    async fn load(&self, job_id: &str) -> Result<FlightCheckpoint, JobError> {
        self.inner
            .store
            .load_checkpoint(job_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(id) => JobError::JobNotFound(id),
                other => JobError::Store(other),
            })
    }

    fn report(&self, checkpoint: &FlightCheckpoint) -> JobReport {
        JobReport::from_checkpoint(checkpoint, &self.inner.config.domain_name)
    }

    fn result_of<T: DeserializeOwned>(checkpoint: FlightCheckpoint) -> Result<T, JobError> {
        let job_id = checkpoint.flight_id;
        match checkpoint.status {
            FlightStatus::Running => Err(JobError::JobNotComplete(job_id)),
            FlightStatus::Success => {
                let value = checkpoint
                    .state
                    .working
                    .get(keys::RESULT)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);
                serde_json::from_value(value)
                    .map_err(|e| JobError::ResultDeserialization(e.to_string()))
            }
            FlightStatus::Error | FlightStatus::Fatal => {
                if checkpoint.status == FlightStatus::Fatal {
                    error!(
                        alert = true,
                        job_id = %job_id,
                        compensation_error = ?checkpoint.compensation_error.as_ref().map(|e| &e.message),
                        "Flight {} encountered dismal failure", job_id
                    );
                }
                match checkpoint.error {
                    Some(error) => Err(JobError::FlightFailed { job_id, error }),
                    None => Err(JobError::InvalidResultState(format!(
                        "Failed operation without exception for job {job_id}"
                    ))),
                }
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("running", &self.inner.running.len())
            .finish_non_exhaustive()
    }
}
