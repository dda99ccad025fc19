//! End-to-end tests for flights and the engine.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::engine::{Engine, EngineConfig, JobStatus};
    use crate::errors::{FlightdeckError, JobError, StepError, StepErrorKind};
    use crate::flight::{
        Flight, FlightCheckpoint, FlightContext, FlightDefinition, FlightFactory, FlightRegistry,
        FlightStatus,
    };
    use crate::naming::{
        ResourceNameProvider, MAX_AKS_CLUSTER_NAME_LENGTH, MAX_POSTGRESQL_SERVER_NAME_LENGTH,
        MAX_STORAGE_ACCOUNT_NAME_LENGTH, MAX_VNET_NAME_LENGTH,
    };
    use crate::provider::ProviderError;
    use crate::reconcile::{ConflictReconciler, PollSettings};
    use crate::state::{InputParameters, ResourceRecord, WorkingState};
    use crate::step::{RetryPolicy, Step, StepEntry, StepOutcome};
    use crate::store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
    use crate::template::{ResourceCreateStep, ResourceSpec};
    use crate::testing::{FakeCloud, ScriptedStep};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio_test::{assert_err, assert_ok};

    fn unavailable() -> ProviderError {
        ProviderError::new("ServiceUnavailable", "Service unavailable").with_status(503)
    }

    fn resource_step(
        cloud: &Arc<FakeCloud>,
        names: &Arc<ResourceNameProvider>,
        spec: ResourceSpec,
    ) -> ResourceCreateStep<FakeCloud> {
        ResourceCreateStep::new(
            spec,
            Arc::clone(cloud),
            Arc::clone(names),
            Arc::new(CancellationToken::new()),
        )
        .unwrap()
    }

    async fn run_flight(flight_id: &str, steps: Vec<StepEntry>) -> FlightCheckpoint {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let names = steps.iter().map(|s| s.name().to_string());
        let state = WorkingState::new(InputParameters::new().with("region", "westeurope"));
        let checkpoint = FlightCheckpoint::new(flight_id, "test", names, state.snapshot());
        store.create(&checkpoint).await.unwrap();
        Flight::resume(checkpoint, steps, store, Arc::new(CancellationToken::new()))
            .unwrap()
            .run()
            .await
            .unwrap()
    }

    // ---- resource steps inside a flight ----

    #[tokio::test(start_paused = true)]
    async fn test_replayed_create_after_lost_response_creates_once() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.lose_create_responses("NETWORK", 1);
        let names = Arc::new(ResourceNameProvider::new("lz-replay"));
        let step = resource_step(&cloud, &names, ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH));

        let checkpoint = run_flight(
            "lz-replay",
            vec![StepEntry::new(Arc::new(step))
                .with_retry(RetryPolicy::fixed(Duration::from_secs(5), 3))],
        )
        .await;

        assert_eq!(checkpoint.status, FlightStatus::Success);
        assert_eq!(checkpoint.steps[0].attempts, 2);
        assert_eq!(cloud.create_calls("NETWORK"), 2);
        let ids = cloud.resources_of("NETWORK");
        assert_eq!(ids.len(), 1);
        assert_eq!(checkpoint.state.working["NETWORK_ID"], json!(ids[0]));
    }

    #[tokio::test]
    async fn test_fatal_step_compensates_completed_steps_in_reverse() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.fail_creates(
            "DATABASE",
            1,
            &ProviderError::new("InvalidTemplate", "Template is invalid").with_status(400),
        );
        let names = Arc::new(ResourceNameProvider::new("lz-undo"));
        let network =
            resource_step(&cloud, &names, ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH));
        let storage = resource_step(
            &cloud,
            &names,
            ResourceSpec::new("STORAGE", MAX_STORAGE_ACCOUNT_NAME_LENGTH)
                .with_prerequisite("NETWORK_ID"),
        );
        let database = resource_step(
            &cloud,
            &names,
            ResourceSpec::new("DATABASE", MAX_POSTGRESQL_SERVER_NAME_LENGTH)
                .with_prerequisite("NETWORK_ID"),
        );

        let checkpoint = run_flight(
            "lz-undo",
            vec![
                StepEntry::new(Arc::new(network)),
                StepEntry::new(Arc::new(storage)),
                StepEntry::new(Arc::new(database)),
            ],
        )
        .await;

        assert_eq!(checkpoint.status, FlightStatus::Error);
        assert_eq!(
            checkpoint.compensated_steps(),
            vec!["create_storage", "create_network"]
        );
        assert_eq!(cloud.delete_calls("DATABASE"), 0);
        assert_eq!(cloud.delete_calls("STORAGE"), 1);
        assert!(cloud.is_empty());

        let error = checkpoint.error.unwrap();
        assert_eq!(error.kind, StepErrorKind::RemotePermanent);
        assert_eq!(error.message, "Template is invalid");
        assert_eq!(error.status_code, 400);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_after_max_attempts_then_compensates() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.fail_creates("DATABASE", 5, &unavailable());
        let names = Arc::new(ResourceNameProvider::new("lz-exhaust"));
        let network =
            resource_step(&cloud, &names, ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH));
        let database = resource_step(
            &cloud,
            &names,
            ResourceSpec::new("DATABASE", MAX_POSTGRESQL_SERVER_NAME_LENGTH),
        );

        let checkpoint = run_flight(
            "lz-exhaust",
            vec![
                StepEntry::new(Arc::new(network)),
                StepEntry::new(Arc::new(database))
                    .with_retry(RetryPolicy::fixed(Duration::from_secs(10), 3)),
            ],
        )
        .await;

        assert_eq!(checkpoint.status, FlightStatus::Error);
        assert_eq!(cloud.create_calls("DATABASE"), 3);
        assert_eq!(checkpoint.steps[1].attempts, 3);
        assert_eq!(checkpoint.compensated_steps(), vec!["create_network"]);
        assert_eq!(checkpoint.error.unwrap().kind, StepErrorKind::RemoteTransient);
    }

    #[tokio::test]
    async fn test_failed_compensation_ends_fatal() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.fail_creates(
            "STORAGE",
            1,
            &ProviderError::new("AuthorizationFailed", "Not allowed").with_status(403),
        );
        cloud.fail_deletes(
            "NETWORK",
            1,
            &ProviderError::new("InternalServerError", "boom").with_status(500),
        );
        let names = Arc::new(ResourceNameProvider::new("lz-dismal"));
        let network =
            resource_step(&cloud, &names, ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH));
        let storage = resource_step(
            &cloud,
            &names,
            ResourceSpec::new("STORAGE", MAX_STORAGE_ACCOUNT_NAME_LENGTH),
        );

        let checkpoint = run_flight(
            "lz-dismal",
            vec![StepEntry::new(Arc::new(network)), StepEntry::new(Arc::new(storage))],
        )
        .await;

        assert_eq!(checkpoint.status, FlightStatus::Fatal);
        assert_eq!(checkpoint.error.unwrap().status_code, 403);
        assert_eq!(
            checkpoint.compensation_error.unwrap().kind,
            StepErrorKind::Compensation
        );
        assert_eq!(cloud.resources_of("NETWORK").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_delete_failure_is_retried_and_flight_ends_error() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.fail_creates(
            "STORAGE",
            1,
            &ProviderError::new("AuthorizationFailed", "Not allowed").with_status(403),
        );
        cloud.fail_deletes("NETWORK", 1, &unavailable());
        let names = Arc::new(ResourceNameProvider::new("lz-undo-retry"));
        let network =
            resource_step(&cloud, &names, ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH));
        let storage = resource_step(
            &cloud,
            &names,
            ResourceSpec::new("STORAGE", MAX_STORAGE_ACCOUNT_NAME_LENGTH),
        );

        let checkpoint = run_flight(
            "lz-undo-retry",
            vec![
                StepEntry::new(Arc::new(network))
                    .with_retry(RetryPolicy::fixed(Duration::from_secs(10), 3)),
                StepEntry::new(Arc::new(storage)),
            ],
        )
        .await;

        assert_eq!(checkpoint.status, FlightStatus::Error);
        assert!(checkpoint.compensation_error.is_none());
        assert_eq!(checkpoint.steps[0].compensation_attempts, 2);
        assert_eq!(cloud.delete_calls("NETWORK"), 2);
        assert!(cloud.resources_of("NETWORK").is_empty());
    }

    // ---- the resource template on its own ----

    #[tokio::test]
    async fn test_conflict_accepts_existing_resource_without_second_create() {
        let cloud = Arc::new(FakeCloud::new());
        let names = Arc::new(ResourceNameProvider::new("lz-conflict"));
        let step = resource_step(&cloud, &names, ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH));

        let first = WorkingState::new(InputParameters::new());
        assert!(step.execute(&first).await.is_success());

        let replay = WorkingState::new(InputParameters::new());
        assert!(step.execute(&replay).await.is_success());

        assert_eq!(cloud.len(), 1);
        assert_eq!(
            replay.working().get_required::<String>("NETWORK_ID").unwrap(),
            first.working().get_required::<String>("NETWORK_ID").unwrap()
        );
        let record: ResourceRecord = replay.working().get_required("NETWORK").unwrap();
        assert_eq!(record.resource_type, "NETWORK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_gives_up_with_elapsed_wait() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.provision_slowly("AKS", u32::MAX);
        let names = Arc::new(ResourceNameProvider::new("lz-poll"));
        let step = resource_step(&cloud, &names, ResourceSpec::new("AKS", MAX_AKS_CLUSTER_NAME_LENGTH))
            .with_reconciler(ConflictReconciler::new(
                PollSettings::new().with_interval_secs(30).with_max_attempts(3),
            ));

        assert!(step.execute(&WorkingState::new(InputParameters::new())).await.is_success());

        let outcome = step.execute(&WorkingState::new(InputParameters::new())).await;
        assert!(outcome.is_fatal());
        let error = outcome.into_error().unwrap();
        assert_eq!(error.kind, StepErrorKind::ResourceNotReady);
        assert_eq!(error.message, "AKS resource still not ready after 90 sec.");
    }

    #[tokio::test]
    async fn test_undo_without_created_resource_makes_no_remote_call() {
        let cloud = Arc::new(FakeCloud::new());
        let names = Arc::new(ResourceNameProvider::new("lz-noop"));
        let step = resource_step(&cloud, &names, ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH));

        let outcome = step.compensate(&WorkingState::new(InputParameters::new())).await;

        assert!(outcome.is_success());
        assert_eq!(cloud.delete_calls("NETWORK"), 0);
    }

    // ---- engine ----

    /// Blocks until a permit is available or the flight is cancelled.
    #[derive(Debug)]
    struct GatedStep {
        gate: Arc<Semaphore>,
        cancel: Arc<CancellationToken>,
    }

    #[async_trait]
    impl Step for GatedStep {
        fn name(&self) -> &str {
            "wait_for_gate"
        }

        async fn execute(&self, state: &WorkingState) -> StepOutcome {
            tokio::select! {
                permit = self.gate.acquire() => match permit {
                    Ok(_) => {
                        state.working().put_raw("response", json!("done"));
                        StepOutcome::success()
                    }
                    Err(_) => StepOutcome::fatal(StepError::internal("gate closed")),
                },
                () = self.cancel.cancelled() => {
                    StepOutcome::fatal(StepError::interrupted("gate wait interrupted"))
                }
            }
        }

        async fn compensate(&self, _state: &WorkingState) -> StepOutcome {
            StepOutcome::success()
        }
    }

    struct GatedFlight {
        gate: Arc<Semaphore>,
    }

    impl FlightFactory for GatedFlight {
        fn flight_type(&self) -> &str {
            "gated"
        }

        fn build(&self, context: &FlightContext) -> Result<FlightDefinition, FlightdeckError> {
            Ok(FlightDefinition::builder()
                .step(GatedStep {
                    gate: Arc::clone(&self.gate),
                    cancel: context.cancel_token(),
                })
                .build())
        }
    }

    struct FailingFlight;

    impl FlightFactory for FailingFlight {
        fn flight_type(&self) -> &str {
            "failing"
        }

        fn build(&self, _context: &FlightContext) -> Result<FlightDefinition, FlightdeckError> {
            Ok(FlightDefinition::builder()
                .step(ScriptedStep::new("prepare"))
                .step(ScriptedStep::new("quota").then(StepOutcome::fatal(
                    StepError::permanent("Quota exceeded").with_status_code(403),
                )))
                .build())
        }
    }

    /// Network, storage and database, with transient retries on the database.
    struct LandingZoneFlight {
        cloud: Arc<FakeCloud>,
    }

    impl FlightFactory for LandingZoneFlight {
        fn flight_type(&self) -> &str {
            "create_landing_zone"
        }

        fn build(&self, context: &FlightContext) -> Result<FlightDefinition, FlightdeckError> {
            let names = context.name_provider();
            let step = |spec: ResourceSpec| {
                ResourceCreateStep::new(
                    spec,
                    Arc::clone(&self.cloud),
                    Arc::clone(&names),
                    context.cancel_token(),
                )
            };

            Ok(FlightDefinition::builder()
                .step(step(ResourceSpec::new("NETWORK", MAX_VNET_NAME_LENGTH))?)
                .step(step(
                    ResourceSpec::new("STORAGE", MAX_STORAGE_ACCOUNT_NAME_LENGTH)
                        .with_prerequisite("NETWORK_ID"),
                )?)
                .step_with_retry(
                    step(
                        ResourceSpec::new("DATABASE", MAX_POSTGRESQL_SERVER_NAME_LENGTH)
                            .with_prerequisite("NETWORK_ID"),
                    )?,
                    RetryPolicy::fixed(Duration::from_millis(5), 3),
                )
                .step(
                    ScriptedStep::new("publish_result")
                        .with_output("response", json!({"landing_zone": context.flight_id()}))
                        .with_output("status_code", json!(201)),
                )
                .build())
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig::new()
            .with_polling_interval_ms(5)
            .with_timeout_seconds(5)
            .with_domain_name("lz.example.org")
    }

    fn engine_with(registry: FlightRegistry) -> Engine {
        Engine::new(
            fast_config(),
            Arc::new(InMemoryCheckpointStore::new()),
            registry,
        )
    }

    #[tokio::test]
    async fn test_landing_zone_scenario_retries_only_the_database() {
        let cloud = Arc::new(FakeCloud::new());
        cloud.fail_creates("DATABASE", 2, &unavailable());
        let engine = engine_with(FlightRegistry::new().with_factory(LandingZoneFlight {
            cloud: Arc::clone(&cloud),
        }));

        let job_id = engine
            .new_job()
            .flight_type("create_landing_zone")
            .description("Create landing zone")
            .result_path("/api/landingzones/v1/result")
            .add_parameter("region", "westeurope")
            .submit()
            .await
            .unwrap();

        let report = engine.await_completion(&job_id, None).await.unwrap();
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(report.status_code, 201);
        assert_eq!(report.description.as_deref(), Some("Create landing zone"));
        assert_eq!(report.result_url, "https://lz.example.org/api/landingzones/v1/result");
        assert!(report.completed.is_some());

        assert_eq!(cloud.create_calls("NETWORK"), 1);
        assert_eq!(cloud.create_calls("STORAGE"), 1);
        assert_eq!(cloud.create_calls("DATABASE"), 3);
        assert_eq!(cloud.len(), 3);

        let result: serde_json::Value = engine.retrieve_result(&job_id).await.unwrap();
        assert_eq!(result, json!({"landing_zone": job_id}));
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let gate = Arc::new(Semaphore::new(0));
        let engine = engine_with(FlightRegistry::new().with_factory(GatedFlight {
            gate: Arc::clone(&gate),
        }));

        let job_id = engine.submit("gated", InputParameters::new(), None).await.unwrap();
        assert!(uuid::Uuid::parse_str(&job_id).is_ok());

        let running = engine.retrieve_job(&job_id).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.status_code, 202);
        assert!(matches!(
            engine.retrieve_result::<String>(&job_id).await,
            Err(JobError::JobNotComplete(_))
        ));
        let pending = engine.retrieve_async_result::<String>(&job_id).await.unwrap();
        assert!(pending.result.is_none() && pending.error_report.is_none());

        gate.add_permits(1);
        let report = engine.await_completion(&job_id, None).await.unwrap();
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(report.status_code, 200);
        assert_eq!(engine.retrieve_result::<String>(&job_id).await.unwrap(), "done");

        let done = engine.retrieve_async_result::<String>(&job_id).await.unwrap();
        assert_eq!(done.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_job_ids() {
        let gate = Arc::new(Semaphore::new(10));
        let engine = engine_with(FlightRegistry::new().with_factory(GatedFlight { gate }));

        assert_ok!(engine.submit("gated", InputParameters::new(), Some("job-1".into())).await);
        assert!(matches!(
            engine.submit("gated", InputParameters::new(), Some("job-1".into())).await,
            Err(JobError::DuplicateJobId(id)) if id == "job-1"
        ));
        assert!(matches!(
            engine.submit("gated", InputParameters::new(), Some("   ".into())).await,
            Err(JobError::InvalidJobId(_))
        ));
        assert!(matches!(
            engine.submit("unknown", InputParameters::new(), None).await,
            Err(JobError::UnknownFlightType(_))
        ));
        assert!(matches!(
            engine.retrieve_job("missing").await,
            Err(JobError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_job_builder_parameter_errors() {
        let engine = engine_with(FlightRegistry::new().with_factory(FailingFlight));

        assert!(matches!(
            engine
                .new_job()
                .flight_type("failing")
                .add_parameter(" ", "value")
                .submit()
                .await,
            Err(JobError::InvalidParameter(_))
        ));
        assert!(matches!(
            engine.new_job().add_parameter("region", "westeurope").submit().await,
            Err(JobError::InvalidParameter(_))
        ));
        assert!(matches!(
            engine.new_job().flight_type("failing").job_id("\t").submit().await,
            Err(JobError::InvalidJobId(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_job_returns_recorded_error() {
        let engine = engine_with(FlightRegistry::new().with_factory(FailingFlight));

        let job_id = engine.submit("failing", InputParameters::new(), None).await.unwrap();
        let report = engine.await_completion(&job_id, None).await.unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.status_code, 403);

        match engine.retrieve_result::<serde_json::Value>(&job_id).await {
            Err(JobError::FlightFailed { error, .. }) => {
                assert_eq!(error.message, "Quota exceeded");
            }
            other => panic!("expected flight failure, got {other:?}"),
        }

        let result = engine
            .retrieve_async_result::<serde_json::Value>(&job_id)
            .await
            .unwrap();
        let error_report = result.error_report.unwrap();
        assert_eq!(error_report.message, "Quota exceeded");
        assert_eq!(error_report.status_code, 403);

        let failure: Result<serde_json::Value, _> = engine
            .new_job()
            .flight_type("failing")
            .submit_and_wait()
            .await;
        assert_err!(failure);
    }

    #[tokio::test]
    async fn test_await_completion_times_out() {
        let engine = engine_with(FlightRegistry::new().with_factory(GatedFlight {
            gate: Arc::new(Semaphore::new(0)),
        }));
        let job_id = engine.submit("gated", InputParameters::new(), None).await.unwrap();

        let result = engine
            .await_completion(&job_id, Some(Duration::from_millis(30)))
            .await;
        assert!(matches!(result, Err(JobError::Timeout { .. })));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_await_all_reports_every_job() {
        let engine = engine_with(FlightRegistry::new().with_factory(GatedFlight {
            gate: Arc::new(Semaphore::new(10)),
        }));
        let mut job_ids = Vec::new();
        for _ in 0..3 {
            job_ids.push(engine.submit("gated", InputParameters::new(), None).await.unwrap());
        }

        let reports = engine.await_all(&job_ids, None).await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.status == JobStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_shutdown_then_recover_from_file_store() {
        let dir = tempfile::tempdir().unwrap();

        let closed = Arc::new(Semaphore::new(0));
        let first = Engine::new(
            fast_config(),
            Arc::new(FileCheckpointStore::open(dir.path()).await.unwrap()),
            FlightRegistry::new().with_factory(GatedFlight { gate: closed }),
        );
        let job_id = first
            .submit("gated", InputParameters::new(), Some("lz-recover".into()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        first.shutdown().await;

        assert_eq!(first.retrieve_job(&job_id).await.unwrap().status, JobStatus::Running);
        assert!(matches!(
            first.submit("gated", InputParameters::new(), None).await,
            Err(JobError::Internal(_))
        ));

        let open = Arc::new(Semaphore::new(1));
        let second = Engine::new(
            fast_config(),
            Arc::new(FileCheckpointStore::open(dir.path()).await.unwrap()),
            FlightRegistry::new().with_factory(GatedFlight { gate: open }),
        );
        let recovery = second.recover().await.unwrap();
        assert_eq!(recovery.recovered, vec![job_id.clone()]);
        assert!(recovery.failed.is_empty());

        let report = second.await_completion(&job_id, None).await.unwrap();
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(second.retrieve_result::<String>(&job_id).await.unwrap(), "done");
        assert!(second.store().list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_reports_flights_without_factory() {
        let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
        let orphan = FlightCheckpoint::new("orphan", "retired_type", Vec::new(), Default::default());
        store.create(&orphan).await.unwrap();

        let engine = Engine::new(fast_config(), Arc::clone(&store), FlightRegistry::new());
        let recovery = engine.recover().await.unwrap();

        assert!(recovery.recovered.is_empty());
        assert_eq!(recovery.failed.len(), 1);
        assert_eq!(recovery.failed[0].0, "orphan");
    }
}
