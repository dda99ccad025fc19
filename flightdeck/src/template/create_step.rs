use super::{CreateRequest, ResourceProvider, ResourceSpec};
use crate::cancellation::CancellationToken;
use crate::errors::{NamingError, StepError};
use crate::naming::{NameRequirement, ResourceNameProvider};
use crate::provider::{codes, ErrorTranslator, ProviderError};
use crate::reconcile::{ConflictReconciler, PollOutcome, ReconcileDecision};
use crate::state::{ResourceRecord, WorkingState};
use crate::step::{Step, StepOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Create/undo step for one resource, parameterised by its provider.
pub struct ResourceCreateStep<P> {
    name: String,
    spec: ResourceSpec,
    provider: Arc<P>,
    names: Arc<ResourceNameProvider>,
    reconciler: ConflictReconciler,
    translator: Arc<ErrorTranslator>,
    cancel: Arc<CancellationToken>,
}

impl<P: ResourceProvider> ResourceCreateStep<P> {
    /// Creates the step and registers its name requirements.
    ///
    /// # Errors
    ///
    /// Returns `NamingError::AlreadyRegistered` if another step of the flight
    /// already claimed one of the names.
    pub fn new(
        spec: ResourceSpec,
        provider: Arc<P>,
        names: Arc<ResourceNameProvider>,
        cancel: Arc<CancellationToken>,
    ) -> Result<Self, NamingError> {
        names.register(&spec.name_requirements)?;
        Ok(Self {
            name: format!("create_{}", spec.resource_type.to_ascii_lowercase()),
            spec,
            provider,
            names,
            reconciler: ConflictReconciler::default(),
            translator: Arc::new(ErrorTranslator::default()),
            cancel,
        })
    }

    /// Overrides the step name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the conflict reconciler.
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: ConflictReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Overrides the error translator.
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<ErrorTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// The resource spec.
    #[must_use]
    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    fn build_request(&self, state: &WorkingState) -> Result<CreateRequest, StepError> {
        let mut request = CreateRequest::new(&self.spec.resource_type);

        for key in &self.spec.prerequisites {
            let value = state
                .working()
                .get_required::<serde_json::Value>(key)?;
            request.prerequisites.insert(key.clone(), value);
        }
        for key in &self.spec.required_inputs {
            state.inputs().get_required::<serde_json::Value>(key)?;
        }
        request.inputs = state.inputs().clone();

        for requirement in &self.spec.name_requirements {
            let name = self.names.get_name(&requirement.logical_name)?;
            request.names.insert(requirement.logical_name.clone(), name);
        }
        Ok(request)
    }

    fn publish(&self, state: &WorkingState, record: &ResourceRecord) -> StepOutcome {
        let keys = &self.spec.keys;
        let stored = state
            .working()
            .put(&keys.record_key, record)
            .and_then(|()| state.working().put(&keys.id_key, &record.resource_id));
        if let Err(e) = stored {
            return self.fatal(e.into());
        }

        info!(
            step = %self.name,
            resource_id = %record.resource_id,
            "{} resource id='{}' successfully created",
            self.spec.resource_type,
            record.resource_id
        );
        StepOutcome::success()
    }

    fn fatal(&self, error: StepError) -> StepOutcome {
        StepOutcome::fatal(error.with_step(&self.name))
    }

    fn retry(&self, error: &ProviderError) -> StepOutcome {
        let mut step_error = StepError::transient(error.message.clone())
            .with_cause(error.error_info())
            .with_step(&self.name);
        if let Some(status) = error.http_status {
            step_error = step_error.with_status_code(status);
        }
        StepOutcome::retry(step_error)
    }

    fn classify(&self, error: &ProviderError) -> StepOutcome {
        if self.provider.is_transient(error) {
            warn!(
                step = %self.name,
                code = %error.code,
                status = ?error.http_status,
                "Transient error creating {} resource",
                self.spec.resource_type
            );
            self.retry(error)
        } else {
            self.fatal(self.translator.to_step_error(error))
        }
    }

    async fn handle_create_error(
        &self,
        state: &WorkingState,
        request: &CreateRequest,
        error: ProviderError,
    ) -> StepOutcome {
        if let Some(outcome) = self.provider.handle_error(&error, request) {
            return outcome;
        }

        if error.is_conflict() {
            if let Some(outcome) = self.reconcile(state, request, &error).await {
                return outcome;
            }
        }

        self.classify(&error)
    }

    /// Resolves a conflict. `None` means the conflict should be treated as an
    /// ordinary error.
    async fn reconcile(
        &self,
        state: &WorkingState,
        request: &CreateRequest,
        error: &ProviderError,
    ) -> Option<StepOutcome> {
        let existing = match self.provider.fetch_existing(request).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Some(self.classify(&e)),
        };

        let code = if error.code.eq_ignore_ascii_case(codes::OPERATION_NOT_ALLOWED) {
            codes::OPERATION_NOT_ALLOWED
        } else {
            codes::CONFLICT
        };
        let decision = self
            .reconciler
            .decide(code, existing.as_ref().map(|e| e.state));
        info!(
            step = %self.name,
            code = %error.code,
            decision = ?decision,
            "{} resource already exists",
            self.spec.resource_type
        );

        match decision {
            ReconcileDecision::AcceptExisting => {
                let existing = existing?;
                Some(self.publish(state, &existing.record))
            }
            ReconcileDecision::PollThenAccept => {
                let settings = self.reconciler.settings();
                let outcome = settings
                    .poll_until_ready(&self.cancel, || self.provider.fetch_existing(request))
                    .await;
                Some(self.finish_poll(state, outcome))
            }
            ReconcileDecision::Fail => None,
        }
    }

    fn finish_poll(&self, state: &WorkingState, outcome: PollOutcome) -> StepOutcome {
        let resource_type = &self.spec.resource_type;
        match outcome {
            PollOutcome::Ready(existing) => self.publish(state, &existing.record),
            PollOutcome::NotReady { waited_secs } => self.fatal(StepError::not_ready(format!(
                "{resource_type} resource still not ready after {waited_secs} sec."
            ))),
            PollOutcome::Failed(provisioning) => self.fatal(StepError::permanent(format!(
                "{resource_type} resource provisioning ended in state {provisioning}."
            ))),
            PollOutcome::Interrupted => {
                warn!(step = %self.name, "Waiting for {} resource was interrupted", resource_type);
                self.fatal(StepError::interrupted(format!(
                    "Waiting for {resource_type} resource was interrupted."
                )))
            }
            PollOutcome::ProviderFailed(e) => self.classify(&e),
        }
    }
}

impl<P> std::fmt::Debug for ResourceCreateStep<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCreateStep")
            .field("name", &self.name)
            .field("resource_type", &self.spec.resource_type)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<P: ResourceProvider + 'static> Step for ResourceCreateStep<P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, state: &WorkingState) -> StepOutcome {
        let request = match self.build_request(state) {
            Ok(request) => request,
            Err(e) => return self.fatal(e),
        };

        match self.provider.create(&request).await {
            Ok(record) => self.publish(state, &record),
            Err(e) => self.handle_create_error(state, &request, e).await,
        }
    }

    async fn compensate(&self, state: &WorkingState) -> StepOutcome {
        let resource_type = &self.spec.resource_type;
        let resource_id = match state
            .working()
            .get_optional::<String>(&self.spec.keys.id_key)
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                info!(step = %self.name, "{} resource was not created, nothing to delete", resource_type);
                return StepOutcome::success();
            }
            Err(e) => return self.fatal(e.into()),
        };

        match self.provider.delete(&resource_id).await {
            Ok(()) => {
                info!(step = %self.name, resource_id = %resource_id, "{} resource deleted. Id={}", resource_type, resource_id);
                StepOutcome::success()
            }
            Err(e) => {
                if let Some(outcome) = self.provider.handle_delete_error(&e, &resource_id) {
                    return outcome;
                }
                if e.is_not_found() {
                    info!(
                        step = %self.name,
                        "{} doesn't exist or has been already deleted. Id={}",
                        resource_type,
                        resource_id
                    );
                    return StepOutcome::success();
                }
                warn!(
                    step = %self.name,
                    error = %e,
                    "Failed attempt to delete {}. Id={}",
                    resource_type,
                    resource_id
                );
                StepOutcome::retry(
                    StepError::compensation(format!(
                        "Failed to delete {resource_type} resource {resource_id}"
                    ))
                    .with_cause(e.error_info())
                    .with_step(&self.name),
                )
            }
        }
    }

    fn name_requirements(&self) -> Vec<NameRequirement> {
        self.spec.name_requirements.clone()
    }
}
