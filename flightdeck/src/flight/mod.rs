//! Flights: ordered, durable sequences of reversible steps.
//!
//! A `FlightFactory` turns a job's inputs into a `FlightDefinition`. The engine
//! persists a `FlightCheckpoint` for it and drives it with a `Flight` runner,
//! which executes steps forward and, after a permanent failure, compensates
//! the completed ones in reverse order.

mod checkpoint;
mod runner;

pub use checkpoint::{Direction, FlightCheckpoint, FlightStatus, StepRecord};
pub use runner::Flight;

use crate::cancellation::CancellationToken;
use crate::errors::FlightdeckError;
use crate::naming::ResourceNameProvider;
use crate::state::InputParameters;
use crate::step::{RetryPolicy, Step, StepEntry};
use std::collections::HashMap;
use std::sync::Arc;

/// The ordered steps of one flight.
#[derive(Debug, Clone, Default)]
pub struct FlightDefinition {
    steps: Vec<StepEntry>,
}

impl FlightDefinition {
    /// Starts an empty definition.
    #[must_use]
    pub fn builder() -> FlightDefinitionBuilder {
        FlightDefinitionBuilder::default()
    }

    /// The steps, in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepEntry] {
        &self.steps
    }

    /// Step names, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn into_steps(self) -> Vec<StepEntry> {
        self.steps
    }
}

/// Fluent builder for `FlightDefinition`.
#[derive(Debug, Default)]
pub struct FlightDefinitionBuilder {
    steps: Vec<StepEntry>,
}

impl FlightDefinitionBuilder {
    /// Appends a step without a retry policy.
    #[must_use]
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(StepEntry::new(Arc::new(step)));
        self
    }

    /// Appends a step with a retry policy.
    #[must_use]
    pub fn step_with_retry(mut self, step: impl Step + 'static, policy: RetryPolicy) -> Self {
        self.steps
            .push(StepEntry::new(Arc::new(step)).with_retry(policy));
        self
    }

    /// Appends a prepared entry.
    #[must_use]
    pub fn entry(mut self, entry: StepEntry) -> Self {
        self.steps.push(entry);
        self
    }

    /// Finishes the definition.
    #[must_use]
    pub fn build(self) -> FlightDefinition {
        FlightDefinition { steps: self.steps }
    }
}

/// What a factory gets to build a flight.
#[derive(Debug, Clone)]
pub struct FlightContext {
    flight_id: String,
    inputs: InputParameters,
    cancel: Arc<CancellationToken>,
    names: Arc<ResourceNameProvider>,
}

impl FlightContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        flight_id: impl Into<String>,
        inputs: InputParameters,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        let flight_id = flight_id.into();
        let names = Arc::new(ResourceNameProvider::new(&flight_id));
        Self {
            flight_id,
            inputs,
            cancel,
            names,
        }
    }

    /// The flight id.
    #[must_use]
    pub fn flight_id(&self) -> &str {
        &self.flight_id
    }

    /// The job inputs.
    #[must_use]
    pub fn inputs(&self) -> &InputParameters {
        &self.inputs
    }

    /// Token that fires when this flight must stop.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancel)
    }

    /// The flight's name provider, seeded with the flight id.
    ///
    /// Every call returns the same provider.
    #[must_use]
    pub fn name_provider(&self) -> Arc<ResourceNameProvider> {
        Arc::clone(&self.names)
    }
}

/// Builds the steps of one flight type.
///
/// `build` must be deterministic: a flight is rebuilt from its inputs when it
/// is resumed after a restart, and the resulting step names are checked
/// against the checkpoint.
pub trait FlightFactory: Send + Sync {
    /// The flight type this factory builds.
    fn flight_type(&self) -> &str;

    /// Builds the flight.
    fn build(&self, context: &FlightContext) -> Result<FlightDefinition, FlightdeckError>;
}

/// Flight factories by flight type.
#[derive(Default)]
pub struct FlightRegistry {
    factories: HashMap<String, Arc<dyn FlightFactory>>,
}

impl FlightRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under its flight type, replacing any previous one.
    #[must_use]
    pub fn with_factory(mut self, factory: impl FlightFactory + 'static) -> Self {
        self.register(Arc::new(factory));
        self
    }

    /// Registers a shared factory, replacing any previous one.
    pub fn register(&mut self, factory: Arc<dyn FlightFactory>) {
        self.factories
            .insert(factory.flight_type().to_string(), factory);
    }

    /// Looks up a factory.
    #[must_use]
    pub fn get(&self, flight_type: &str) -> Option<Arc<dyn FlightFactory>> {
        self.factories.get(flight_type).cloned()
    }

    /// Registered flight types.
    #[must_use]
    pub fn flight_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for FlightRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightRegistry")
            .field("flight_types", &self.flight_types())
            .finish()
    }
}
