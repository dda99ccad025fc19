//! # Flightdeck
//!
//! Durable step orchestration for landing-zone provisioning.
//!
//! A landing zone is built by a *flight*: an ordered list of reversible steps
//! that share a key/value working state. Flightdeck provides:
//!
//! - **Crash-safe execution**: the flight checkpoint is persisted after every
//!   step outcome and a restarted engine resumes exactly where it stopped
//! - **Uniform failure handling**: steps report `Success`, `Retry` or `Fatal`;
//!   retries follow a per-step policy and a fatal error compensates completed
//!   steps in reverse order
//! - **Resource step template**: one generic create/undo step per cloud
//!   resource, with conflict reconciliation and error translation
//! - **Job layer**: submit, poll and fetch results of long-running flights
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flightdeck::prelude::*;
//!
//! let engine = Engine::in_memory(FlightRegistry::new().with_factory(LandingZoneFlight));
//! let job_id = engine
//!     .new_job()
//!     .flight_type("create_landing_zone")
//!     .description("Create landing zone")
//!     .add_parameter("region", "westeurope")
//!     .submit()
//!     .await?;
//!
//! let report = engine.await_completion(&job_id, None).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod engine;
pub mod errors;
pub mod flight;
pub mod naming;
pub mod observability;
pub mod provider;
pub mod reconcile;
pub mod state;
pub mod step;
pub mod store;
pub mod template;
pub mod testing;

#[cfg(test)]
mod integration_tests;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::engine::{
        AsyncJobResult, Engine, EngineConfig, ErrorReport, JobBuilder, JobReport, JobStatus,
        RecoveryReport,
    };
    pub use crate::errors::{
        FlightdeckError, JobError, NamingError, StateError, StepError, StepErrorKind, StoreError,
    };
    pub use crate::flight::{
        FlightCheckpoint, FlightContext, FlightDefinition, FlightFactory, FlightRegistry,
        FlightStatus,
    };
    pub use crate::naming::{NameRequirement, ResourceNameProvider};
    pub use crate::provider::{ErrorTranslator, ProviderError};
    pub use crate::reconcile::{ConflictReconciler, PollSettings, ProvisioningState};
    pub use crate::state::{InputParameters, ResourceKeys, ResourceRecord, WorkingState};
    pub use crate::step::{RetryPolicy, Step, StepEntry, StepOutcome, StepStatus};
    pub use crate::store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
    pub use crate::template::{CreateRequest, ResourceCreateStep, ResourceProvider, ResourceSpec};
}
