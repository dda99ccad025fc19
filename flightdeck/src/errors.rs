//! Error types for the flightdeck engine.
//!
//! Two families live here. `StepError` is plain data: it is carried inside a
//! `StepOutcome`, persisted with the flight checkpoint and surfaced to job
//! callers, so it must serialize. The remaining types are ordinary Rust errors
//! returned by the engine, the stores and the working-state accessors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for flightdeck operations.
#[derive(Debug, Error)]
pub enum FlightdeckError {
    /// A job-level error.
    #[error("{0}")]
    Job(#[from] JobError),

    /// A checkpoint store error.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A working-state access error.
    #[error("{0}")]
    State(#[from] StateError),

    /// A resource naming error.
    #[error("{0}")]
    Naming(#[from] NamingError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// A required working-state key was missing. Wiring defect, never retried.
    MissingRequiredField,
    /// Server-side or availability error at the provider.
    RemoteTransient,
    /// Validation, quota or permission error at the provider.
    RemotePermanent,
    /// A pre-existing resource never reached a ready state.
    ResourceNotReady,
    /// Deleting a resource during undo failed.
    Compensation,
    /// A blocking wait was interrupted by cancellation.
    Interrupted,
    /// Any other failure inside the engine or a step.
    Internal,
}

impl std::fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequiredField => write!(f, "missing_required_field"),
            Self::RemoteTransient => write!(f, "remote_transient"),
            Self::RemotePermanent => write!(f, "remote_permanent"),
            Self::ResourceNotReady => write!(f, "resource_not_ready"),
            Self::Compensation => write!(f, "compensation"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

const INTERNAL_SERVER_ERROR: u16 = 500;
const BAD_REQUEST: u16 = 400;
const SERVICE_UNAVAILABLE: u16 = 503;

/// Error carried by a failed `StepOutcome`.
///
/// `message` is the user-facing text. `cause` keeps the raw diagnostic
/// information of the originating error (for provider errors, the output of
/// `ProviderError::error_info`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct StepError {
    /// Failure classification.
    pub kind: StepErrorKind,
    /// User-facing message.
    pub message: String,
    /// HTTP-style status code reported to job callers.
    pub status_code: u16,
    /// Diagnostic description of the original error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Name of the step that produced the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl StepError {
    /// Creates a new step error with the default status code for its kind.
    #[must_use]
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        let status_code = match kind {
            StepErrorKind::RemotePermanent => BAD_REQUEST,
            StepErrorKind::RemoteTransient => SERVICE_UNAVAILABLE,
            _ => INTERNAL_SERVER_ERROR,
        };
        Self {
            kind,
            message: message.into(),
            status_code,
            cause: None,
            step: None,
        }
    }

    /// A required working-state key was absent.
    #[must_use]
    pub fn missing_required_field(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::MissingRequiredField, message)
    }

    /// A transient provider failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::RemoteTransient, message)
    }

    /// A permanent provider failure.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::RemotePermanent, message)
    }

    /// A resource that never became ready.
    #[must_use]
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::ResourceNotReady, message)
    }

    /// A failed undo.
    #[must_use]
    pub fn compensation(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Compensation, message)
    }

    /// An interrupted wait.
    #[must_use]
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Interrupted, message)
    }

    /// An internal failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Internal, message)
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Sets the diagnostic cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Records the step that produced the error.
    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Returns true if this error came from an interrupted wait.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.kind == StepErrorKind::Interrupted
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind.to_string()));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("status_code".to_string(), serde_json::json!(self.status_code));
        if let Some(ref cause) = self.cause {
            map.insert("cause".to_string(), serde_json::json!(cause));
        }
        if let Some(ref step) = self.step {
            map.insert("step".to_string(), serde_json::json!(step));
        }
        map
    }
}

impl From<StateError> for StepError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::MissingRequiredField { .. } => {
                Self::missing_required_field(err.to_string())
            }
            StateError::TypeMismatch { .. } | StateError::Serialization(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<NamingError> for StepError {
    fn from(err: NamingError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Errors raised by working-state accessors.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// A required key was not present.
    #[error("Missing required field '{key}' in {partition}")]
    MissingRequiredField {
        /// The missing key.
        key: String,
        /// Which partition was searched ("inputs" or "working").
        partition: &'static str,
    },

    /// A value was present but did not deserialize into the requested type.
    #[error("Field '{key}' has unexpected type: {reason}")]
    TypeMismatch {
        /// The key.
        key: String,
        /// Deserializer message.
        reason: String,
    },

    /// A value could not be serialized for storage.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StateError {
    /// Creates a missing-field error.
    #[must_use]
    pub fn missing(key: impl Into<String>, partition: &'static str) -> Self {
        Self::MissingRequiredField {
            key: key.into(),
            partition,
        }
    }
}

/// Errors raised by resource name generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    /// The same logical resource was registered twice.
    #[error("Step with resource type '{0}' is already registered for name generation.")]
    AlreadyRegistered(String),

    /// A name was requested for a logical resource nobody registered.
    #[error("Step with resource type '{0}' is not registered for name generation.")]
    NotRegistered(String),
}

/// Errors raised by checkpoint stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A checkpoint with this id already exists.
    #[error("Flight '{0}' already exists")]
    Duplicate(String),

    /// No checkpoint with this id exists.
    #[error("Flight '{0}' was not found")]
    NotFound(String),

    /// The id cannot be used as a storage key.
    #[error("Flight id '{0}' cannot be stored")]
    InvalidId(String),

    /// Checkpoint (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors surfaced to job callers.
#[derive(Debug, Error)]
pub enum JobError {
    /// The caller supplied an unusable job id.
    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    /// The caller supplied an unusable parameter.
    #[error("Invalid job parameter: {0}")]
    InvalidParameter(String),

    /// A job with the same explicit id was already submitted.
    #[error("Received duplicate jobId {0}")]
    DuplicateJobId(String),

    /// No job with this id exists.
    #[error("The flight {0} was not found")]
    JobNotFound(String),

    /// The job is still running.
    #[error("Attempt to retrieve job result before job is complete; job id: {0}")]
    JobNotComplete(String),

    /// The stored flight state is inconsistent.
    #[error("Invalid result state: {0}")]
    InvalidResultState(String),

    /// No factory is registered for the flight type.
    #[error("Unknown flight type '{0}'")]
    UnknownFlightType(String),

    /// The flight could not be built from its inputs.
    #[error("Flight construction failed: {0}")]
    FlightConstruction(String),

    /// Waiting for completion exceeded the configured bound.
    #[error("Flight {job_id} did not complete in the allowed wait time ({waited_secs}s)")]
    Timeout {
        /// The job id.
        job_id: String,
        /// Seconds spent polling.
        waited_secs: u64,
    },

    /// The flight failed; this is the error it recorded.
    #[error("Job {job_id} failed: {error}")]
    FlightFailed {
        /// The job id.
        job_id: String,
        /// The recorded step error.
        error: StepError,
    },

    /// The recorded result did not match the requested type.
    #[error("Result deserialization failed: {0}")]
    ResultDeserialization(String),

    /// A store failure.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Engine-internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns the HTTP-style status code callers should see.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidJobId(_) | Self::InvalidParameter(_) => 400,
            Self::JobNotFound(_) => 404,
            Self::DuplicateJobId(_) => 409,
            Self::JobNotComplete(_) => 400,
            Self::FlightFailed { error, .. } => error.status_code,
            _ => 500,
        }
    }
}
