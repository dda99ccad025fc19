//! Reconciliation of "already exists" responses from a provider.
//!
//! A conflict on create usually means an earlier attempt of the same step
//! succeeded, or the resource is still being provisioned. The reconciler
//! decides whether to adopt the existing resource, wait for it, or give up.

mod poll;

pub use poll::{PollOutcome, PollSettings};

use crate::provider::codes;
use crate::state::ResourceRecord;
use serde::{Deserialize, Serialize};

/// Provisioning state reported by a provider for an existing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// Ready for use.
    Succeeded,
    /// Still being created or updated.
    InProgress,
    /// Provisioning failed.
    Failed,
    /// Provisioning was cancelled.
    Canceled,
}

impl ProvisioningState {
    /// Parses a provider state string. Anything unrecognised counts as in progress.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::InProgress,
        }
    }

    /// Returns true for `Failed` and `Canceled`.
    #[must_use]
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Failed => write!(f, "Failed"),
            Self::Canceled => write!(f, "Canceled"),
        }
    }
}

/// A resource that already exists at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingResource {
    /// Its identity.
    pub record: ResourceRecord,
    /// Its provisioning state.
    pub state: ProvisioningState,
}

impl ExistingResource {
    /// Creates a new existing-resource view.
    #[must_use]
    pub fn new(record: ResourceRecord, state: ProvisioningState) -> Self {
        Self { record, state }
    }
}

/// What to do about a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileDecision {
    /// Adopt the existing resource as this step's result.
    AcceptExisting,
    /// Wait until the existing resource is ready, then adopt it.
    PollThenAccept,
    /// Treat the conflict as an ordinary failure.
    Fail,
}

/// Decides how to handle conflict-family provider errors.
#[derive(Debug, Clone, Default)]
pub struct ConflictReconciler {
    settings: PollSettings,
}

impl ConflictReconciler {
    /// Creates a reconciler with the given poll settings.
    #[must_use]
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    /// Poll settings used for `PollThenAccept`.
    #[must_use]
    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Pure decision over an error code and the state of the existing resource.
    #[must_use]
    pub fn decide(
        &self,
        error_code: &str,
        existing: Option<ProvisioningState>,
    ) -> ReconcileDecision {
        let busy = error_code.eq_ignore_ascii_case(codes::OPERATION_NOT_ALLOWED);
        let conflict = error_code.eq_ignore_ascii_case(codes::CONFLICT);
        if !busy && !conflict {
            return ReconcileDecision::Fail;
        }

        match existing {
            Some(ProvisioningState::Succeeded) => ReconcileDecision::AcceptExisting,
            Some(ProvisioningState::InProgress) => ReconcileDecision::PollThenAccept,
            Some(ProvisioningState::Failed | ProvisioningState::Canceled) => {
                ReconcileDecision::Fail
            }
            None if busy => ReconcileDecision::PollThenAccept,
            None => ReconcileDecision::Fail,
        }
    }
}
