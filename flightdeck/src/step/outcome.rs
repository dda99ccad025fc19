//! The per-step result contract.

use crate::errors::StepError;
use serde::{Deserialize, Serialize};

/// Three-way result of `execute` or `compensate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step did its work (or found it already done).
    Success,
    /// The step hit a transient failure and may be re-run.
    Retry,
    /// The step failed permanently.
    Fatal,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Retry => write!(f, "retry"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Outcome of a single step invocation.
///
/// `Retry` and `Fatal` outcomes always carry an error; the constructors are the
/// only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<StepError>,
}

impl StepOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: StepStatus::Success,
            error: None,
        }
    }

    /// A retryable failure.
    #[must_use]
    pub fn retry(error: StepError) -> Self {
        Self {
            status: StepStatus::Retry,
            error: Some(error),
        }
    }

    /// A permanent failure.
    #[must_use]
    pub fn fatal(error: StepError) -> Self {
        Self {
            status: StepStatus::Fatal,
            error: Some(error),
        }
    }

    /// The outcome status.
    #[must_use]
    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// The error, for `Retry` and `Fatal` outcomes.
    #[must_use]
    pub fn error(&self) -> Option<&StepError> {
        self.error.as_ref()
    }

    /// Consumes the outcome, returning its error.
    #[must_use]
    pub fn into_error(self) -> Option<StepError> {
        self.error
    }

    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Returns true for `Retry`.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.status == StepStatus::Retry
    }

    /// Returns true for `Fatal`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.status == StepStatus::Fatal
    }

    /// Returns true if the outcome came from an interrupted wait.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.error.as_ref().is_some_and(StepError::is_interrupted)
    }
}

impl From<Result<(), StepError>> for StepOutcome {
    fn from(result: Result<(), StepError>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::fatal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_no_error() {
        let outcome = StepOutcome::success();
        assert!(outcome.is_success());
        assert!(outcome.error().is_none());
    }

    #[test]
    fn test_failures_carry_error() {
        let retry = StepOutcome::retry(StepError::transient("busy"));
        assert!(retry.is_retry());
        assert_eq!(retry.error().unwrap().message, "busy");

        let fatal = StepOutcome::fatal(StepError::permanent("denied"));
        assert!(fatal.is_fatal());
        assert_eq!(fatal.status().to_string(), "fatal");
    }

    #[test]
    fn test_interrupted_detection() {
        assert!(StepOutcome::fatal(StepError::interrupted("stop")).is_interrupted());
        assert!(!StepOutcome::fatal(StepError::internal("boom")).is_interrupted());
        assert!(!StepOutcome::success().is_interrupted());
    }

    #[test]
    fn test_from_result() {
        let ok: StepOutcome = Ok(()).into();
        assert!(ok.is_success());

        let err: StepOutcome = Err(StepError::missing_required_field("VNET_ID")).into();
        assert!(err.is_fatal());
    }
}
