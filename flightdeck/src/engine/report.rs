//! Caller-facing views of a job.

use crate::errors::{JobError, StepError};
use crate::flight::{FlightCheckpoint, FlightStatus};
use crate::state::keys;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const ACCEPTED: u16 = 202;
const OK: u16 = 200;
const INTERNAL_SERVER_ERROR: u16 = 500;

/// Job status as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// Still running.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl From<FlightStatus> for JobStatus {
    fn from(status: FlightStatus) -> Self {
        match status {
            FlightStatus::Running => Self::Running,
            FlightStatus::Success => Self::Succeeded,
            FlightStatus::Error | FlightStatus::Fatal => Self::Failed,
        }
    }
}

/// Read-only report of a job's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Job id.
    pub id: String,
    /// Description supplied at submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Status.
    pub status: JobStatus,
    /// 202 while running, the result status on success, the error status on failure.
    pub status_code: u16,
    /// Submission time.
    pub submitted: DateTime<Utc>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    /// Where the result can be fetched.
    pub result_url: String,
}

impl JobReport {
    /// Builds a report from a checkpoint.
    #[must_use]
    pub fn from_checkpoint(checkpoint: &FlightCheckpoint, domain_name: &str) -> Self {
        let status = JobStatus::from(checkpoint.status);
        let status_code = match status {
            JobStatus::Running => ACCEPTED,
            JobStatus::Succeeded => checkpoint
                .state
                .working
                .get(keys::STATUS_CODE)
                .and_then(serde_json::Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(OK),
            JobStatus::Failed => checkpoint
                .error
                .as_ref()
                .map_or(INTERNAL_SERVER_ERROR, |e| e.status_code),
        };

        let description = checkpoint
            .state
            .inputs
            .get(keys::DESCRIPTION)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let result_path = checkpoint
            .state
            .inputs
            .get(keys::RESULT_PATH)
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");

        Self {
            id: checkpoint.flight_id.clone(),
            description,
            status,
            status_code,
            submitted: checkpoint.submitted_at,
            completed: checkpoint.completed_at,
            result_url: result_url(domain_name, result_path),
        }
    }
}

/// Joins the domain and result path, with `http` for local domains and
/// `https` otherwise.
#[must_use]
pub fn result_url(domain_name: &str, result_path: &str) -> String {
    let protocol = if domain_name.starts_with("localhost") {
        "http://"
    } else {
        "https://"
    };
    let domain = domain_name.trim_end_matches('/');
    let path = result_path.trim_start_matches('/');
    if path.is_empty() {
        format!("{protocol}{domain}")
    } else {
        format!("{protocol}{domain}/{path}")
    }
}

/// Error payload of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// User-facing message.
    pub message: String,
    /// HTTP-style status code.
    pub status_code: u16,
    /// Diagnostic causes.
    #[serde(default)]
    pub causes: Vec<String>,
}

impl From<&StepError> for ErrorReport {
    fn from(error: &StepError) -> Self {
        Self {
            message: error.message.clone(),
            status_code: error.status_code,
            causes: error.cause.iter().cloned().collect(),
        }
    }
}

impl From<&JobError> for ErrorReport {
    fn from(error: &JobError) -> Self {
        match error {
            JobError::FlightFailed { error, .. } => Self::from(error),
            other => Self {
                message: other.to_string(),
                status_code: other.status_code(),
                causes: Vec::new(),
            },
        }
    }
}

/// A job report plus, once the job finished, its result or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncJobResult<T> {
    /// The report.
    pub job_report: JobReport,
    /// The result, for succeeded jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    /// The error, for failed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_report: Option<ErrorReport>,
}
