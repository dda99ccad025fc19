//! Persisted progress of a flight.

use crate::errors::StepError;
use crate::state::StateSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightStatus {
    /// Steps are still being executed or compensated.
    Running,
    /// Every step succeeded.
    Success,
    /// A step failed and every completed step was compensated.
    Error,
    /// Compensation itself failed; manual cleanup may be needed.
    Fatal,
}

impl FlightStatus {
    /// Returns true for `Success`, `Error` and `Fatal`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Which way the cursor moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Executing steps.
    #[default]
    Forward,
    /// Compensating steps.
    Reverse,
}

/// Per-step progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name.
    pub name: String,
    /// Number of `execute` calls.
    #[serde(default)]
    pub attempts: u32,
    /// Whether `execute` returned `Success`.
    #[serde(default)]
    pub succeeded: bool,
    /// Number of `compensate` calls.
    #[serde(default)]
    pub compensation_attempts: u32,
    /// Whether `compensate` returned `Success`.
    #[serde(default)]
    pub compensated: bool,
}

impl StepRecord {
    /// Creates a fresh record.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: 0,
            succeeded: false,
            compensation_attempts: 0,
            compensated: false,
        }
    }
}

/// Everything needed to resume a flight exactly where it stopped.
///
/// While `Forward`, `cursor` is the index of the next step to execute. While
/// `Reverse`, `cursor - 1` is the next step to consider for compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightCheckpoint {
    /// Flight (job) id.
    pub flight_id: String,
    /// Registered flight type.
    pub flight_type: String,
    /// Lifecycle status.
    pub status: FlightStatus,
    /// Cursor direction.
    pub direction: Direction,
    /// Step cursor.
    pub cursor: usize,
    /// Per-step progress, in flight order.
    pub steps: Vec<StepRecord>,
    /// Working state as of the last step boundary.
    pub state: StateSnapshot,
    /// The error that sent the flight into compensation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    /// The error that stopped compensation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_error: Option<StepError>,
    /// When the flight was submitted.
    pub submitted_at: DateTime<Utc>,
    /// When the flight reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Last time the checkpoint was written.
    pub updated_at: DateTime<Utc>,
}

impl FlightCheckpoint {
    /// Creates the initial checkpoint of a flight.
    #[must_use]
    pub fn new(
        flight_id: impl Into<String>,
        flight_type: impl Into<String>,
        step_names: impl IntoIterator<Item = String>,
        state: StateSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            flight_id: flight_id.into(),
            flight_type: flight_type.into(),
            status: FlightStatus::Running,
            direction: Direction::Forward,
            cursor: 0,
            steps: step_names.into_iter().map(StepRecord::new).collect(),
            state,
            error: None,
            compensation_error: None,
            submitted_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Returns true once the flight reached a terminal status.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.is_terminal()
    }

    /// Names of the steps, in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Names of the steps that were compensated, in compensation order.
    #[must_use]
    pub fn compensated_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.compensated)
            .map(|s| s.name.as_str())
            .collect()
    }
}
