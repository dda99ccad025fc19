//! Crash-safe key/value state shared between the steps of a flight.
//!
//! A `WorkingState` has two partitions. `inputs` is fixed at submission and
//! never changes. `working` is written by steps as they run. The whole state is
//! captured in a `StateSnapshot` after every step boundary and stored with the
//! flight checkpoint.

mod map;
mod resource;

pub use map::{FlightMap, InputParameters};
pub use resource::{ResourceKeys, ResourceRecord};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved working-state and input keys.
pub mod keys {
    /// Working key holding the flight's result value.
    pub const RESULT: &str = "response";
    /// Working key holding the status code reported on success.
    pub const STATUS_CODE: &str = "status_code";
    /// Input key holding the job description.
    pub const DESCRIPTION: &str = "description";
    /// Input key holding the path used to build the job result URL.
    pub const RESULT_PATH: &str = "result_path";
}

/// The state a flight's steps read from and write to.
#[derive(Debug, Clone, Default)]
pub struct WorkingState {
    inputs: InputParameters,
    working: FlightMap,
}

impl WorkingState {
    /// Creates a state with the given inputs and an empty working partition.
    #[must_use]
    pub fn new(inputs: InputParameters) -> Self {
        Self {
            inputs,
            working: FlightMap::new(),
        }
    }

    /// Restores a state from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: StateSnapshot) -> Self {
        Self {
            inputs: InputParameters::from_data(snapshot.inputs),
            working: FlightMap::from_data(snapshot.working),
        }
    }

    /// The immutable input partition.
    #[must_use]
    pub fn inputs(&self) -> &InputParameters {
        &self.inputs
    }

    /// The mutable working partition.
    #[must_use]
    pub fn working(&self) -> &FlightMap {
        &self.working
    }

    /// Captures the current contents for persistence.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            inputs: self.inputs.to_dict(),
            working: self.working.to_dict(),
        }
    }
}

/// Serializable copy of a `WorkingState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Input partition.
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
    /// Working partition.
    #[serde(default)]
    pub working: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snapshot_restores_both_partitions() {
        let state = WorkingState::new(InputParameters::new().with("region", "westus"));
        state
            .working()
            .put("VNET", &ResourceRecord::new("vnet-id", "VNET"))
            .unwrap();

        let snapshot = state.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = WorkingState::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.snapshot(), snapshot);
        let record: ResourceRecord = restored.working().get_required("VNET").unwrap();
        assert_eq!(record.resource_id, "vnet-id");
        assert_eq!(
            restored.inputs().get_required::<String>("region").unwrap(),
            "westus"
        );
    }

    #[test]
    fn test_writes_visible_through_shared_reference() {
        let state = WorkingState::default();
        let writer = &state;
        writer.working().put("k", "v").unwrap();
        assert_eq!(state.working().get_required::<String>("k").unwrap(), "v");
    }
}
