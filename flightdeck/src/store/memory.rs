//! In-memory checkpoint store.

use super::CheckpointStore;
use crate::errors::StoreError;
use crate::flight::FlightCheckpoint;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Checkpoint store backed by a concurrent map. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<String, FlightCheckpoint>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored flights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Returns true if no flights are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn create(&self, checkpoint: &FlightCheckpoint) -> Result<(), StoreError> {
        match self.checkpoints.entry(checkpoint.flight_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(checkpoint.flight_id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(checkpoint.clone());
                Ok(())
            }
        }
    }

    async fn save_checkpoint(&self, checkpoint: &FlightCheckpoint) -> Result<(), StoreError> {
        let mut existing = self
            .checkpoints
            .get_mut(&checkpoint.flight_id)
            .ok_or_else(|| StoreError::NotFound(checkpoint.flight_id.clone()))?;
        *existing = checkpoint.clone();
        Ok(())
    }

    async fn load_checkpoint(&self, flight_id: &str) -> Result<FlightCheckpoint, StoreError> {
        self.checkpoints
            .get(flight_id)
            .map(|cp| cp.value().clone())
            .ok_or_else(|| StoreError::NotFound(flight_id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<FlightCheckpoint>, StoreError> {
        Ok(self
            .checkpoints
            .iter()
            .filter(|cp| !cp.is_complete())
            .map(|cp| cp.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::FlightStatus;
    use crate::state::StateSnapshot;

    fn checkpoint(id: &str) -> FlightCheckpoint {
        FlightCheckpoint::new(id, "test", ["a".to_string()], StateSnapshot::default())
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = InMemoryCheckpointStore::new();
        store.create(&checkpoint("f1")).await.unwrap();

        let loaded = store.load_checkpoint("f1").await.unwrap();
        assert_eq!(loaded.flight_id, "f1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = InMemoryCheckpointStore::new();
        store.create(&checkpoint("f1")).await.unwrap();
        let err = store.create(&checkpoint("f1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "f1"));
    }

    #[tokio::test]
    async fn test_save_requires_existing() {
        let store = InMemoryCheckpointStore::new();
        let err = store.save_checkpoint(&checkpoint("f1")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_active_skips_terminal() {
        let store = InMemoryCheckpointStore::new();
        store.create(&checkpoint("running")).await.unwrap();
        let mut done = checkpoint("done");
        store.create(&done).await.unwrap();
        done.status = FlightStatus::Success;
        store.save_checkpoint(&done).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].flight_id, "running");
    }

    #[tokio::test]
    async fn test_load_unknown() {
        let store = InMemoryCheckpointStore::new();
        assert!(matches!(
            store.load_checkpoint("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
