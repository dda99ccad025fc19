//! Durable storage of flight checkpoints.
//!
//! The checkpoint store is the only state shared between flights. Every
//! operation reads or writes a single record atomically.

mod file;
mod memory;

pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;

use crate::errors::StoreError;
use crate::flight::FlightCheckpoint;
use async_trait::async_trait;

/// Storage backend for flight checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stores the initial checkpoint of a new flight.
    ///
    /// Fails with `StoreError::Duplicate` if the id is taken.
    async fn create(&self, checkpoint: &FlightCheckpoint) -> Result<(), StoreError>;

    /// Replaces the checkpoint of an existing flight.
    ///
    /// Fails with `StoreError::NotFound` if the flight was never created.
    async fn save_checkpoint(&self, checkpoint: &FlightCheckpoint) -> Result<(), StoreError>;

    /// Loads a checkpoint by flight id.
    ///
    /// Fails with `StoreError::NotFound` for unknown ids.
    async fn load_checkpoint(&self, flight_id: &str) -> Result<FlightCheckpoint, StoreError>;

    /// Lists every flight that has not reached a terminal status.
    async fn list_active(&self) -> Result<Vec<FlightCheckpoint>, StoreError>;
}
