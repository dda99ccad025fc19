//! File-backed checkpoint store: one JSON document per flight.

use super::CheckpointStore;
use crate::errors::StoreError;
use crate::flight::FlightCheckpoint;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

const EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "tmp";

/// Checkpoint store that keeps each flight in `<dir>/<flight_id>.json`.
///
/// Every write goes to a synced temporary file first. New checkpoints are
/// hard-linked into place and updates are renamed over the previous version,
/// so a crash never leaves a half-written checkpoint behind. Files that still
/// fail to parse are skipped by `list_active`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Opens a store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// The directory holding the checkpoints.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, flight_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !flight_id.is_empty()
            && flight_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !flight_id.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidId(flight_id.to_string()));
        }
        Ok(self.dir.join(format!("{flight_id}.{EXTENSION}")))
    }

    async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn read(path: &Path, flight_id: &str) -> Result<FlightCheckpoint, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(flight_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn create(&self, checkpoint: &FlightCheckpoint) -> Result<(), StoreError> {
        let path = self.path_for(&checkpoint.flight_id)?;
        let bytes = serde_json::to_vec_pretty(checkpoint)?;

        // The final name only ever points at a fully synced file. Linking never
        // replaces an existing checkpoint.
        let tmp = self.dir.join(format!(
            "{}.{}.{TMP_EXTENSION}",
            checkpoint.flight_id,
            uuid::Uuid::new_v4().simple()
        ));
        Self::write_synced(&tmp, &bytes).await?;
        let linked = tokio::fs::hard_link(&tmp, &path).await;
        tokio::fs::remove_file(&tmp).await?;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::Duplicate(checkpoint.flight_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_checkpoint(&self, checkpoint: &FlightCheckpoint) -> Result<(), StoreError> {
        let path = self.path_for(&checkpoint.flight_id)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::NotFound(checkpoint.flight_id.clone()));
        }

        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = path.with_extension(format!("{EXTENSION}.{TMP_EXTENSION}"));
        Self::write_synced(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_checkpoint(&self, flight_id: &str) -> Result<FlightCheckpoint, StoreError> {
        let path = self.path_for(flight_id)?;
        Self::read(&path, flight_id).await
    }

    async fn list_active(&self) -> Result<Vec<FlightCheckpoint>, StoreError> {
        let mut active = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(flight_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let checkpoint = match Self::read(&path, flight_id).await {
                Ok(checkpoint) => checkpoint,
                Err(StoreError::Serialization(e)) => {
                    warn!(flight_id = %flight_id, error = %e, "Skipping unreadable checkpoint");
                    continue;
                }
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if !checkpoint.is_complete() {
                active.push(checkpoint);
            }
        }
        active.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(active)
    }
}
