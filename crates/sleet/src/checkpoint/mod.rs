//! Checkpoint management for committed input files.
//!
//! Checkpoints are stored at `{checkpoint_dir}/{pipeline}_checkpoint.json`.
//!
//! # Atomic Writes
//!
//! Checkpoint updates use atomic write pattern:
//! 1. Write to temp file: `{pipeline}_checkpoint.json.tmp`
//! 2. Rename to final path: `{pipeline}_checkpoint.json`
//!
//! The in-memory view only changes after the rename succeeded, so a failed
//! save leaves both the file and the view at the previous state.

pub mod state;

pub use state::CheckpointState;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use object_store::path::Path;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use sleet_core::emit;
use sleet_core::metrics::events::CheckpointSaved;
use sleet_core::storage::StorageProviderRef;

use crate::error::{CheckpointError, CheckpointSerializeSnafu, CheckpointStorageSnafu};

/// Durable record of which input files have been fully committed.
///
/// Only the pipeline driver writes through this trait, and only after the
/// sink reported success for the files being marked.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load persisted state. Returns `Ok(true)` if a checkpoint was found.
    async fn load(&mut self) -> Result<bool, CheckpointError>;

    /// File ids committed so far.
    fn committed(&self) -> &BTreeSet<String>;

    /// Id of the last committed batch, 0 if none.
    fn last_batch_id(&self) -> u64;

    /// Durably add `files` to the committed set.
    ///
    /// On error nothing changes, in storage or in memory.
    async fn mark_committed(&mut self, files: &[String], batch_id: u64)
    -> Result<(), CheckpointError>;
}

/// Checkpoint store backed by a JSON file in a local directory.
pub struct FileCheckpointStore {
    storage: StorageProviderRef,
    /// Pipeline identifier (used in checkpoint filename).
    pipeline: String,
    state: CheckpointState,
}

impl FileCheckpointStore {
    pub fn new(storage: StorageProviderRef, pipeline: String) -> Self {
        Self {
            storage,
            pipeline,
            state: CheckpointState::default(),
        }
    }

    fn checkpoint_path(&self) -> Path {
        Path::from(format!("{}_checkpoint.json", self.pipeline))
    }

    /// Current state.
    pub fn state(&self) -> &CheckpointState {
        &self.state
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&mut self) -> Result<bool, CheckpointError> {
        let path = self.checkpoint_path();

        match self.storage.get(path).await {
            Ok(bytes) => match serde_json::from_slice::<CheckpointState>(&bytes) {
                Ok(state) => {
                    info!(
                        target = %self.pipeline,
                        committed_files = state.committed_files.len(),
                        last_batch_id = state.last_batch_id,
                        last_update_ts = state.last_update_ts,
                        "Loaded checkpoint"
                    );
                    self.state = state;
                    Ok(true)
                }
                Err(e) => {
                    warn!(
                        target = %self.pipeline,
                        error = %e,
                        "Failed to parse checkpoint JSON, starting fresh"
                    );
                    self.state = CheckpointState::default();
                    Ok(false)
                }
            },
            Err(e) if e.is_not_found() => {
                debug!(target = %self.pipeline, "No checkpoint found, starting fresh");
                Ok(false)
            }
            Err(e) => Err(e).context(CheckpointStorageSnafu),
        }
    }

    fn committed(&self) -> &BTreeSet<String> {
        &self.state.committed_files
    }

    fn last_batch_id(&self) -> u64 {
        self.state.last_batch_id
    }

    async fn mark_committed(
        &mut self,
        files: &[String],
        batch_id: u64,
    ) -> Result<(), CheckpointError> {
        let next = self
            .state
            .with_committed(files, batch_id, Utc::now().timestamp());
        let json = serde_json::to_vec_pretty(&next).context(CheckpointSerializeSnafu)?;

        self.storage
            .atomic_write(&self.checkpoint_path(), json)
            .await
            .context(CheckpointStorageSnafu)?;

        self.state = next;

        emit!(CheckpointSaved {
            target: self.pipeline.clone(),
        });
        debug!(
            target = %self.pipeline,
            batch_id,
            files = files.len(),
            committed_files = self.state.committed_files.len(),
            "Saved checkpoint"
        );

        Ok(())
    }
}
