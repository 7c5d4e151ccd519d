//! Reject log.
//!
//! Writes the rejected records of each committed batch to
//! `batch-{batch_id:010}.ndjson` for later inspection. Nothing is ever read
//! back from here.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::PutPayload;
use object_store::path::Path;
use serde::Serialize;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use sleet_core::storage::{StorageProvider, StorageProviderRef};

use crate::config::ErrorHandlingConfig;
use crate::error::{RejectLogError, RejectSerializeSnafu, RejectWriteSnafu};
use crate::transform::{RejectKind, Rejected};

/// One line of a reject file.
#[derive(Debug, Serialize)]
struct RejectEntry<'a> {
    batch_id: u64,
    file: &'a str,
    line: usize,
    kind: RejectKind,
    reason: String,
    raw: &'a str,
    timestamp: DateTime<Utc>,
}

/// Per-batch NDJSON files of rejected records.
pub struct RejectLog {
    storage: StorageProviderRef,
}

impl RejectLog {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    /// Create a reject log from configuration.
    ///
    /// Returns `None` if no reject path is configured.
    pub async fn from_config(config: &ErrorHandlingConfig) -> Result<Option<Self>, RejectLogError> {
        let Some(reject_path) = &config.reject_path else {
            return Ok(None);
        };

        let storage = StorageProvider::for_path(reject_path)
            .await
            .context(RejectWriteSnafu)?;

        info!(path = %reject_path, "Reject log enabled");
        Ok(Some(Self::new(Arc::new(storage))))
    }

    fn batch_path(batch_id: u64) -> Path {
        Path::from(format!("batch-{batch_id:010}.ndjson"))
    }

    /// Write `rejects` for `batch_id`. Does nothing when there are none.
    pub async fn write_batch(
        &self,
        batch_id: u64,
        rejects: &[Rejected],
    ) -> Result<(), RejectLogError> {
        if rejects.is_empty() {
            return Ok(());
        }

        let timestamp = Utc::now();
        let mut ndjson = String::new();
        for rejected in rejects {
            let entry = RejectEntry {
                batch_id,
                file: &rejected.file,
                line: rejected.line,
                kind: rejected.kind(),
                reason: rejected.reason.to_string(),
                raw: &rejected.raw,
                timestamp,
            };
            let line = serde_json::to_string(&entry).context(RejectSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }

        let path = Self::batch_path(batch_id);
        self.storage
            .put_payload(&path, PutPayload::from(Bytes::from(ndjson)))
            .await
            .context(RejectWriteSnafu)?;

        debug!(batch_id, rejects = rejects.len(), path = %path, "Wrote reject file");
        Ok(())
    }
}
