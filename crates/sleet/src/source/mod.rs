//! File source: discovers uncommitted input files and parses them.
//!
//! The source only reads. It never deletes, renames or rewrites input files.

mod listing;
mod reader;

pub use listing::{PendingFiles, file_id, select_pending};
pub use reader::{ParsedFile, parse_ndjson};

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::StreamExt;
use snafu::prelude::*;
use tracing::{debug, warn};

use sleet_core::emit;
use sleet_core::metrics::events::{FilesDiscovered, PendingFiles as PendingFilesGauge};
use sleet_core::storage::StorageProviderRef;

use crate::config::SourceConfig;
use crate::error::{ListSnafu, ReaderError};
use crate::event::RawBatch;
use crate::transform::{RejectReason, Rejected};

/// Reads micro-batches of NDJSON records from the input directory.
pub struct FileSource {
    storage: StorageProviderRef,
    config: SourceConfig,
    /// Pipeline identifier for metrics labeling.
    pipeline: String,
}

impl FileSource {
    pub fn new(storage: StorageProviderRef, config: SourceConfig, pipeline: String) -> Self {
        Self {
            storage,
            config,
            pipeline,
        }
    }

    /// List input files not in `committed`, capped at `max_files_per_trigger`.
    pub async fn discover(&self, committed: &BTreeSet<String>) -> Result<PendingFiles, ReaderError> {
        let listed = self
            .storage
            .list_files_with_suffixes(&self.config.suffixes)
            .await
            .context(ListSnafu)?;

        let pending = select_pending(listed, committed, self.config.max_files_per_trigger);

        emit!(FilesDiscovered {
            count: pending.selected.len() as u64,
            target: self.pipeline.clone(),
        });
        emit!(PendingFilesGauge {
            count: pending.selected.len() + pending.remaining,
            target: self.pipeline.clone(),
        });

        Ok(pending)
    }

    /// Read and parse the given files.
    ///
    /// Files are fetched concurrently but results keep the given order. A
    /// file that cannot be read becomes a single parse reject; it does not
    /// fail the batch.
    pub async fn read(&self, pending: PendingFiles) -> Result<RawBatch, ReaderError> {
        let storage = Arc::clone(&self.storage);
        let fetched: Vec<_> = futures::stream::iter(pending.selected)
            .map(move |path| {
                let storage = Arc::clone(&storage);
                async move {
                    let result = storage.get(path.clone()).await;
                    (file_id(&path), result)
                }
            })
            .buffered(self.config.max_concurrent_files.max(1))
            .collect()
            .await;

        let mut batch = RawBatch {
            pending_after: pending.remaining,
            ..Default::default()
        };
        for (file, result) in fetched {
            match result {
                Ok(bytes) => {
                    debug!(file = %file, bytes = bytes.len(), "Read input file");
                    let parsed = parse_ndjson(&file, &bytes);
                    batch.records.extend(parsed.records);
                    batch.rejects.extend(parsed.rejects);
                    batch.lines_read += parsed.lines_read;
                }
                Err(e) => {
                    warn!(file = %file, error = %e, "Input file could not be read");
                    batch.rejects.push(Rejected {
                        file: file.clone(),
                        line: 0,
                        reason: RejectReason::UnreadableFile {
                            message: e.to_string(),
                        },
                        raw: String::new(),
                    });
                }
            }
            batch.files.push(file);
        }

        Ok(batch)
    }

    /// Discover and read the next batch. `None` when there are no unseen files.
    pub async fn next_batch(
        &self,
        committed: &BTreeSet<String>,
    ) -> Result<Option<RawBatch>, ReaderError> {
        let pending = self.discover(committed).await?;
        if pending.selected.is_empty() {
            return Ok(None);
        }
        self.read(pending).await.map(Some)
    }
}
