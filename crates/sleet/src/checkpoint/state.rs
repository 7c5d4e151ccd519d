//! Persisted checkpoint document.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Default schema version for checkpoint state.
fn default_schema_version() -> u32 {
    1
}

/// Checkpoint state for committed-file tracking.
///
/// Input file names carry no ordering guarantee, so the full set of
/// committed file ids is kept rather than a high-watermark.
///
/// # Example
///
/// ```json
/// {
///   "schema_version": 1,
///   "committed_files": ["batch_0b1c.jsonl", "batch_9f2e.jsonl"],
///   "last_batch_id": 42,
///   "last_update_ts": 1738100400
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Files whose every event has been durably applied.
    #[serde(default)]
    pub committed_files: BTreeSet<String>,
    /// Id of the last batch that committed.
    #[serde(default)]
    pub last_batch_id: u64,
    /// Unix seconds of the last successful save.
    #[serde(default)]
    pub last_update_ts: i64,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            committed_files: BTreeSet::new(),
            last_batch_id: 0,
            last_update_ts: 0,
        }
    }
}

impl CheckpointState {
    /// A copy of this state with `files` committed under `batch_id`.
    pub fn with_committed<'a>(
        &self,
        files: impl IntoIterator<Item = &'a String>,
        batch_id: u64,
        now_ts: i64,
    ) -> Self {
        let mut next = self.clone();
        next.committed_files.extend(files.into_iter().cloned());
        next.last_batch_id = next.last_batch_id.max(batch_id);
        next.last_update_ts = now_ts;
        next
    }
}
