//! Events the loader reports as Prometheus metrics.
//!
//! Pipeline events carry a `target` label with the pipeline name. Storage
//! events are labelled by operation only.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Something worth counting. Emitting records the metric and a trace line.
pub trait InternalEvent {
    fn emit(self);
}

/// Uncommitted files selected for a batch during a discovery pass.
pub struct FilesDiscovered {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for FilesDiscovered {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Files discovered");
        counter!("sleet_files_discovered_total", "target" => self.target).increment(self.count);
    }
}

/// Uncommitted files left in the input directory after a discovery pass.
pub struct PendingFiles {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for PendingFiles {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Pending files");
        gauge!("sleet_pending_files", "target" => self.target).set(self.count as f64);
    }
}

/// Non-blank lines read from input files.
pub struct RecordsRead {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RecordsRead {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records read");
        counter!("sleet_records_read_total", "target" => self.target).increment(self.count);
    }
}

/// Records dropped before reaching the sink.
pub struct RecordsRejected {
    pub count: u64,
    /// `parse`, `validation` or `cast`.
    pub kind: &'static str,
    pub target: String,
}

impl InternalEvent for RecordsRejected {
    fn emit(self) {
        trace!(count = self.count, kind = self.kind, target = %self.target, "Records rejected");
        counter!("sleet_records_rejected_total", "kind" => self.kind, "target" => self.target)
            .increment(self.count);
    }
}

/// Distinct rows written by a successful upsert.
pub struct RowsUpserted {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RowsUpserted {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Rows upserted");
        counter!("sleet_rows_upserted_total", "target" => self.target).increment(self.count);
    }
}

/// Final status of a micro-batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Committed,
    SinkFailed,
    CheckpointFailed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Committed => "committed",
            BatchStatus::SinkFailed => "sink_failed",
            BatchStatus::CheckpointFailed => "checkpoint_failed",
        }
    }
}

/// A micro-batch reached a final status.
pub struct BatchCompleted {
    pub status: BatchStatus,
    pub target: String,
}

impl InternalEvent for BatchCompleted {
    fn emit(self) {
        trace!(status = self.status.as_str(), target = %self.target, "Batch completed");
        counter!("sleet_batches_total", "status" => self.status.as_str(), "target" => self.target)
            .increment(1);
    }
}

/// Checkpoint document durably written.
pub struct CheckpointSaved {
    pub target: String,
}

impl InternalEvent for CheckpointSaved {
    fn emit(self) {
        trace!(target = %self.target, "Checkpoint saved");
        counter!("sleet_checkpoints_saved_total", "target" => self.target).increment(1);
    }
}

/// Object store call made through a `StorageProvider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Get,
    Put,
    List,
    Rename,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
            StorageOperation::Rename => "rename",
        }
    }
}

/// One storage call finished, successfully or not.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub succeeded: bool,
    pub duration: Duration,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        let operation = self.operation.as_str();
        let status = if self.succeeded { "success" } else { "error" };
        trace!(operation, status, duration_ms = self.duration.as_millis(), "Storage request");
        counter!("sleet_storage_requests_total", "operation" => operation, "status" => status)
            .increment(1);
        histogram!("sleet_storage_request_duration_seconds", "operation" => operation)
            .record(self.duration.as_secs_f64());
    }
}

/// Time spent inside the sink's apply call.
pub struct BatchApplyDuration {
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for BatchApplyDuration {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "Batch apply completed"
        );
        histogram!("sleet_batch_apply_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// Largest gap between event time and ingestion time within a batch.
pub struct IngestionLag {
    pub lag: Duration,
    pub target: String,
}

impl InternalEvent for IngestionLag {
    fn emit(self) {
        trace!(lag_ms = self.lag.as_millis(), target = %self.target, "Ingestion lag");
        histogram!("sleet_ingestion_lag_seconds", "target" => self.target)
            .record(self.lag.as_secs_f64());
    }
}

/// Outcome label for a trigger tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResultType {
    Processed,
    Idle,
    Failed,
}

impl TickResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickResultType::Processed => "processed",
            TickResultType::Idle => "idle",
            TickResultType::Failed => "failed",
        }
    }
}

/// One trigger tick finished.
pub struct TickCompleted {
    pub result: TickResultType,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for TickCompleted {
    fn emit(self) {
        trace!(
            result = self.result.as_str(),
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "Tick completed"
        );
        counter!("sleet_ticks_total", "result" => self.result.as_str(), "target" => self.target.clone())
            .increment(1);
        histogram!("sleet_tick_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_status_labels() {
        assert_eq!(BatchStatus::Committed.as_str(), "committed");
        assert_eq!(BatchStatus::SinkFailed.as_str(), "sink_failed");
        assert_eq!(BatchStatus::CheckpointFailed.as_str(), "checkpoint_failed");
    }

    #[test]
    fn test_emit_without_recorder_is_noop() {
        crate::emit!(RowsUpserted {
            count: 3,
            target: "test".to_string(),
        });
        crate::emit!(StorageRequest {
            operation: StorageOperation::Rename,
            succeeded: false,
            duration: Duration::from_millis(1),
        });
        crate::emit!(TickCompleted {
            result: TickResultType::Idle,
            duration: Duration::from_millis(5),
            target: "test".to_string(),
        });
    }
}
