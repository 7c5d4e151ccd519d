//! Error types for the sleet pipeline.
//!
//! Per-record problems are not errors: they are [`RejectReason`]s and never
//! leave the batch. The enums here cover failures that abandon a tick or
//! stop the process.
//!
//! [`RejectReason`]: crate::transform::RejectReason

use snafu::prelude::*;

// Re-export common errors
pub use sleet_core::error::{ConfigError, MetricsError, StorageError};

/// Errors that can occur while discovering input files.
///
/// A listed file that then fails to read is a reject, not an error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Listing the input directory failed.
    #[snafu(display("Failed to list input files: {source}"))]
    List { source: StorageError },
}

/// Errors that can occur while applying a batch to the target table.
///
/// Any of these aborts the whole batch; nothing from it is visible.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// PostgreSQL connect, execute or commit failed.
    #[snafu(display("PostgreSQL {operation} failed: {source}"))]
    Postgres {
        operation: &'static str,
        source: tokio_postgres::Error,
    },

    /// Connecting to PostgreSQL did not finish in time.
    #[snafu(display("PostgreSQL connect timed out after {secs}s"))]
    ConnectTimeout { secs: u64 },

    /// The directory holding the SQLite database could not be created.
    #[snafu(display("Cannot create database directory {}: {source}", path.display()))]
    CreateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// SQLite open, execute or commit failed.
    #[snafu(display("SQLite {operation} failed: {source}"))]
    Sqlite {
        operation: &'static str,
        source: rusqlite::Error,
    },

    /// The blocking SQLite task panicked or was cancelled.
    #[snafu(display("SQLite task failed: {source}"))]
    TaskJoin { source: tokio::task::JoinError },

    /// The SQLite connection mutex was poisoned by an earlier panic.
    #[snafu(display("SQLite connection lock poisoned"))]
    LockPoisoned,

    /// The sink was used after `close`.
    #[snafu(display("Sink is closed"))]
    Closed,
}

/// Errors that can occur while persisting or loading the checkpoint.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Failed to read or write the checkpoint file.
    #[snafu(display("Checkpoint storage error: {source}"))]
    CheckpointStorage { source: StorageError },

    /// Failed to serialize checkpoint state.
    #[snafu(display("Failed to serialize checkpoint: {source}"))]
    CheckpointSerialize { source: serde_json::Error },
}

/// Errors that can occur while writing the reject log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RejectLogError {
    /// Failed to serialize a reject entry.
    #[snafu(display("Failed to serialize reject entry: {source}"))]
    RejectSerialize { source: serde_json::Error },

    /// Failed to write the reject file.
    #[snafu(display("Failed to write reject file: {source}"))]
    RejectWrite { source: StorageError },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Reader error.
    #[snafu(display("Reader error: {source}"))]
    Reader { source: ReaderError },

    /// Sink error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// Checkpoint error.
    #[snafu(display("Checkpoint error: {source}"))]
    Checkpoint { source: CheckpointError },

    /// Reject log setup error.
    #[snafu(display("Reject log error: {source}"))]
    RejectLog { source: RejectLogError },

    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<ReaderError> for PipelineError {
    fn from(source: ReaderError) -> Self {
        PipelineError::Reader { source }
    }
}

impl From<SinkError> for PipelineError {
    fn from(source: SinkError) -> Self {
        PipelineError::Sink { source }
    }
}

impl From<CheckpointError> for PipelineError {
    fn from(source: CheckpointError) -> Self {
        PipelineError::Checkpoint { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_display_names_operation() {
        let err = SinkError::ConnectTimeout { secs: 10 };
        assert_eq!(err.to_string(), "PostgreSQL connect timed out after 10s");
    }

    #[test]
    fn test_pipeline_error_from_config() {
        let err: PipelineError = ConfigError::EmptySourcePath.into();
        assert!(matches!(err, PipelineError::Config { .. }));
        assert!(err.to_string().contains("source.path must not be empty"));
    }

    #[test]
    fn test_reader_error_keeps_storage_cause() {
        let err = ReaderError::List {
            source: StorageError::Io {
                source: std::io::Error::other("boom"),
            },
        };
        assert!(err.to_string().contains("boom"));
    }
}
