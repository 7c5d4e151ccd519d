//! Sleet: micro-batch loader that upserts NDJSON event files into a
//! relational table.
//!
//! This crate handles:
//! - Discovering uncommitted input files and parsing them line by line
//! - Validating and casting records into typed events
//! - Idempotent upserts into PostgreSQL or SQLite, keyed on `event_id`
//! - A committed-file checkpoint advanced only after the upsert succeeded
//! - An optional per-batch log of rejected records

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod rejects;
pub mod sink;
pub mod source;
pub mod transform;

/// Re-export storage module from sleet-core for convenience
pub mod storage {
    pub use sleet_core::storage::*;
}

// Re-export commonly used items
pub use config::Config;
pub use error::PipelineError;
pub use event::{Event, EventType};
pub use pipeline::{Pipeline, PipelineStats, TickOutcome, run_pipeline};

// Re-export from sleet-core
pub use sleet_core::{
    CliArgs, LogFormat, MetricsConfig, StorageProvider, StorageProviderRef, init_metrics,
    init_tracing, shutdown_signal,
};
