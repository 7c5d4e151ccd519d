//! sleet-core: Shared infrastructure for the sleet pipeline.
//!
//! - `storage/` - Local filesystem storage over `object_store`
//! - `metrics/` - Prometheus metrics infrastructure and internal events
//! - `config/` - CLI arguments, YAML loading and environment variable interpolation
//! - `polling` - Trigger loop trait and runner
//! - `signal` - Signal handling for graceful shutdown
//! - `tracing` - Subscriber setup
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod polling;
pub mod signal;
pub mod storage;
pub mod tracing;

// Re-export commonly used items
pub use config::{CliArgs, MetricsConfig};
pub use error::{ConfigError, MetricsError, StorageError};
pub use metrics::{
    DEFAULT_METRICS_ADDR, MetricsController, init_global as init_metrics,
    init_test as init_metrics_test,
};
pub use polling::{IterationResult, PollingProcessor, run_polling_loop};
pub use signal::shutdown_signal;
pub use storage::{StorageProvider, StorageProviderRef};
pub use crate::tracing::{LogFormat, init_tracing};
