//! Metrics and observability infrastructure.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder and HTTP endpoint

pub mod events;
pub mod server;

pub use server::{DEFAULT_METRICS_ADDR, MetricsController, init_global, init_test};

/// Emit an internal event (Vector-style pattern).
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding metric and a trace-level log line.
///
/// ```ignore
/// use sleet_core::emit;
/// use sleet_core::metrics::events::RowsUpserted;
///
/// emit!(RowsUpserted { count: 100, target: "ecommerce".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
