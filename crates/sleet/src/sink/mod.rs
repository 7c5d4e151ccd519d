//! Upsert sinks.
//!
//! A sink applies one batch as a single transaction: every row becomes
//! visible or none does. Applying the same rows twice leaves the table as
//! applying them once.

pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use postgres::PostgresSink;
pub use sqlite::SqliteSink;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::{BackendConfig, SinkConfig};
use crate::error::SinkError;
use crate::event::Event;

/// Applies micro-batches of events to the target table.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Create the target table if it does not exist.
    async fn ensure_table(&self) -> Result<(), SinkError>;

    /// Upsert `events` in one transaction, last occurrence of an
    /// `event_id` winning. Returns the number of distinct rows applied.
    async fn apply(&self, events: &[Event]) -> Result<u64, SinkError>;

    /// Release the connection. Called once on shutdown.
    async fn close(&self) {}
}

/// Collapse duplicate `event_id`s, keeping the last occurrence.
///
/// The survivors stay in the order of their last occurrence.
pub fn dedupe_last_wins(events: &[Event]) -> Vec<&Event> {
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(events.len());
    for (idx, event) in events.iter().enumerate() {
        last.insert(event.event_id.as_str(), idx);
    }

    events
        .iter()
        .enumerate()
        .filter(|(idx, event)| last.get(event.event_id.as_str()) == Some(idx))
        .map(|(_, event)| event)
        .collect()
}

/// Build the sink described by `config`. Does not connect yet.
pub async fn build_sink(config: &SinkConfig) -> Result<Box<dyn EventSink>, SinkError> {
    match &config.backend {
        BackendConfig::Postgres(pg) => Ok(Box::new(PostgresSink::new(
            pg.clone(),
            config.table.clone(),
        ))),
        BackendConfig::Sqlite(lite) => Ok(Box::new(
            SqliteSink::open(std::path::Path::new(&lite.path), config.table.clone()).await?,
        )),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::event;
    use super::*;
    use crate::event::EventType;

    #[test]
    fn test_dedupe_keeps_last_occurrence() {
        let events = vec![
            event("E1", EventType::View, "10.00"),
            event("E2", EventType::Click, "1.00"),
            event("E1", EventType::Purchase, "19.99"),
        ];

        let rows = dedupe_last_wins(&events);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_id, "E2");
        assert_eq!(rows[1].event_id, "E1");
        assert_eq!(rows[1].event_type, EventType::Purchase);
        assert_eq!(rows[1].price.to_string(), "19.99");
    }

    #[test]
    fn test_dedupe_without_duplicates_is_identity() {
        let events = vec![
            event("A", EventType::View, "1"),
            event("B", EventType::View, "2"),
        ];
        let rows = dedupe_last_wins(&events);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_id, "A");
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe_last_wins(&[]).is_empty());
    }
}
