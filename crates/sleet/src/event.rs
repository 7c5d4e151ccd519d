//! Event model: raw input records, canonical events and micro-batches.

use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transform::Rejected;

/// One parsed input line: untyped field map exactly as it appeared.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A raw record together with where it came from.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// File id (path relative to the input directory).
    pub file: String,
    /// 1-based line number within the file.
    pub line: usize,
    pub record: RawRecord,
}

/// Kind of user interaction an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    View,
    Click,
    Purchase,
    AddToCart,
}

impl EventType {
    /// Parse the exact wire name. No trimming or case folding.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view" => Some(EventType::View),
            "click" => Some(EventType::Click),
            "purchase" => Some(EventType::Purchase),
            "add_to_cart" => Some(EventType::AddToCart),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::Click => "click",
            EventType::Purchase => "purchase",
            EventType::AddToCart => "add_to_cart",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated and transformed event, one row of the target table.
///
/// `event_id` is the natural key; a later write with the same id replaces
/// every other field.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub ingestion_timestamp: DateTime<Utc>,
    pub device: String,
    pub browser: String,
    pub location: String,
    /// Non-negative, scale 2.
    pub price: BigDecimal,
    /// At least 1.
    pub quantity: i32,
    pub discount_applied: bool,
    pub product_category: Option<String>,
}

/// Records read from one set of input files during a single tick.
#[derive(Debug, Default)]
pub struct RawBatch {
    /// Files in this batch, in filename order.
    pub files: Vec<String>,
    /// Successfully parsed records, in file order then line order.
    pub records: Vec<SourceRecord>,
    /// Lines that were not a JSON object.
    pub rejects: Vec<Rejected>,
    /// Non-blank lines seen.
    pub lines_read: u64,
    /// Uncommitted files still waiting after this batch was selected.
    pub pending_after: usize,
}

/// A micro-batch ready for the sink.
#[derive(Debug)]
pub struct Batch {
    /// Increases by one for every batch the pipeline forms, across restarts.
    pub batch_id: u64,
    pub files: Vec<String>,
    /// Events in source order.
    pub events: Vec<Event>,
    /// Every record dropped while forming this batch.
    pub rejects: Vec<Rejected>,
    pub lines_read: u64,
}

impl Batch {
    /// Largest gap between an event's own time and its ingestion time.
    pub fn max_ingestion_lag(&self) -> Option<std::time::Duration> {
        self.events
            .iter()
            .filter_map(|e| (e.ingestion_timestamp - e.timestamp).to_std().ok())
            .max()
    }
}
