//! Record validation and transformation.
//!
//! Both stages are pure: a raw record goes in, an [`Event`] or a
//! [`RejectReason`] comes out. Rejects never fail a batch.

mod cast;
mod metadata;
mod validate;

pub use cast::transform;
pub use metadata::{DeviceMetadata, UNKNOWN};
pub use validate::{ValidRecord, parse_timestamp, validate};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::event::{Event, SourceRecord};

/// Which stage dropped a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectKind {
    Parse,
    Validation,
    Cast,
}

impl RejectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectKind::Parse => "parse",
            RejectKind::Validation => "validation",
            RejectKind::Cast => "cast",
        }
    }
}

/// Why a record was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    // parse
    InvalidUtf8,
    InvalidJson { message: String },
    NotAnObject,
    /// The whole file could not be fetched. Reported once, on line 0.
    UnreadableFile { message: String },
    // validation
    MissingEventId,
    InvalidEventId,
    MissingTimestamp,
    InvalidTimestamp { value: String },
    InvalidEventType { value: String },
    // cast
    MissingField { field: &'static str },
    InvalidPrice { value: String },
    InvalidQuantity { value: String },
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl RejectReason {
    pub fn kind(&self) -> RejectKind {
        match self {
            RejectReason::InvalidUtf8
            | RejectReason::InvalidJson { .. }
            | RejectReason::NotAnObject
            | RejectReason::UnreadableFile { .. } => RejectKind::Parse,
            RejectReason::MissingEventId
            | RejectReason::InvalidEventId
            | RejectReason::MissingTimestamp
            | RejectReason::InvalidTimestamp { .. }
            | RejectReason::InvalidEventType { .. } => RejectKind::Validation,
            RejectReason::MissingField { .. }
            | RejectReason::InvalidPrice { .. }
            | RejectReason::InvalidQuantity { .. }
            | RejectReason::WrongType { .. } => RejectKind::Cast,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidUtf8 => write!(f, "line is not valid UTF-8"),
            RejectReason::InvalidJson { message } => write!(f, "invalid JSON: {message}"),
            RejectReason::NotAnObject => write!(f, "line is not a JSON object"),
            RejectReason::UnreadableFile { message } => {
                write!(f, "file could not be read: {message}")
            }
            RejectReason::MissingEventId => write!(f, "event_id is missing or null"),
            RejectReason::InvalidEventId => write!(f, "event_id must be a non-empty string"),
            RejectReason::MissingTimestamp => write!(f, "timestamp is missing or null"),
            RejectReason::InvalidTimestamp { value } => {
                write!(f, "timestamp '{value}' is not a recognized format")
            }
            RejectReason::InvalidEventType { value } => {
                write!(f, "event_type {value} is not one of view, click, purchase, add_to_cart")
            }
            RejectReason::MissingField { field } => write!(f, "{field} is missing or null"),
            RejectReason::InvalidPrice { value } => write!(
                f,
                "price {value} is not a non-negative decimal with at most 2 fractional digits"
            ),
            RejectReason::InvalidQuantity { value } => {
                write!(f, "quantity {value} is not an integer between 1 and 2147483647")
            }
            RejectReason::WrongType { field, expected } => {
                write!(f, "{field} must be {expected}")
            }
        }
    }
}

/// A dropped record with enough context to find and inspect it.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub file: String,
    pub line: usize,
    pub reason: RejectReason,
    /// The original line, or the re-serialized record.
    pub raw: String,
}

impl Rejected {
    pub fn kind(&self) -> RejectKind {
        self.reason.kind()
    }
}

/// Validate and transform every record, keeping source order.
///
/// All events share the same `ingestion_timestamp`.
pub fn process_records(
    records: Vec<SourceRecord>,
    ingestion_timestamp: DateTime<Utc>,
) -> (Vec<Event>, Vec<Rejected>) {
    let mut events = Vec::with_capacity(records.len());
    let mut rejects = Vec::new();

    for SourceRecord { file, line, record } in records {
        let raw = serde_json::Value::Object(record.clone()).to_string();
        match validate(record).and_then(|valid| transform(valid, ingestion_timestamp)) {
            Ok(event) => events.push(event),
            Err(reason) => {
                warn!(file = %file, line, kind = reason.kind().as_str(), reason = %reason, "Rejected record");
                rejects.push(Rejected {
                    file,
                    line,
                    reason,
                    raw,
                });
            }
        }
    }

    (events, rejects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(line: usize, value: serde_json::Value) -> SourceRecord {
        SourceRecord {
            file: "a.jsonl".to_string(),
            line,
            record: value.as_object().cloned().unwrap(),
        }
    }

    fn valid(id: &str) -> serde_json::Value {
        json!({
            "event_id": id,
            "event_type": "view",
            "timestamp": "2024-05-01T10:00:00Z",
            "price": 10.0,
            "quantity": 1
        })
    }

    #[test]
    fn test_reject_kinds() {
        assert_eq!(RejectReason::NotAnObject.kind(), RejectKind::Parse);
        assert_eq!(RejectReason::MissingEventId.kind(), RejectKind::Validation);
        assert_eq!(
            RejectReason::InvalidQuantity {
                value: "0".to_string()
            }
            .kind(),
            RejectKind::Cast
        );
    }

    #[test]
    fn test_one_invalid_among_valid_is_isolated() {
        let records = vec![
            source(1, valid("a")),
            source(2, json!({"event_type": "view", "timestamp": "2024-05-01T10:00:00Z"})),
            source(3, valid("b")),
        ];

        let now = Utc::now();
        let (events, rejects) = process_records(records, now);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, "a");
        assert_eq!(events[1].event_id, "b");
        assert!(events.iter().all(|e| e.ingestion_timestamp == now));

        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].line, 2);
        assert_eq!(rejects[0].reason, RejectReason::MissingEventId);
        assert!(rejects[0].raw.contains("\"event_type\":\"view\""));
    }

    #[test]
    fn test_cast_failure_is_a_reject() {
        let mut bad = valid("c");
        bad["quantity"] = json!(0);
        let (events, rejects) = process_records(vec![source(1, bad)], Utc::now());

        assert!(events.is_empty());
        assert_eq!(rejects[0].kind(), RejectKind::Cast);
    }
}
