//! Structural and semantic validation of raw records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use super::RejectReason;
use crate::event::{EventType, RawRecord};

/// Naive layouts accepted in addition to RFC 3339. Interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A record that passed validation, with its key fields already extracted.
#[derive(Debug, Clone)]
pub struct ValidRecord {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Remaining fields, still untyped.
    pub fields: RawRecord,
}

/// Parse an event timestamp.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "missing".to_string(),
        Some(v) => v.to_string(),
    }
}

/// Check that a record has a usable key, time and type.
pub fn validate(mut record: RawRecord) -> Result<ValidRecord, RejectReason> {
    let event_id = match record.remove("event_id") {
        None | Some(Value::Null) => return Err(RejectReason::MissingEventId),
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        Some(_) => return Err(RejectReason::InvalidEventId),
    };

    let timestamp = match record.remove("timestamp") {
        None | Some(Value::Null) => return Err(RejectReason::MissingTimestamp),
        Some(Value::String(raw)) => {
            parse_timestamp(&raw).ok_or(RejectReason::InvalidTimestamp { value: raw })?
        }
        Some(other) => {
            return Err(RejectReason::InvalidTimestamp {
                value: other.to_string(),
            });
        }
    };

    let event_type = match record.remove("event_type") {
        Some(Value::String(raw)) => match EventType::parse(&raw) {
            Some(t) => t,
            None => {
                return Err(RejectReason::InvalidEventType {
                    value: Value::String(raw).to_string(),
                });
            }
        },
        other => {
            return Err(RejectReason::InvalidEventType {
                value: describe(other.as_ref()),
            });
        }
    };

    Ok(ValidRecord {
        event_id,
        event_type,
        timestamp,
        fields: record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn base() -> Value {
        json!({
            "event_id": "E1",
            "event_type": "purchase",
            "timestamp": "2024-05-01T10:00:00Z",
            "price": 19.99
        })
    }

    #[test]
    fn test_valid_record_extracts_key_fields() {
        let valid = validate(record(base())).unwrap();
        assert_eq!(valid.event_id, "E1");
        assert_eq!(valid.event_type, EventType::Purchase);
        assert_eq!(
            valid.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert!(valid.fields.contains_key("price"));
        assert!(!valid.fields.contains_key("event_id"));
    }

    #[test]
    fn test_event_id_rules() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("event_id");
        assert_eq!(validate(record(v)).unwrap_err(), RejectReason::MissingEventId);

        let mut v = base();
        v["event_id"] = Value::Null;
        assert_eq!(validate(record(v)).unwrap_err(), RejectReason::MissingEventId);

        let mut v = base();
        v["event_id"] = json!("   ");
        assert_eq!(validate(record(v)).unwrap_err(), RejectReason::InvalidEventId);

        let mut v = base();
        v["event_id"] = json!(42);
        assert_eq!(validate(record(v)).unwrap_err(), RejectReason::InvalidEventId);
    }

    #[test]
    fn test_timestamp_rules() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("timestamp");
        assert_eq!(validate(record(v)).unwrap_err(), RejectReason::MissingTimestamp);

        let mut v = base();
        v["timestamp"] = json!("yesterday");
        assert!(matches!(
            validate(record(v)).unwrap_err(),
            RejectReason::InvalidTimestamp { .. }
        ));

        let mut v = base();
        v["timestamp"] = json!(1714557600);
        assert!(matches!(
            validate(record(v)).unwrap_err(),
            RejectReason::InvalidTimestamp { .. }
        ));
    }

    #[test]
    fn test_event_type_must_match_exactly() {
        for bad in [json!("Purchase"), json!("refund"), json!(1), Value::Null] {
            let mut v = base();
            v["event_type"] = bad;
            assert!(matches!(
                validate(record(v)).unwrap_err(),
                RejectReason::InvalidEventType { .. }
            ));
        }

        let mut v = base();
        v.as_object_mut().unwrap().remove("event_type");
        assert_eq!(
            validate(record(v)).unwrap_err(),
            RejectReason::InvalidEventType {
                value: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 10:00:00"), Some(expected));

        let with_fraction = parse_timestamp("2024-05-01T10:00:00.123456").unwrap();
        assert_eq!(with_fraction.timestamp_subsec_micros(), 123456);

        assert_eq!(parse_timestamp("2024-05-01"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
