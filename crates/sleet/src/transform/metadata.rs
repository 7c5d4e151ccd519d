//! Nested `metadata` parsing.
//!
//! A separate, narrow parse: it never rejects a record. Anything missing or
//! malformed becomes [`UNKNOWN`].

use serde::Deserialize;
use serde_json::Value;

/// Sentinel for metadata values that could not be determined.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Default, Deserialize)]
struct MetadataDoc {
    #[serde(default)]
    device: Option<Value>,
    #[serde(default)]
    browser: Option<Value>,
    #[serde(default)]
    location: Option<Value>,
}

/// Device details flattened out of `metadata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub device: String,
    pub browser: String,
    pub location: String,
}

impl Default for DeviceMetadata {
    fn default() -> Self {
        Self {
            device: UNKNOWN.to_string(),
            browser: UNKNOWN.to_string(),
            location: UNKNOWN.to_string(),
        }
    }
}

fn text_or_unknown(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => UNKNOWN.to_string(),
    }
}

impl DeviceMetadata {
    /// Read metadata given either as a JSON-encoded string or an inline object.
    pub fn from_value(value: Option<Value>) -> Self {
        let doc = match value {
            Some(Value::String(encoded)) => serde_json::from_str::<MetadataDoc>(&encoded).ok(),
            Some(object @ Value::Object(_)) => serde_json::from_value::<MetadataDoc>(object).ok(),
            _ => None,
        }
        .unwrap_or_default();

        Self {
            device: text_or_unknown(doc.device),
            browser: text_or_unknown(doc.browser),
            location: text_or_unknown(doc.location),
        }
    }
}
