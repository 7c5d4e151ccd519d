//! Reshape a validated record into an [`Event`], casting typed columns.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::metadata::DeviceMetadata;
use super::validate::ValidRecord;
use super::RejectReason;
use crate::event::{Event, RawRecord};

/// Fractional digits stored for `price`.
const PRICE_SCALE: i64 = 2;

/// Integer digits allowed by `NUMERIC(12,2)`.
const PRICE_MAX_INTEGER_DIGITS: u64 = 10;

fn take(fields: &mut RawRecord, field: &'static str) -> Option<Value> {
    match fields.remove(field) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value),
    }
}

fn cast_price(value: Value) -> Result<BigDecimal, RejectReason> {
    let invalid = |v: &Value| RejectReason::InvalidPrice {
        value: v.to_string(),
    };

    let parsed = match &value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
    .ok_or_else(|| invalid(&value))?;

    if parsed < BigDecimal::from(0) {
        return Err(invalid(&value));
    }

    let normalized = parsed.normalized();
    let (_, scale) = normalized.as_bigint_and_exponent();
    if scale > PRICE_SCALE {
        return Err(invalid(&value));
    }

    let rescaled = normalized.with_scale(PRICE_SCALE);
    if rescaled.digits() > PRICE_MAX_INTEGER_DIGITS + PRICE_SCALE as u64 {
        return Err(invalid(&value));
    }

    Ok(rescaled)
}

fn cast_quantity(value: Value) -> Result<i32, RejectReason> {
    let parsed = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed
        .and_then(|q| i32::try_from(q).ok())
        .filter(|q| *q >= 1)
        .ok_or_else(|| RejectReason::InvalidQuantity {
            value: value.to_string(),
        })
}

fn optional_string(
    fields: &mut RawRecord,
    field: &'static str,
) -> Result<Option<String>, RejectReason> {
    match take(fields, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(RejectReason::WrongType {
            field,
            expected: "a string or null",
        }),
    }
}

/// Build the target row. Casting never clamps: any value that does not fit
/// rejects the record.
pub fn transform(
    valid: ValidRecord,
    ingestion_timestamp: DateTime<Utc>,
) -> Result<Event, RejectReason> {
    let ValidRecord {
        event_id,
        event_type,
        timestamp,
        mut fields,
    } = valid;

    let metadata = DeviceMetadata::from_value(fields.remove("metadata"));

    let price = take(&mut fields, "price")
        .ok_or(RejectReason::MissingField { field: "price" })
        .and_then(cast_price)?;
    let quantity = take(&mut fields, "quantity")
        .ok_or(RejectReason::MissingField { field: "quantity" })
        .and_then(cast_quantity)?;
    let discount_applied = match take(&mut fields, "discount_applied") {
        None => false,
        Some(Value::Bool(b)) => b,
        Some(_) => {
            return Err(RejectReason::WrongType {
                field: "discount_applied",
                expected: "a boolean",
            });
        }
    };

    Ok(Event {
        event_id,
        event_type,
        user_id: optional_string(&mut fields, "user_id")?,
        product_id: optional_string(&mut fields, "product_id")?,
        session_id: optional_string(&mut fields, "session_id")?,
        timestamp,
        ingestion_timestamp,
        device: metadata.device,
        browser: metadata.browser,
        location: metadata.location,
        price,
        quantity,
        discount_applied,
        product_category: optional_string(&mut fields, "product_category")?,
    })
}
