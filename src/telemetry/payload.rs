//! # Telemetry Payload Decoder
//!
//! Decodes inbound JSON telemetry objects into [`Reading`]s.
//!
//! Expected shape (unknown fields ignored):
//!
//! ```text
//! { "heart_rate": 72, "timestamp": "2024-05-01T10:30:15.123456" | 1714559415123,
//!   "device_type": "heartRateBand", "device_id": "COOSPO",
//!   "rr_intervals": [820.31], "latitude": 45.46, "longitude": 9.19 }
//! ```

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::sample::{DeviceType, GeoPosition, Reading};
use crate::error::{PulseError, Result};

/// Naive timestamp layouts accepted after RFC 3339 fails (interpreted as UTC)
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Parse raw frame text as JSON
///
/// # Errors
///
/// Returns `PulseError::Payload` if the text is not JSON
pub fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| PulseError::Payload(format!("Invalid JSON: {}", e)))
}

/// Decode an already-parsed JSON value into a reading
///
/// # Arguments
///
/// * `value` - Parsed telemetry object
/// * `received_at` - Arrival time, used when the payload carries no timestamp
///
/// # Errors
///
/// Returns `PulseError::Payload` if:
/// - The value is not a JSON object
/// - `heart_rate` is missing, `null`, or not an integral number
/// - `timestamp` is present but cannot be interpreted
///
/// A zero or negative `heart_rate` is *not* an error here; it decodes and is
/// rejected later as "no reading".
pub fn decode_reading(value: &Value, received_at: DateTime<Utc>) -> Result<Reading> {
    let object = value.as_object().ok_or_else(|| {
        PulseError::Payload(format!("Expected JSON object, got {}", json_kind(value)))
    })?;

    let heart_rate = decode_heart_rate(object)?;
    let timestamp = match object.get("timestamp") {
        None | Some(Value::Null) => received_at,
        Some(raw) => decode_timestamp(raw)?,
    };

    let device_type = object
        .get("device_type")
        .and_then(Value::as_str)
        .map(DeviceType::from_wire)
        .unwrap_or(DeviceType::Unknown);

    let device_id = object
        .get("device_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    // Non-numeric entries are skipped rather than failing the whole reading
    let rr_intervals = object
        .get("rr_intervals")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_f64).filter(|v| v.is_finite()).collect())
        .unwrap_or_default();

    let position = match (
        object.get("latitude").and_then(Value::as_f64),
        object.get("longitude").and_then(Value::as_f64),
    ) {
        (Some(lat), Some(lon)) => GeoPosition::new(lat, lon),
        _ => None,
    };

    Ok(Reading {
        heart_rate,
        timestamp,
        device_type,
        device_id,
        rr_intervals,
        position,
    })
}

fn decode_heart_rate(object: &Map<String, Value>) -> Result<i64> {
    let raw = match object.get("heart_rate") {
        None | Some(Value::Null) => {
            return Err(PulseError::Payload("Missing field: heart_rate".to_string()));
        }
        Some(raw) => raw,
    };

    if let Some(v) = raw.as_i64() {
        return Ok(v);
    }

    // Accept 72.0 but not 72.5 or huge values
    match raw.as_f64() {
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() <= i64::MAX as f64 => Ok(v as i64),
        Some(v) => Err(PulseError::Payload(format!(
            "heart_rate must be an integer, got {}",
            v
        ))),
        None => Err(PulseError::Payload(format!(
            "heart_rate must be a number, got {}",
            json_kind(raw)
        ))),
    }
}

/// Interpret a timestamp given as epoch milliseconds or as an ISO-8601 string
fn decode_timestamp(raw: &Value) -> Result<DateTime<Utc>> {
    match raw {
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .ok_or_else(|| PulseError::Payload(format!("Invalid epoch timestamp: {}", n)))?;

            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| {
                    PulseError::Payload(format!("Epoch timestamp out of range: {}", millis))
                })
        }
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }

            NAIVE_TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(|| PulseError::Payload(format!("Unrecognised timestamp: {:?}", s)))
        }
        other => Err(PulseError::Payload(format!(
            "timestamp must be a string or number, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
