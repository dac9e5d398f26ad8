use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Where a record list may sit inside an upstream response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwrap {
    Field(&'static str),
    Bare,
}

pub const CONVERSATION_UNWRAP: &[Unwrap] = &[
    Unwrap::Field("data"),
    Unwrap::Field("items"),
    Unwrap::Field("conversations"),
    Unwrap::Bare,
];

pub const MESSAGE_UNWRAP: &[Unwrap] = &[
    Unwrap::Field("data"),
    Unwrap::Field("messages"),
    Unwrap::Field("items"),
    Unwrap::Bare,
];

/// First strategy that yields an array wins; anything else is an empty batch.
pub fn extract_records(body: &Value, strategies: &[Unwrap]) -> Vec<Value> {
    for strategy in strategies {
        let found = match strategy {
            Unwrap::Field(key) => body.get(*key).and_then(Value::as_array),
            Unwrap::Bare => body.as_array(),
        };
        if let Some(items) = found {
            return items.clone();
        }
    }
    Vec::new()
}

/// Non-empty trimmed string, accepting numbers for id-like fields.
pub fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn first_string(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(string_value)
}

pub fn first_bool(record: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(Value::as_bool)
}

const SECONDS_CUTOFF: f64 = 1e12;

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() < SECONDS_CUTOFF {
        (value * 1000.0).round() as i64
    } else {
        value.round() as i64
    };
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Small integers are epoch seconds, large ones epoch milliseconds, strings
/// are numbers or dates.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(n) = s.parse::<f64>() {
                return from_epoch(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

pub fn first_timestamp(record: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(parse_timestamp)
}
