use chrono::{
    DateTime,
    TimeZone,
    Utc,
};
use serde_json::Value;

/// Unix values at or above this are read as milliseconds rather than seconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Reads a persisted timestamp. Accepts unix seconds, unix milliseconds, or
/// an RFC 3339 string. `None` means the value is present but unusable.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if raw.abs() >= MILLIS_THRESHOLD {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        Value::String(s) => {
            if let Ok(raw) = s.trim().parse::<i64>() {
                return parse_timestamp(&Value::from(raw));
            }
            DateTime::parse_from_rfc3339(s.trim()).ok().map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Escapes glob metacharacters so a filename can be passed as an exact
/// `getMediaFilesNames` pattern.
pub fn escape_glob(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '*' | '?' | '[' | ']' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
