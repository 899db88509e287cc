//! Normalization of raw open-data payloads into storage-ready records.
//!
//! Each submodule maps one upstream payload shape to its canonical record
//! type. Field-level noise (a bad numeric string, a missing optional
//! sub-element) is defaulted or dropped in place; a malformed entity is
//! skipped with a warning so its siblings still go through. Only missing
//! top-level structure surfaces as an [`ExtractError`].

pub mod air_quality;
pub mod astronomy;
pub mod description;
pub mod forecast;
pub mod grid;
pub mod observation;
pub mod uv;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_json::Value;
use thiserror::Error;

/// Structural failure: the payload is missing nesting the extractor
/// cannot work without. Fatal for the whole normalization call.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("expected key '{0}' missing from payload, upstream schema may have changed")]
    MissingKey(&'static str),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Upstream timestamps without an explicit offset are Taiwan local time.
pub(crate) fn taipei() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("UTC+8 is a valid offset")
}

/// Parses an upstream time token into a unix timestamp.
///
/// Accepts RFC 3339 (`2025-01-01T12:00:00+08:00`) and the bare local form
/// the forecast feeds use after their offset suffix is dropped.
pub(crate) fn local_timestamp(s: &str) -> Option<f64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp() as f64);
    }
    let trimmed = s.trim_end_matches("+08:00");
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").ok()?;
    Some(naive.and_local_timezone(taipei()).single()?.timestamp() as f64)
}

/// Reads a JSON value as f64, tolerating numeric strings.
pub(crate) fn value_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a JSON value as i64, tolerating numeric strings.
pub(crate) fn value_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a JSON value as an owned string.
pub(crate) fn value_string(v: &Value) -> Option<String> {
    v.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_timestamp_with_offset() {
        // 2025-01-01T08:00:00+08:00 == 2025-01-01T00:00:00Z
        assert_eq!(
            local_timestamp("2025-01-01T08:00:00+08:00"),
            Some(1735689600.0)
        );
    }

    #[test]
    fn test_local_timestamp_bare_is_taiwan_local() {
        assert_eq!(local_timestamp("2025-01-01T08:00:00"), Some(1735689600.0));
    }

    #[test]
    fn test_local_timestamp_rejects_garbage() {
        assert_eq!(local_timestamp("not a time"), None);
    }

    #[test]
    fn test_value_f64_accepts_numeric_strings() {
        assert_eq!(value_f64(&json!(25.5)), Some(25.5));
        assert_eq!(value_f64(&json!("25.5")), Some(25.5));
        assert_eq!(value_f64(&json!("--")), None);
        assert_eq!(value_f64(&json!(null)), None);
    }

    #[test]
    fn test_value_i64_accepts_numeric_strings() {
        assert_eq!(value_i64(&json!("-99")), Some(-99));
        assert_eq!(value_i64(&json!(7)), Some(7));
        assert_eq!(value_i64(&json!("seven")), None);
    }
}
