//! Validation at the mutation and deserialization boundaries.
//!
//! Local mutations go through [`clean_text`]; payloads read back from local
//! storage or the remote document go through the field readers below, which
//! either produce a well-typed value or reject the whole entity.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Maximum length of a list name, in characters.
pub const MAX_NAME_LENGTH: usize = 100;
/// Maximum length of todo and subtask text, in characters.
pub const MAX_TEXT_LENGTH: usize = 500;

/// Reasons an entity or an input value is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long: {len} characters (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {0} has the wrong type")]
    WrongType(&'static str),

    #[error("Field {field} is not a valid timestamp: {value}")]
    BadTimestamp { field: &'static str, value: String },

    #[error("Expected an object")]
    NotAnObject,
}

/// Trims user input and enforces the non-empty and length limits.
pub fn clean_text(field: &'static str, raw: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    check_text(field, trimmed, max)?;
    Ok(trimmed.to_string())
}

/// Checks stored text without altering it.
pub fn check_text(field: &'static str, text: &str, max: usize) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let len = text.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

// =============================================================================
// Field readers
// =============================================================================

/// Borrows the value as a JSON object.
pub(crate) fn as_object(value: &Value) -> Result<&Map<String, Value>, ValidationError> {
    value.as_object().ok_or(ValidationError::NotAnObject)
}

fn present<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

pub(crate) fn required_id(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<String, ValidationError> {
    let value = present(obj, field).ok_or(ValidationError::MissingField(field))?;
    let id = match value {
        Value::String(s) => s.clone(),
        // Older snapshots stored millisecond timestamps as ids.
        Value::Number(n) => n.to_string(),
        _ => return Err(ValidationError::WrongType(field)),
    };
    if id.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(id)
}

pub(crate) fn required_text(
    obj: &Map<String, Value>,
    field: &'static str,
    max: usize,
) -> Result<String, ValidationError> {
    let value = present(obj, field).ok_or(ValidationError::MissingField(field))?;
    let text = value.as_str().ok_or(ValidationError::WrongType(field))?;
    check_text(field, text, max)?;
    Ok(text.to_string())
}

pub(crate) fn required_bool(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<bool, ValidationError> {
    let value = present(obj, field).ok_or(ValidationError::MissingField(field))?;
    value.as_bool().ok_or(ValidationError::WrongType(field))
}

pub(crate) fn optional_bool(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<bool, ValidationError> {
    match present(obj, field) {
        Some(value) => value.as_bool().ok_or(ValidationError::WrongType(field)),
        None => Ok(false),
    }
}

/// Reads a non-negative order index. Fractional values are truncated.
pub(crate) fn required_order(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<u32, ValidationError> {
    let value = present(obj, field).ok_or(ValidationError::MissingField(field))?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).map_err(|_| ValidationError::WrongType(field));
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 => Ok(f as u32),
        _ => Err(ValidationError::WrongType(field)),
    }
}

pub(crate) fn required_timestamp(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<DateTime<Utc>, ValidationError> {
    let value = present(obj, field).ok_or(ValidationError::MissingField(field))?;
    parse_timestamp(field, value)
}

pub(crate) fn optional_timestamp(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    present(obj, field)
        .map(|value| parse_timestamp(field, value))
        .transpose()
}

fn parse_timestamp(field: &'static str, value: &Value) -> Result<DateTime<Utc>, ValidationError> {
    let raw = value.as_str().ok_or(ValidationError::WrongType(field))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::BadTimestamp {
            field,
            value: raw.to_string(),
        })
}

/// Reads an optional array; a missing or null field is an empty array.
///
/// Remote stores commonly drop empty arrays, so absence is not an error.
pub(crate) fn optional_array<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a [Value], ValidationError> {
    match present(obj, field) {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ValidationError::WrongType(field)),
        None => Ok(&[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_clean_text_trims() {
        assert_eq!(
            clean_text("text", "  buy milk ", MAX_TEXT_LENGTH).unwrap(),
            "buy milk"
        );
    }

    #[test]
    fn test_clean_text_rejects_blank() {
        assert_eq!(
            clean_text("name", "   ", MAX_NAME_LENGTH),
            Err(ValidationError::Empty { field: "name" })
        );
    }

    #[test]
    fn test_clean_text_rejects_oversized() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        let err = clean_text("name", &long, MAX_NAME_LENGTH).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { len: 101, .. }));
    }

    #[test]
    fn test_required_id_accepts_numeric_ids() {
        let o = obj(json!({"id": 1700000000000u64}));
        assert_eq!(required_id(&o, "id").unwrap(), "1700000000000");
    }

    #[test]
    fn test_required_id_missing() {
        let o = obj(json!({"id": null}));
        assert_eq!(
            required_id(&o, "id"),
            Err(ValidationError::MissingField("id"))
        );
    }

    #[test]
    fn test_required_order_truncates_fraction() {
        let o = obj(json!({"order": 2.7}));
        assert_eq!(required_order(&o, "order").unwrap(), 2);
    }

    #[test]
    fn test_required_order_rejects_negative() {
        let o = obj(json!({"order": -1}));
        assert_eq!(
            required_order(&o, "order"),
            Err(ValidationError::WrongType("order"))
        );
    }

    #[test]
    fn test_timestamp_parsing() {
        let o = obj(json!({"createdAt": "2024-03-01T10:00:00.000Z", "bad": "yesterday"}));
        assert!(required_timestamp(&o, "createdAt").is_ok());
        assert!(matches!(
            required_timestamp(&o, "bad"),
            Err(ValidationError::BadTimestamp { .. })
        ));
        assert_eq!(optional_timestamp(&o, "updatedAt").unwrap(), None);
    }

    #[test]
    fn test_optional_array_defaults_to_empty() {
        let o = obj(json!({"name": "x"}));
        assert!(optional_array(&o, "todos").unwrap().is_empty());

        let o = obj(json!({"todos": "nope"}));
        assert_eq!(
            optional_array(&o, "todos"),
            Err(ValidationError::WrongType("todos"))
        );
    }
}
