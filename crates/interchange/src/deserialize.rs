//! Boundary normalization from wire JSON into canonical records.
//!
//! The main entry points are [`normalize_record`] for a single object and
//! [`normalize_collection`] for a list response.

use crate::record::Record;
use std::fmt;

/// Errors while turning wire JSON into records or typed entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    /// A record was expected but the value is not a JSON object.
    NotAnObject { found: String },
    /// A collection response was not a JSON array.
    NotACollection { found: String },
    /// A record is missing a field the caller requires.
    MissingField { field: String },
    /// A record could not be decoded into a typed entity.
    Decode { entity: String, message: String },
}

impl fmt::Display for InterchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeError::NotAnObject { found } => {
                write!(f, "expected a JSON object, found {}", found)
            }
            InterchangeError::NotACollection { found } => {
                write!(f, "expected a JSON array, found {}", found)
            }
            InterchangeError::MissingField { field } => {
                write!(f, "record missing required field: '{}'", field)
            }
            InterchangeError::Decode { entity, message } => {
                write!(f, "could not decode {}: {}", entity, message)
            }
        }
    }
}

impl std::error::Error for InterchangeError {}

/// Short human label for a JSON value's type, used in error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_string()
}

/// Normalize one wire object into a [`Record`] with snake_case field names.
///
/// When a field arrives under both spellings (`customer_id` and
/// `customerId`), the snake_case spelling is read first and a later
/// non-null value only replaces a null one.
pub fn normalize_record(value: &serde_json::Value) -> Result<Record, InterchangeError> {
    let obj = value.as_object().ok_or_else(|| InterchangeError::NotAnObject {
        found: json_kind(value),
    })?;

    let mut fields = serde_json::Map::with_capacity(obj.len());

    // Keys already in canonical form win ties, so place them first.
    let (canonical, other): (Vec<_>, Vec<_>) = obj
        .iter()
        .partition(|(k, _)| to_snake_case(k) == k.as_str());

    for (key, v) in canonical.into_iter().chain(other) {
        let name = to_snake_case(key);
        match fields.get(&name) {
            Some(existing) if !existing.is_null() => {}
            Some(_) if v.is_null() => {}
            _ => {
                fields.insert(name, v.clone());
            }
        }
    }

    Ok(Record::from_canonical(fields))
}

/// Normalize a list response into records.
///
/// A `null` body is treated as an empty collection; some endpoints answer
/// that way when a customer has no rows yet.
pub fn normalize_collection(value: &serde_json::Value) -> Result<Vec<Record>, InterchangeError> {
    match value {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::Array(items) => items.iter().map(normalize_record).collect(),
        other => Err(InterchangeError::NotACollection {
            found: json_kind(other),
        }),
    }
}

/// Convert a field name to snake_case.
///
/// `customerId` → `customer_id`, `httpPort` → `http_port`,
/// `nvrCameraPhoto` → `nvr_camera_photo`, `HTTPPort` → `http_port`.
/// Hyphens and spaces become underscores.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch == '-' || ch == ' ' {
            if !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if ch.is_ascii_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Convert a snake_case field name to camelCase.
///
/// Names without underscores are returned unchanged.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
