use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::deserialize::{json_kind, normalize_record, to_camel_case, InterchangeError};

/// One flat record as returned by the API, with snake_case field names.
///
/// Records are deliberately untyped: each resource carries dozens of
/// optional columns and the client only needs a handful of them (id,
/// parent ids, searchable text). Typed views are available through
/// [`Record::decode`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(serde_json::Map<String, serde_json::Value>);

impl Record {
    /// Build a record from a map whose keys are already canonical.
    pub(crate) fn from_canonical(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Record(fields)
    }

    /// Normalize an arbitrary JSON object (either naming convention).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, InterchangeError> {
        normalize_record(value)
    }

    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set a field, converting the name to snake_case first.
    pub fn set(&mut self, field: &str, value: serde_json::Value) {
        self.0
            .insert(crate::deserialize::to_snake_case(field), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<serde_json::Value> {
        self.0.remove(field)
    }

    /// Server-assigned integer id, if present.
    pub fn id(&self) -> Option<i64> {
        self.i64_field("id")
    }

    /// Read a field as a string slice. Empty strings count as absent.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Read a field as an integer, accepting numeric strings (`"42"`).
    pub fn i64_field(&self, field: &str) -> Option<i64> {
        match self.0.get(field)? {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Render a field for display or text matching. Null and missing
    /// fields render as `None`; scalars render without JSON quoting.
    pub fn display_field(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Overlay every field of `patch` onto this record.
    pub fn overlay(&mut self, patch: &Record) {
        for (k, v) in &patch.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Require a non-empty field, for client-side create validation.
    pub fn require(&self, field: &str) -> Result<&serde_json::Value, InterchangeError> {
        match self.0.get(field) {
            None | Some(serde_json::Value::Null) => Err(InterchangeError::MissingField {
                field: field.to_string(),
            }),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
                Err(InterchangeError::MissingField {
                    field: field.to_string(),
                })
            }
            Some(v) => Ok(v),
        }
    }

    /// Outbound JSON with camelCase field names, the convention the API
    /// accepts on request bodies.
    pub fn to_wire(&self) -> serde_json::Value {
        let map = self
            .0
            .iter()
            .map(|(k, v)| (to_camel_case(k), v.clone()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Decode into one of the typed entities in [`crate::types`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, InterchangeError> {
        serde_json::from_value(serde_json::Value::Object(self.0.clone())).map_err(|e| {
            InterchangeError::Decode {
                entity: std::any::type_name::<T>()
                    .rsplit("::")
                    .next()
                    .unwrap_or("record")
                    .to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl TryFrom<serde_json::Value> for Record {
    type Error = InterchangeError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        if !value.is_object() {
            return Err(InterchangeError::NotAnObject {
                found: json_kind(&value),
            });
        }
        normalize_record(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_accepts_numeric_strings() {
        let r = Record::from_json(&json!({"id": "42"})).unwrap();
        assert_eq!(r.id(), Some(42));
        let r = Record::from_json(&json!({"id": 42.0})).unwrap();
        assert_eq!(r.id(), Some(42));
        let r = Record::from_json(&json!({"id": "T-42"})).unwrap();
        assert_eq!(r.id(), None);
    }

    #[test]
    fn overlay_replaces_fields() {
        let mut r = Record::from_json(&json!({"id": 1, "status": "pending", "title": "x"})).unwrap();
        let patch = Record::from_json(&json!({"status": "completed"})).unwrap();
        r.overlay(&patch);
        assert_eq!(r.str_field("status"), Some("completed"));
        assert_eq!(r.str_field("title"), Some("x"));
    }

    #[test]
    fn to_wire_uses_camel_case() {
        let r = Record::from_json(&json!({"system_name": "PC-1", "emp_id": "E7"})).unwrap();
        assert_eq!(r.to_wire(), json!({"systemName": "PC-1", "empId": "E7"}));
    }

    #[test]
    fn require_rejects_blank() {
        let r = Record::from_json(&json!({"title": "  ", "priority": null})).unwrap();
        assert!(r.require("title").is_err());
        assert!(r.require("priority").is_err());
        assert!(r.require("missing").is_err());
    }

    #[test]
    fn display_field_renders_scalars() {
        let r = Record::from_json(&json!({"port": 8080, "name": "A", "ok": true, "x": null}))
            .unwrap();
        assert_eq!(r.display_field("port").as_deref(), Some("8080"));
        assert_eq!(r.display_field("name").as_deref(), Some("A"));
        assert_eq!(r.display_field("ok").as_deref(), Some("true"));
        assert_eq!(r.display_field("x"), None);
    }
}
