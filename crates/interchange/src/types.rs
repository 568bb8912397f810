//! Typed views of the records each resource returns.
//!
//! Every field except `id` is optional: the API omits columns freely and
//! older rows carry nulls. Numeric columns that the backend sometimes
//! serializes as strings (`"port": "8080"`) go through
//! [`lenient_i64`]. Timestamps stay as the RFC 3339 strings the API sends.
//!
//! Decode a [`crate::Record`] with [`crate::Record::decode`].

use serde::{Deserialize, Deserializer, Serialize};

/// Accept an integer, an integral float, a numeric string, or null.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept a number or a numeric string as a float.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept any scalar as a string. Numbers are rendered without quoting.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Accept `true`/`false`, `0`/`1`, or `"true"`/`"false"`.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::Number(n)) => n.as_i64().map(|v| v != 0),
        Some(serde_json::Value::String(s)) => match s.trim() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// A customer account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Customer {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    /// Human-facing account code ("CUST-0012"), distinct from `id`.
    #[serde(deserialize_with = "lenient_string")]
    pub customer_id: Option<String>,
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub service_plan: Option<String>,
    pub connected_tower: Option<String>,
    pub connection_type: Option<String>,
    pub plan_type: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub monthly_fee: Option<f64>,
    pub status: Option<String>,
    pub created_at: Option<String>,
}

/// A support ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    pub ticket_number: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub assigned_to: Option<i64>,
    pub issue_type: Option<String>,
    pub due_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// One camera in a customer's CCTV inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CctvRecord {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub customer_id: Option<i64>,
    /// Display serial; suggested as `len + 1` and never authoritative.
    #[serde(deserialize_with = "lenient_string")]
    pub serial_number: Option<String>,
    pub camera_ip: Option<String>,
    pub added_in: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub port: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub http_port: Option<i64>,
    pub model_no: Option<String>,
    pub location_name: Option<String>,
    pub uplink: Option<String>,
    pub rack_photo: Option<String>,
    pub nvr_camera_photo: Option<String>,
    pub device_serial_no: Option<String>,
    pub mac_address: Option<String>,
    pub created_at: Option<String>,
}

/// One workstation or server in a customer's asset inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemDetail {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub customer_id: Option<i64>,
    #[serde(deserialize_with = "lenient_string")]
    pub emp_id: Option<String>,
    pub emp_name: Option<String>,
    pub system_name: Option<String>,
    pub system_type: Option<String>,
    pub department: Option<String>,
    pub processor: Option<String>,
    pub ram: Option<String>,
    pub hard_disk: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub operating_system: Option<String>,
    pub created_at: Option<String>,
}

/// An internal complaint raised by an engineer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Complaint {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    pub complaint_id: Option<String>,
    pub engineer_name: Option<String>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub status_note: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_locked: Option<bool>,
    pub created_at: Option<String>,
}

/// A file attached to a customer account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub document_type: Option<String>,
    pub document_name: Option<String>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
}

/// An engineer's end-of-day field report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyReport {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    pub engineer_name: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub sites_visited: Option<i64>,
    pub work_done: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub sites_completed: Option<i64>,
    pub completed_sites_names: Option<String>,
    pub incomplete_sites_names: Option<String>,
    pub reason_not_done: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub has_issue: Option<bool>,
    pub issue_details: Option<String>,
    pub created_at: Option<String>,
}

/// A comment on a ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskComment {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub task_id: Option<i64>,
    pub comment: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: Option<String>,
}

impl TaskComment {
    /// The comment body; older rows store it under `message`.
    pub fn body(&self) -> Option<&str> {
        self.comment.as_deref().or(self.message.as_deref())
    }
}

/// One entry in a ticket's audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskHistoryEntry {
    #[serde(deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub task_id: Option<i64>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: Option<String>,
}

/// Summary returned by a CSV import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: u64,
    pub updated: u64,
    pub errors: u64,
    pub total: u64,
    pub error_details: Vec<String>,
}
