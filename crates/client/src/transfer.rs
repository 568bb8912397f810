//! CSV export/import and bulk creation.

use std::path::Path;

use fieldops_interchange::{
    normalize_collection, ImportSummary, InterchangeError, Record, ResourceKind,
};
use fieldops_transport::{ApiRequest, Method, MultipartForm, RequestBody};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::FieldOpsClient;
use crate::error::ClientError;
use crate::invalidation::InvalidationPlan;
use crate::notify::Notification;

/// A downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a bulk create.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkCreated {
    pub count: usize,
    pub records: Vec<Record>,
}

/// Base path of the CSV endpoints for resources that have them.
fn csv_base(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Customers => Some("/api/customers"),
        _ => None,
    }
}

/// The `filename` parameter of a `Content-Disposition` header.
pub fn disposition_file_name(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|param| {
        let value = param.strip_prefix("filename=")?;
        let value = value.trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// `<resource>-export-YYYY-MM-DD.csv` for today's UTC date.
pub fn default_export_name(kind: ResourceKind) -> String {
    let date = time::OffsetDateTime::now_utc().date();
    let format = time::macros::format_description!("[year]-[month]-[day]");
    let date = date
        .format(&format)
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{}-export-{}.csv", kind.name().replace('_', "-"), date)
}

impl FieldOpsClient {
    /// Download every record of `kind` as CSV.
    pub async fn export(&self, kind: ResourceKind) -> Result<ExportFile, ClientError> {
        let base = csv_base(kind).ok_or_else(|| ClientError::unsupported(kind, "export"))?;
        let file = self
            .download(kind, format!("{}/export", base), || default_export_name(kind))
            .await?;
        info!(resource = %kind, file = %file.file_name, bytes = file.bytes.len(), "exported");
        Ok(file)
    }

    /// Download the CSV template the import endpoint expects.
    pub async fn import_template(&self, kind: ResourceKind) -> Result<ExportFile, ClientError> {
        let base = csv_base(kind).ok_or_else(|| ClientError::unsupported(kind, "import"))?;
        self.download(kind, format!("{}/import-template", base), || {
            format!("{}-import-template.csv", kind.name().replace('_', "-"))
        })
        .await
    }

    async fn download(
        &self,
        kind: ResourceKind,
        path: String,
        fallback: impl FnOnce() -> String,
    ) -> Result<ExportFile, ClientError> {
        let spec = kind.spec();
        let response = self
            .send_classified(spec, ApiRequest::get(path), None)
            .await
            .map_err(|e| self.transfer_failed(kind, "export", e))?;
        let file_name = response
            .header("content-disposition")
            .and_then(disposition_file_name)
            .unwrap_or_else(fallback);
        Ok(ExportFile {
            file_name,
            bytes: response.body,
        })
    }

    /// Upload a CSV file to the import endpoint.
    pub async fn import(
        &self,
        kind: ResourceKind,
        path: &Path,
    ) -> Result<ImportSummary, ClientError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = ClientError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                };
                return Err(self.transfer_failed(kind, "import", err));
            }
        };
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("import.csv");
        self.import_bytes(kind, file_name, bytes).await
    }

    pub async fn import_bytes(
        &self,
        kind: ResourceKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ImportSummary, ClientError> {
        let result = self.try_import(kind, file_name, bytes).await;
        let summary = result.map_err(|e| self.transfer_failed(kind, "import", e))?;
        info!(
            resource = %kind,
            imported = summary.imported,
            updated = summary.updated,
            errors = summary.errors,
            "imported"
        );
        self.notify(Notification::success(
            "Import complete",
            format!(
                "{} imported, {} updated, {} failed",
                summary.imported, summary.updated, summary.errors
            ),
        ));
        Ok(summary)
    }

    async fn try_import(
        &self,
        kind: ResourceKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ImportSummary, ClientError> {
        let base = csv_base(kind).ok_or_else(|| ClientError::unsupported(kind, "import"))?;
        let form = MultipartForm::new().file("file", file_name, "text/csv", bytes);
        let request = ApiRequest::new(Method::Post, format!("{}/import", base))
            .with_body(RequestBody::Multipart(form));
        let response = self.send_classified(kind.spec(), request, None).await?;
        let summary: ImportSummary = serde_json::from_value(response.body_json()?).map_err(|e| {
            InterchangeError::Decode {
                entity: "ImportSummary".to_string(),
                message: e.to_string(),
            }
        })?;
        self.apply(InvalidationPlan::whole_resource(kind)).await;
        Ok(summary)
    }

    /// Create many CCTV records in one request.
    pub async fn bulk_create_cctv(&self, rows: &[Value]) -> Result<BulkCreated, ClientError> {
        let kind = ResourceKind::CctvRecords;
        let result = self.try_bulk_create(rows).await;
        let created = result.map_err(|e| self.transfer_failed(kind, "bulk upload", e))?;
        info!(resource = %kind, count = created.count, "bulk created");
        self.notify(Notification::success(
            "Bulk upload complete",
            format!("{} records uploaded", created.count),
        ));
        Ok(created)
    }

    async fn try_bulk_create(&self, rows: &[Value]) -> Result<BulkCreated, ClientError> {
        let kind = ResourceKind::CctvRecords;
        if rows.is_empty() {
            return Err(ClientError::Validation {
                message: "no rows to upload".to_string(),
            });
        }
        let mut wire = Vec::with_capacity(rows.len());
        for row in rows {
            wire.push(Record::from_json(row)?.to_wire());
        }
        let request = ApiRequest::post(
            "/api/customer-portal/cctv-information/bulk-upload",
            json!({ "data": wire }),
        );
        let response = self.send_classified(kind.spec(), request, None).await?;
        let body = response.body_json()?;
        let records = match body.get("records") {
            Some(records) => normalize_collection(records)?,
            None => Vec::new(),
        };
        let count = body
            .get("count")
            .and_then(Value::as_u64)
            .map_or(records.len(), |c| c as usize);

        let touched: Vec<&Record> = records.iter().collect();
        self.apply(InvalidationPlan::for_mutation(kind, &touched))
            .await;
        Ok(BulkCreated { count, records })
    }

    fn transfer_failed(&self, kind: ResourceKind, what: &str, err: ClientError) -> ClientError {
        warn!(resource = %kind, operation = what, error = %err, "transfer failed");
        let title = match &err {
            ClientError::Unauthorized { .. } => "Unauthorized".to_string(),
            _ => format!("Failed to {} {}", what, kind.name().replace('_', " ")),
        };
        self.notify(Notification::error(title, err.to_string()));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_parsing() {
        assert_eq!(
            disposition_file_name("attachment; filename=\"customers-export-2026-01-02.csv\"")
                .as_deref(),
            Some("customers-export-2026-01-02.csv")
        );
        assert_eq!(
            disposition_file_name("attachment; filename=a.csv").as_deref(),
            Some("a.csv")
        );
        assert_eq!(disposition_file_name("attachment"), None);
        assert_eq!(disposition_file_name("attachment; filename=\"\""), None);
    }

    #[test]
    fn default_name_has_iso_date() {
        let name = default_export_name(ResourceKind::Customers);
        assert!(name.starts_with("customers-export-"));
        assert!(name.ends_with(".csv"));
        // customers-export-YYYY-MM-DD.csv
        assert_eq!(name.len(), "customers-export-".len() + 10 + 4);
    }
}
