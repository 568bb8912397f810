use std::future::Future;

use serde_json::json;

use super::{create, expect_status, json_of, list, send, TestResult};
use crate::{ApiRequest, ApiTransport, MultipartForm, RequestBody};

pub(super) async fn run_transfer_tests<T, F, Fut>(factory: &F) -> Vec<TestResult>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    vec![
        TestResult::from_result(
            "transfer",
            "export_is_csv_attachment",
            export_is_csv_attachment(factory).await,
        ),
        TestResult::from_result(
            "transfer",
            "import_reports_summary",
            import_reports_summary(factory).await,
        ),
        TestResult::from_result(
            "transfer",
            "bulk_cctv_upload_creates_rows",
            bulk_cctv_upload_creates_rows(factory).await,
        ),
    ]
}

async fn export_is_csv_attachment<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    create(&t, "/api/customers", json!({"name": "Acme, Inc."})).await?;
    let response = send(&t, ApiRequest::get("/api/customers/export")).await?;
    expect_status(&response, &[200], "export customers")?;
    let disposition = response.header("content-disposition").unwrap_or_default();
    if !disposition.contains("filename=") {
        return Err(format!("no filename in content-disposition '{}'", disposition));
    }
    let text = response.body_text();
    if !text.contains("\"Acme, Inc.\"") {
        return Err(format!("exported CSV does not quote the name: {}", text));
    }
    Ok(())
}

async fn import_reports_summary<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let csv = "Customer ID,Name,City\nC-1,Acme,Springfield\nC-2,,Shelbyville\n";
    let form = MultipartForm::new().file("file", "customers.csv", "text/csv", csv.into());
    let response = send(
        &t,
        ApiRequest::new(crate::Method::Post, "/api/customers/import")
            .with_body(RequestBody::Multipart(form)),
    )
    .await?;
    expect_status(&response, &[200], "import customers")?;
    let summary = json_of(&response, "import response")?;
    let count = |key: &str| summary.get(key).and_then(|v| v.as_u64()).unwrap_or(u64::MAX);
    if count("imported") != 1 || count("errors") != 1 || count("total") != 2 {
        return Err(format!("unexpected import summary {}", summary));
    }
    let rows = list(&t, ApiRequest::get("/api/customers")).await?;
    if rows.len() == 1 {
        Ok(())
    } else {
        Err(format!("expected 1 imported customer, found {}", rows.len()))
    }
}

async fn bulk_cctv_upload_creates_rows<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(
        &t,
        ApiRequest::post(
            "/api/customer-portal/cctv-information/bulk-upload",
            json!({"data": [
                {"serialNumber": "1", "cameraIp": "10.0.0.1"},
                {"serialNumber": "2", "cameraIp": "10.0.0.2"}
            ]}),
        ),
    )
    .await?;
    expect_status(&response, &[200, 201], "bulk upload")?;
    let rows = list(&t, ApiRequest::get("/api/customer-portal/cctv-information")).await?;
    if rows.len() == 2 {
        Ok(())
    } else {
        Err(format!("expected 2 CCTV rows after bulk upload, found {}", rows.len()))
    }
}
