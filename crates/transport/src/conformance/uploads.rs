use std::future::Future;

use serde_json::json;

use super::{create, expect_status, id_of, json_of, list, send, TestResult};
use crate::{ApiRequest, ApiTransport};

/// "hello" as a PNG data URL; the server checks the encoding, not the image.
const PNG_DATA_URL: &str = "data:image/png;base64,aGVsbG8=";

pub(super) async fn run_upload_tests<T, F, Fut>(factory: &F) -> Vec<TestResult>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    vec![
        TestResult::from_result(
            "uploads",
            "cctv_image_returns_image_url",
            cctv_image_returns_image_url(factory).await,
        ),
        TestResult::from_result(
            "uploads",
            "cctv_image_rejects_non_image",
            cctv_image_rejects_non_image(factory).await,
        ),
        TestResult::from_result(
            "uploads",
            "task_attachment_returns_file_and_logs_history",
            task_attachment_returns_file_and_logs_history(factory).await,
        ),
        TestResult::from_result(
            "uploads",
            "profile_photo_returns_url",
            profile_photo_returns_url(factory).await,
        ),
    ]
}

async fn cctv_image_returns_image_url<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(
        &t,
        ApiRequest::post(
            "/api/customer-portal/cctv-upload-image",
            json!({"imageData": PNG_DATA_URL, "imageType": "rack", "fileName": "rack.png"}),
        ),
    )
    .await?;
    expect_status(&response, &[200, 201], "cctv image upload")?;
    let body = json_of(&response, "upload response")?;
    match body.get("imageUrl").and_then(|v| v.as_str()) {
        Some(url) if !url.is_empty() => Ok(()),
        _ => Err(format!("no imageUrl in {}", body)),
    }
}

async fn cctv_image_rejects_non_image<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(
        &t,
        ApiRequest::post(
            "/api/customer-portal/cctv-upload-image",
            json!({"imageData": "data:application/pdf;base64,aGVsbG8=", "fileName": "x.pdf"}),
        ),
    )
    .await?;
    expect_status(&response, &[400, 415, 422], "non-image cctv upload")
}

async fn task_attachment_returns_file_and_logs_history<T, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let task = id_of(&create(&t, "/api/tasks", json!({"title": "Site photos"})).await?)?;
    let before = list(&t, ApiRequest::get(format!("/api/tasks/{}/history", task))).await?;
    let response = send(
        &t,
        ApiRequest::post(
            format!("/api/tasks/{}/upload", task),
            json!({
                "files": [{"name": "site.png", "type": "image/png", "data": PNG_DATA_URL}],
                "notes": "before/after"
            }),
        ),
    )
    .await?;
    expect_status(&response, &[200, 201], "task attachment upload")?;
    let body = json_of(&response, "upload response")?;
    let first = body
        .get("files")
        .and_then(|v| v.as_array())
        .and_then(|files| files.first())
        .cloned();
    if first.is_none() {
        return Err(format!("no files[0] in {}", body));
    }
    let after = list(&t, ApiRequest::get(format!("/api/tasks/{}/history", task))).await?;
    if after.len() > before.len() {
        Ok(())
    } else {
        Err("attachment upload did not add a history entry".to_string())
    }
}

async fn profile_photo_returns_url<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(
        &t,
        ApiRequest::post("/api/profile/photo", json!({"photoData": PNG_DATA_URL})),
    )
    .await?;
    expect_status(&response, &[200, 201], "profile photo upload")?;
    let body = json_of(&response, "upload response")?;
    match body.get("profileImageUrl").and_then(|v| v.as_str()) {
        Some(url) if !url.is_empty() => Ok(()),
        _ => Err(format!("no profileImageUrl in {}", body)),
    }
}
