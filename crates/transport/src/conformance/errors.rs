use std::future::Future;

use serde_json::json;

use super::{expect_status, send, TestResult};
use crate::{ApiRequest, ApiTransport};

pub(super) async fn run_error_tests<T, F, Fut>(factory: &F) -> Vec<TestResult>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    vec![
        TestResult::from_result(
            "error",
            "update_missing_id_is_404_with_message",
            update_missing_id_is_404_with_message(factory).await,
        ),
        TestResult::from_result(
            "error",
            "delete_missing_id_is_404",
            delete_missing_id_is_404(factory).await,
        ),
        TestResult::from_result(
            "error",
            "create_without_required_field_is_400_with_message",
            create_without_required_field_is_400_with_message(factory).await,
        ),
        TestResult::from_result(
            "error",
            "comment_on_missing_task_is_404",
            comment_on_missing_task_is_404(factory).await,
        ),
    ]
}

async fn update_missing_id_is_404_with_message<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(
        &t,
        ApiRequest::put("/api/tasks/42", json!({"status": "completed"})),
    )
    .await?;
    expect_status(&response, &[404], "update missing task")?;
    match response.error_message() {
        Some(_) => Ok(()),
        None => Err(format!(
            "404 body carries no message: {}",
            response.body_text()
        )),
    }
}

async fn delete_missing_id_is_404<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(
        &t,
        ApiRequest::delete("/api/customer-portal/cctv-information/999"),
    )
    .await?;
    expect_status(&response, &[404], "delete missing CCTV record")
}

async fn create_without_required_field_is_400_with_message<T, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(&t, ApiRequest::post("/api/tasks", json!({"priority": "high"}))).await?;
    expect_status(&response, &[400, 422], "create task without title")?;
    match response.error_message() {
        Some(_) => Ok(()),
        None => Err(format!(
            "validation body carries no message: {}",
            response.body_text()
        )),
    }
}

async fn comment_on_missing_task_is_404<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let response = send(
        &t,
        ApiRequest::post(
            "/api/customer/comments",
            json!({"taskId": 777, "comment": "hello?"}),
        ),
    )
    .await?;
    expect_status(&response, &[404], "comment on missing task")
}
