use std::future::Future;
use std::sync::{Arc, Mutex};

use serde_json::json;

use super::{expect_status, TestResult};
use crate::{ApiRequest, ApiTransport, CancelToken, SendOptions, TransportError};

pub(super) async fn run_progress_tests<T, F, Fut>(factory: &F) -> Vec<TestResult>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    vec![
        TestResult::from_result(
            "progress",
            "send_progress_is_monotonic_and_complete",
            send_progress_is_monotonic_and_complete(factory).await,
        ),
        TestResult::from_result(
            "progress",
            "cancelled_send_fails_with_cancelled",
            cancelled_send_fails_with_cancelled(factory).await,
        ),
    ]
}

async fn send_progress_is_monotonic_and_complete<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let options = SendOptions::default().with_progress(Arc::new(move |sent, total| {
        sink.lock().unwrap_or_else(|e| e.into_inner()).push((sent, total));
    }));
    let payload = "x".repeat(300 * 1024);
    let response = t
        .send_with(
            ApiRequest::post("/api/tasks", json!({"title": "Big", "description": payload})),
            options,
        )
        .await
        .map_err(|e| format!("transport error: {}", e))?;
    expect_status(&response, &[200, 201], "create with large body")?;

    let seen = seen.lock().unwrap_or_else(|e| e.into_inner()).clone();
    let Some(&(last, total)) = seen.last() else {
        return Err("no progress reported".to_string());
    };
    if last != total {
        return Err(format!("final progress {} of {}", last, total));
    }
    if seen.windows(2).any(|w| w[1].0 < w[0].0) {
        return Err(format!("progress went backwards: {:?}", seen));
    }
    Ok(())
}

async fn cancelled_send_fails_with_cancelled<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = t
        .send_with(
            ApiRequest::post("/api/tasks", json!({"title": "never"})),
            SendOptions::default().with_cancel(cancel),
        )
        .await;
    match result {
        Err(TransportError::Cancelled) => Ok(()),
        other => Err(format!("expected Cancelled, got {:?}", other)),
    }
}
