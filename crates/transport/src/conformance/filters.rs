use std::future::Future;

use serde_json::json;

use super::{create, field, id_of, list, TestResult};
use crate::{ApiRequest, ApiTransport};

pub(super) async fn run_filter_tests<T, F, Fut>(factory: &F) -> Vec<TestResult>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    vec![
        TestResult::from_result(
            "filters",
            "search_narrows_tasks",
            search_narrows_tasks(factory).await,
        ),
        TestResult::from_result(
            "filters",
            "status_filter_is_exact",
            status_filter_is_exact(factory).await,
        ),
        TestResult::from_result(
            "filters",
            "customer_scope_lists_only_that_customer",
            customer_scope_lists_only_that_customer(factory).await,
        ),
        TestResult::from_result(
            "filters",
            "task_scope_lists_comments_of_that_task",
            task_scope_lists_comments_of_that_task(factory).await,
        ),
        TestResult::from_result(
            "filters",
            "mine_scope_includes_own_complaints",
            mine_scope_includes_own_complaints(factory).await,
        ),
    ]
}

fn titles(rows: &[serde_json::Value]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.get("title").and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

async fn search_narrows_tasks<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    create(&t, "/api/tasks", json!({"title": "Printer issue"})).await?;
    create(&t, "/api/tasks", json!({"title": "Fiber cut"})).await?;
    let rows = list(&t, ApiRequest::get("/api/tasks").with_query("search", "printer")).await?;
    let found = titles(&rows);
    if found == vec!["Printer issue".to_string()] {
        Ok(())
    } else {
        Err(format!("search=printer returned {:?}", found))
    }
}

async fn status_filter_is_exact<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    create(&t, "/api/tasks", json!({"title": "A", "status": "pending"})).await?;
    create(&t, "/api/tasks", json!({"title": "B", "status": "completed"})).await?;
    let pending = list(&t, ApiRequest::get("/api/tasks").with_query("status", "pending")).await?;
    let completed =
        list(&t, ApiRequest::get("/api/tasks").with_query("status", "completed")).await?;
    if titles(&pending) != vec!["A".to_string()] {
        return Err(format!("status=pending returned {:?}", titles(&pending)));
    }
    if titles(&completed) != vec!["B".to_string()] {
        return Err(format!("status=completed returned {:?}", titles(&completed)));
    }
    Ok(())
}

async fn customer_scope_lists_only_that_customer<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let a = id_of(&create(&t, "/api/customers", json!({"name": "A"})).await?)?;
    let b = id_of(&create(&t, "/api/customers", json!({"name": "B"})).await?)?;
    for (customer, ip) in [(a, "10.0.0.1"), (a, "10.0.0.2"), (b, "10.0.1.1")] {
        create(
            &t,
            "/api/customer-portal/cctv-information",
            json!({"customerId": customer, "cameraIp": ip}),
        )
        .await?;
    }
    let rows = list(
        &t,
        ApiRequest::get(format!("/api/customers/{}/cctv-information", a)),
    )
    .await?;
    let all_for_a = rows.iter().all(|r| {
        field(r, "customerId", "customer_id").and_then(|v| v.as_i64()) == Some(a)
    });
    if rows.len() == 2 && all_for_a {
        Ok(())
    } else {
        Err(format!("customer {} scope returned {:?}", a, rows))
    }
}

async fn task_scope_lists_comments_of_that_task<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let task_a = id_of(&create(&t, "/api/tasks", json!({"title": "A"})).await?)?;
    let task_b = id_of(&create(&t, "/api/tasks", json!({"title": "B"})).await?)?;
    create(
        &t,
        "/api/customer/comments",
        json!({"taskId": task_a, "comment": "on my way"}),
    )
    .await?;
    create(
        &t,
        "/api/customer/comments",
        json!({"taskId": task_b, "comment": "other"}),
    )
    .await?;
    let rows = list(&t, ApiRequest::get(format!("/api/tasks/{}/comments", task_a))).await?;
    let bodies: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("comment").and_then(|v| v.as_str()))
        .collect();
    if bodies == vec!["on my way"] {
        Ok(())
    } else {
        Err(format!("task {} comments were {:?}", task_a, bodies))
    }
}

async fn mine_scope_includes_own_complaints<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let id = id_of(
        &create(
            &t,
            "/api/complaints",
            json!({"subject": "Ladder", "description": "Broken rung"}),
        )
        .await?,
    )?;
    let rows = list(&t, ApiRequest::get("/api/complaints/my")).await?;
    if rows.iter().any(|r| id_of(r).ok() == Some(id)) {
        Ok(())
    } else {
        Err(format!("own complaint {} missing from /my: {:?}", id, rows))
    }
}
