use std::future::Future;

use serde_json::json;

use super::{create, expect_status, field, id_of, json_of, list, send, TestResult};
use crate::{ApiRequest, ApiTransport};

pub(super) async fn run_crud_tests<T, F, Fut>(factory: &F) -> Vec<TestResult>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "crud",
        "empty_collection_is_empty_array",
        empty_collection_is_empty_array(factory).await,
    ));
    results.push(TestResult::from_result(
        "crud",
        "create_returns_server_assigned_id",
        create_returns_server_assigned_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "crud",
        "created_record_appears_in_list",
        created_record_appears_in_list(factory).await,
    ));
    results.push(TestResult::from_result(
        "crud",
        "task_gets_server_ticket_number",
        task_gets_server_ticket_number(factory).await,
    ));
    results.push(TestResult::from_result(
        "crud",
        "update_overlays_fields",
        update_overlays_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "crud",
        "complaint_status_route_updates_status",
        complaint_status_route_updates_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "crud",
        "delete_removes_record",
        delete_removes_record(factory).await,
    ));

    results
}

// ── 1. A fresh backend lists nothing ────────────────────────────────

async fn empty_collection_is_empty_array<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let rows = list(&t, ApiRequest::get("/api/tasks")).await?;
    if rows.is_empty() {
        Ok(())
    } else {
        Err(format!("expected empty array, got {} rows", rows.len()))
    }
}

// ── 2. Ids come from the server ─────────────────────────────────────

async fn create_returns_server_assigned_id<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let a = create(&t, "/api/customers", json!({"name": "Acme"})).await?;
    let b = create(&t, "/api/customers", json!({"name": "Globex"})).await?;
    let (a, b) = (id_of(&a)?, id_of(&b)?);
    if a == b {
        return Err(format!("two creates returned the same id {}", a));
    }
    Ok(())
}

// ── 3. Create then list ─────────────────────────────────────────────

async fn created_record_appears_in_list<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    create(
        &t,
        "/api/tasks",
        json!({"title": "Printer issue", "priority": "high"}),
    )
    .await?;
    let rows = list(&t, ApiRequest::get("/api/tasks")).await?;
    let found = rows
        .iter()
        .any(|r| r.get("title").and_then(|v| v.as_str()) == Some("Printer issue"));
    if found {
        Ok(())
    } else {
        Err(format!("created task missing from list: {:?}", rows))
    }
}

// ── 4. Display ids are server-generated ─────────────────────────────

async fn task_gets_server_ticket_number<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let task = create(&t, "/api/tasks", json!({"title": "No signal"})).await?;
    match field(&task, "ticketNumber", "ticket_number").and_then(|v| v.as_str()) {
        Some(n) if !n.is_empty() => Ok(()),
        _ => Err(format!("task has no ticket number: {}", task)),
    }
}

// ── 5. Update is a partial overlay ──────────────────────────────────

async fn update_overlays_fields<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let task = create(
        &t,
        "/api/tasks",
        json!({"title": "Router down", "priority": "low"}),
    )
    .await?;
    let id = id_of(&task)?;
    let response = send(
        &t,
        ApiRequest::put(format!("/api/tasks/{}", id), json!({"status": "completed"})),
    )
    .await?;
    expect_status(&response, &[200], "update task")?;
    let updated = json_of(&response, "update response")?;
    if updated.get("status").and_then(|v| v.as_str()) != Some("completed") {
        return Err(format!("status not updated: {}", updated));
    }
    if updated.get("title").and_then(|v| v.as_str()) != Some("Router down") {
        return Err(format!("update dropped untouched field: {}", updated));
    }
    Ok(())
}

// ── 6. Complaints update through their status route ─────────────────

async fn complaint_status_route_updates_status<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let complaint = create(
        &t,
        "/api/complaints",
        json!({"subject": "Van", "description": "Flat tyre"}),
    )
    .await?;
    let id = id_of(&complaint)?;
    let response = send(
        &t,
        ApiRequest::put(
            format!("/api/complaints/{}/status", id),
            json!({"status": "resolved", "statusNote": "Replaced"}),
        ),
    )
    .await?;
    expect_status(&response, &[200], "update complaint status")?;
    let rows = list(&t, ApiRequest::get("/api/complaints")).await?;
    let resolved = rows.iter().any(|r| {
        id_of(r).ok() == Some(id) && r.get("status").and_then(|v| v.as_str()) == Some("resolved")
    });
    if resolved {
        Ok(())
    } else {
        Err(format!("complaint {} not resolved in list: {:?}", id, rows))
    }
}

// ── 7. Delete then get is not-found ─────────────────────────────────

async fn delete_removes_record<T, F, Fut>(factory: &F) -> Result<(), String>
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let t = factory().await;
    let customer = create(&t, "/api/customers", json!({"name": "Initech"})).await?;
    let id = id_of(&customer)?;
    let response = send(&t, ApiRequest::delete(format!("/api/customers/{}", id))).await?;
    expect_status(&response, &[200, 204], "delete customer")?;
    let response = send(&t, ApiRequest::get(format!("/api/customers/{}", id))).await?;
    expect_status(&response, &[404], "get deleted customer")?;
    Ok(())
}
