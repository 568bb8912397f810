//! Conformance test suite for `ApiTransport` backends.
//!
//! This module provides a backend-agnostic suite that checks a transport
//! (and the server behind it) answers the way the resource client expects.
//! The suite covers:
//!
//! - **CRUD**: server-assigned ids, overlay updates, not-found on missing ids
//! - **Filters and scopes**: server-side search and categorical filters,
//!   customer/task/"mine" scoped collections
//! - **Errors**: `{"message": ...}` bodies on 400 and 404
//! - **Uploads**: the three base64 upload endpoints and their reference fields
//! - **Transfer**: CSV export with `Content-Disposition`, multipart import,
//!   CCTV bulk upload
//! - **Progress**: monotonic send progress and cancellation
//!
//! # Usage
//!
//! Call [`run_conformance_suite`] with a factory that creates a fresh,
//! empty, authenticated backend for each test:
//!
//! ```ignore
//! use fieldops_transport::conformance::run_conformance_suite;
//! use fieldops_transport::MemoryTransport;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryTransport::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod crud;
mod errors;
mod filters;
mod progress;
mod transfer;
mod uploads;

use std::fmt;
use std::future::Future;

use crate::{ApiRequest, ApiResponse, ApiTransport};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "crud", "filters", "uploads").
    pub category: String,
    /// Test name (e.g. "create_returns_server_assigned_id").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// backend, ensuring test isolation.
pub async fn run_conformance_suite<T, F, Fut>(factory: F) -> ConformanceReport
where
    T: ApiTransport,
    F: Fn() -> Fut,
    Fut: Future<Output = T>,
{
    let mut results = Vec::new();

    results.extend(crud::run_crud_tests(&factory).await);
    results.extend(filters::run_filter_tests(&factory).await);
    results.extend(errors::run_error_tests(&factory).await);
    results.extend(uploads::run_upload_tests(&factory).await);
    results.extend(transfer::run_transfer_tests(&factory).await);
    results.extend(progress::run_progress_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn send<T: ApiTransport>(t: &T, request: ApiRequest) -> Result<ApiResponse, String> {
    let line = format!("{} {}", request.method, request.target());
    t.send(request)
        .await
        .map_err(|e| format!("{}: transport error: {}", line, e))
}

fn expect_status(response: &ApiResponse, expected: &[u16], what: &str) -> Result<(), String> {
    if expected.contains(&response.status) {
        Ok(())
    } else {
        Err(format!(
            "{}: expected status {:?}, got {} ({})",
            what,
            expected,
            response.status,
            response.body_text()
        ))
    }
}

fn json_of(response: &ApiResponse, what: &str) -> Result<serde_json::Value, String> {
    response
        .body_json()
        .map_err(|e| format!("{}: {}", what, e))
}

/// POST a JSON body and return the created object.
async fn create<T: ApiTransport>(
    t: &T,
    path: &str,
    body: serde_json::Value,
) -> Result<serde_json::Value, String> {
    let response = send(t, ApiRequest::post(path, body)).await?;
    expect_status(&response, &[200, 201], &format!("create at {}", path))?;
    json_of(&response, "create response")
}

/// GET a collection and return its rows.
async fn list<T: ApiTransport>(
    t: &T,
    request: ApiRequest,
) -> Result<Vec<serde_json::Value>, String> {
    let target = request.target();
    let response = send(t, request).await?;
    expect_status(&response, &[200], &format!("list {}", target))?;
    match json_of(&response, "list response")? {
        serde_json::Value::Array(rows) => Ok(rows),
        other => Err(format!("list {}: expected array, got {}", target, other)),
    }
}

fn id_of(value: &serde_json::Value) -> Result<i64, String> {
    value
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| format!("response has no integer id: {}", value))
}

fn field<'a>(value: &'a serde_json::Value, camel: &str, snake: &str) -> Option<&'a serde_json::Value> {
    value.get(camel).or_else(|| value.get(snake))
}
