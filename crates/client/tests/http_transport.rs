//! The HTTP transport against a local server that forwards every request
//! to the in-memory API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use fieldops_client::{
    ClientConfig, CollectionStatus, FieldOpsClient, Filters, ProgressCallback, UploadOptions,
    UploadTarget,
};
use fieldops_interchange::{ResourceKind, Scope};
use fieldops_transport::conformance::run_conformance_suite;
use fieldops_transport::{
    urldecoded, ApiRequest, ApiTransport, HttpTransport, MemoryTransport, Method, RequestBody,
    TransportError,
};
use serde_json::json;

// ── Bridge server ───────────────────────────────────────────────────

#[derive(Clone)]
struct Bridge {
    memory: Arc<MemoryTransport>,
    cookie: Option<String>,
}

async fn bridge(
    State(app): State<Bridge>,
    method: axum::http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(expected) = &app.cookie {
        let sent = headers.get("cookie").and_then(|v| v.to_str().ok());
        if sent != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                axum::Json(json!({"message": "Not authenticated"})),
            )
                .into_response();
        }
    }

    let Some(method) = Method::parse(method.as_str()) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let mut request = ApiRequest::new(method, uri.path());
    for pair in uri.query().unwrap_or_default().split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            request = request.with_query(urldecoded(k), urldecoded(v));
        }
    }
    if !body.is_empty() {
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        request = request.with_body(RequestBody::Raw {
            content_type,
            data: body.to_vec(),
        });
    }

    match app.memory.send(request).await {
        Ok(response) => {
            let mut out = HeaderMap::new();
            for (name, value) in &response.headers {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::try_from(name.as_str()),
                    HeaderValue::from_str(value),
                ) {
                    out.insert(name, value);
                }
            }
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, out, response.body).into_response()
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// Serve `memory` on an ephemeral port and return the base URL.
async fn serve(memory: Arc<MemoryTransport>, cookie: Option<&str>) -> String {
    let app = Router::new()
        .fallback(bridge)
        .layer(DefaultBodyLimit::disable())
        .with_state(Bridge {
            memory,
            cookie: cookie.map(str::to_string),
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_transport_passes_conformance() {
    let report = run_conformance_suite(|| async {
        let url = serve(Arc::new(MemoryTransport::new()), None).await;
        HttpTransport::new(&url).chunk_size(16 * 1024)
    })
    .await;
    assert!(report.total > 20, "suite ran only {} tests", report.total);
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_cookie_is_sent_on_every_request() {
    let memory = Arc::new(MemoryTransport::new());
    let url = serve(memory, Some("connect.sid=s3cret")).await;

    let anonymous = HttpTransport::new(&url);
    let response = anonymous.send(ApiRequest::get("/api/tasks")).await.unwrap();
    assert_eq!(response.status, 401);

    let signed_in = HttpTransport::new(&url).session_cookie("connect.sid=s3cret");
    let response = signed_in.send(ApiRequest::get("/api/tasks")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body_json().unwrap(), json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_server_times_out() {
    let memory = Arc::new(MemoryTransport::new());
    memory.delay("/api/tasks", Duration::from_secs(2));
    let url = serve(memory, None).await;

    let transport = HttpTransport::with_timeout(&url, Duration::from_millis(200));
    let err = transport
        .send(ApiRequest::get("/api/tasks"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_lists_and_creates_over_http() {
    let memory = Arc::new(MemoryTransport::new());
    memory.seed(
        ResourceKind::Customers,
        json!({"name": "Acme Networks", "city": "Springfield"}),
    );
    let url = serve(memory.clone(), Some("connect.sid=abc")).await;
    let transport = HttpTransport::new(&url).session_cookie("connect.sid=abc");
    let client = FieldOpsClient::new(Arc::new(transport), ClientConfig::default());

    let customers = client
        .list(
            ResourceKind::Customers,
            Scope::All,
            Filters::new().with("search", "acme"),
        )
        .await;
    assert_eq!(customers.status, CollectionStatus::Ready);
    assert_eq!(customers.records.len(), 1);

    let created = client
        .create(ResourceKind::Customers, &json!({"name": "Beta Fiber"}))
        .await
        .unwrap();
    assert!(created.id().is_some());
    assert_eq!(memory.records(ResourceKind::Customers).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_session_over_http_is_not_a_failure() {
    let url = serve(Arc::new(MemoryTransport::new()), Some("connect.sid=abc")).await;
    let client = FieldOpsClient::new(Arc::new(HttpTransport::new(&url)), ClientConfig::default());
    let tasks = client
        .list(ResourceKind::Tasks, Scope::All, Filters::new())
        .await;
    assert_eq!(tasks.status, CollectionStatus::SessionExpired);
    assert!(tasks.records.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_progress_over_http() {
    let url = serve(Arc::new(MemoryTransport::new()), None).await;
    let transport = HttpTransport::new(&url).chunk_size(32 * 1024);
    let client = FieldOpsClient::new(Arc::new(transport), ClientConfig::default());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rack.jpg");
    std::fs::write(&path, vec![0xabu8; 400_000]).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressCallback = Arc::new(move |v| sink.lock().unwrap().push(v));
    let reference = client
        .upload_file(
            &path,
            UploadTarget::CctvImage {
                image_type: "rack".into(),
            },
            UploadOptions::default().with_progress(progress),
        )
        .await
        .unwrap();
    assert!(reference.starts_with("/uploads/cctv/"));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().any(|v| *v > 40 && *v < 100), "no send-phase progress");
}
