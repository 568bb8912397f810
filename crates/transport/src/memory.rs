//! In-memory API emulator.
//!
//! `MemoryTransport` answers requests the way the field-service API does,
//! driven by the same route table the client uses: list endpoints per
//! scope with server-side filters, item/create/update/delete endpoints,
//! the three upload endpoints, CSV export/import and CCTV bulk upload.
//! Error bodies carry `{"message": ...}` like the real server.
//!
//! It also exposes knobs for tests: an authentication toggle (401 on every
//! request when off), one-shot failure injection, per-path latency, and a
//! log of every request target.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use fieldops_interchange::{
    to_snake_case, Record, ResourceKind, ResourceSpec, Scope, UpdateMethod,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::TransportError;
use crate::http::DEFAULT_CHUNK_SIZE;
use crate::request::{ApiRequest, ApiResponse, Method, SendOptions};
use crate::traits::ApiTransport;

/// A failure returned by the next request instead of routing it.
#[derive(Debug, Clone)]
pub enum Injected {
    Transport(TransportError),
    Status { status: u16, message: String },
}

struct MemoryState {
    tables: BTreeMap<ResourceKind, BTreeMap<i64, Record>>,
    next_id: i64,
    authenticated: bool,
    user_id: i64,
    user_name: String,
    injected: VecDeque<Injected>,
    delays: Vec<(String, Duration)>,
    log: Vec<String>,
    uploads: u64,
}

/// API emulator backed by in-memory tables.
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    chunk_size: usize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport {
            state: Mutex::new(MemoryState {
                tables: BTreeMap::new(),
                next_id: 1,
                authenticated: true,
                user_id: 1,
                user_name: "Field Engineer".to_string(),
                injected: VecDeque::new(),
                delays: Vec::new(),
                log: Vec::new(),
                uploads: 0,
            }),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Size of the body chunks reported through progress callbacks.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a row directly, bypassing validation. Returns its id.
    pub fn seed(&self, kind: ResourceKind, row: Value) -> i64 {
        let mut state = self.lock();
        let mut record = Record::from_json(&row).unwrap_or_default();
        let id = match record.id() {
            Some(id) => {
                state.next_id = state.next_id.max(id + 1);
                id
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                record.set("id", json!(id));
                id
            }
        };
        state.tables.entry(kind).or_default().insert(id, record);
        id
    }

    /// Current rows of a table, ordered by id.
    pub fn records(&self, kind: ResourceKind) -> Vec<Record> {
        self.lock()
            .tables
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.lock().authenticated = authenticated;
    }

    /// The signed-in user that "mine" scopes and created rows refer to.
    pub fn set_user(&self, id: i64, name: &str) {
        let mut state = self.lock();
        state.user_id = id;
        state.user_name = name.to_string();
    }

    /// Fail the next request with `failure`. Calls queue in order.
    pub fn inject(&self, failure: Injected) {
        self.lock().injected.push_back(failure);
    }

    /// Delay every request whose target contains `fragment`.
    pub fn delay(&self, fragment: &str, delay: Duration) {
        self.lock().delays.push((fragment.to_string(), delay));
    }

    pub fn clear_delays(&self) {
        self.lock().delays.clear();
    }

    /// Every request target seen, as `"METHOD /path?query"`.
    pub fn requests(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Number of requests whose logged line contains `fragment`.
    pub fn request_count(&self, fragment: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|line| line.contains(fragment))
            .count()
    }

    pub fn clear_requests(&self) {
        self.lock().log.clear();
    }
}

#[async_trait]
impl ApiTransport for MemoryTransport {
    async fn send_with(
        &self,
        request: ApiRequest,
        options: SendOptions,
    ) -> Result<ApiResponse, TransportError> {
        let target = request.target();
        let line = format!("{} {}", request.method, target);
        let delay = {
            let mut state = self.lock();
            state.log.push(line.clone());
            state
                .delays
                .iter()
                .filter(|(fragment, _)| target.contains(fragment.as_str()))
                .map(|(_, d)| *d)
                .max()
        };
        debug!(request = %line, "memory transport");

        let body = request.body.encode()?;
        let cancel = options.cancel.clone().unwrap_or_default();

        if let Some((_, data)) = &body {
            let total = data.len() as u64;
            let mut sent = 0u64;
            while sent < total {
                if cancel.is_cancelled() {
                    return Err(TransportError::Cancelled);
                }
                sent = (sent + self.chunk_size as u64).min(total);
                if let Some(progress) = &options.progress {
                    progress(sent, total);
                }
                tokio::task::yield_now().await;
            }
        }

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut state = self.lock();
        if let Some(injected) = state.injected.pop_front() {
            return match injected {
                Injected::Transport(err) => Err(err),
                Injected::Status { status, message } => {
                    Ok(ApiResponse::json(status, &json!({ "message": message })))
                }
            };
        }
        if !state.authenticated {
            return Ok(ApiResponse::json(401, &json!({"message": "Not authenticated"})));
        }

        let query = parse_query(&request.query);
        Ok(route(&mut state, request.method, &request.path, &query, body))
    }

    fn transport_id(&self) -> &str {
        "memory"
    }
}

// ── Routing ─────────────────────────────────────────────────────────

fn not_found(message: &str) -> ApiResponse {
    ApiResponse::json(404, &json!({ "message": message }))
}

fn bad_request(message: &str) -> ApiResponse {
    ApiResponse::json(400, &json!({ "message": message }))
}

fn parse_query(query: &[(String, String)]) -> BTreeMap<String, String> {
    query
        .iter()
        .map(|(k, v)| (to_snake_case(k), v.clone()))
        .collect()
}

/// Match a path against a template with one `{...}` placeholder.
fn match_template(template: &str, path: &str) -> Option<i64> {
    let t: Vec<&str> = template.trim_matches('/').split('/').collect();
    let p: Vec<&str> = path.trim_matches('/').split('/').collect();
    if t.len() != p.len() {
        return None;
    }
    let mut id = None;
    for (ts, ps) in t.iter().zip(&p) {
        if ts.starts_with('{') && ts.ends_with('}') {
            id = Some(ps.parse().ok()?);
        } else if ts != ps {
            return None;
        }
    }
    id
}

fn body_json(body: &Option<(String, Vec<u8>)>) -> Option<Value> {
    match body {
        Some((ct, data)) if ct.starts_with("application/json") => {
            serde_json::from_slice(data).ok()
        }
        _ => None,
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

fn capitalized(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn route(
    state: &mut MemoryState,
    method: Method,
    path: &str,
    query: &BTreeMap<String, String>,
    body: Option<(String, Vec<u8>)>,
) -> ApiResponse {
    let path = path.split('?').next().unwrap_or(path);

    match (method, path) {
        (Method::Post, "/api/customer-portal/cctv-upload-image") => {
            return upload_cctv_image(state, body_json(&body))
        }
        (Method::Post, "/api/profile/photo") => return upload_profile_photo(state, body_json(&body)),
        (Method::Get, "/api/customers/export") => return export_customers(state),
        (Method::Get, "/api/customers/import-template") => return import_template(),
        (Method::Post, "/api/customers/import") => return import_customers(state, body),
        (Method::Post, "/api/customer-portal/cctv-information/bulk-upload") => {
            return bulk_upload_cctv(state, body_json(&body))
        }
        _ => {}
    }
    if method == Method::Post {
        if let Some(task_id) = match_template("/api/tasks/{id}/upload", path) {
            return upload_task_files(state, task_id, body_json(&body));
        }
    }

    for kind in ResourceKind::ALL {
        let spec = kind.spec();
        match method {
            Method::Get => {
                if let Some(scope) = list_scope(spec, path) {
                    return list(state, spec, scope, query);
                }
                if spec.get {
                    if let Some(id) = spec.item.and_then(|t| match_template(t, path)) {
                        return get_item(state, spec, id);
                    }
                }
            }
            Method::Post if spec.create == Some(path) => {
                return create(state, spec, body_json(&body));
            }
            Method::Put | Method::Patch => {
                if let Some((update_method, template)) = spec.update {
                    let wanted = match update_method {
                        UpdateMethod::Put => Method::Put,
                        UpdateMethod::Patch => Method::Patch,
                    };
                    if wanted == method {
                        if let Some(id) = match_template(template, path) {
                            return update(state, spec, id, body_json(&body));
                        }
                    }
                }
            }
            Method::Delete if spec.delete => {
                if let Some(id) = spec.item.and_then(|t| match_template(t, path)) {
                    return delete(state, spec, id);
                }
            }
            _ => {}
        }
    }

    not_found(&format!("Route not found: {} {}", method, path))
}

fn list_scope(spec: &ResourceSpec, path: &str) -> Option<Scope> {
    if spec.list_all == Some(path) {
        return Some(Scope::All);
    }
    if spec.list_mine == Some(path) {
        return Some(Scope::Mine);
    }
    if let Some(c) = spec.list_by_customer.and_then(|t| match_template(t, path)) {
        return Some(Scope::Customer(c));
    }
    if let Some(t) = spec.list_by_task.and_then(|t| match_template(t, path)) {
        return Some(Scope::Task(t));
    }
    None
}

fn in_scope(spec: &ResourceSpec, record: &Record, scope: Scope, user_id: i64) -> bool {
    match scope {
        Scope::All => true,
        Scope::Mine => {
            record.i64_field("assigned_to") == Some(user_id)
                || record.i64_field("created_by") == Some(user_id)
        }
        Scope::Customer(c) => spec
            .customer_field
            .is_some_and(|f| record.i64_field(f) == Some(c)),
        Scope::Task(t) => spec
            .task_field
            .is_some_and(|f| record.i64_field(f) == Some(t)),
    }
}

fn matches_filter(spec: &ResourceSpec, record: &Record, name: &str, value: &str) -> bool {
    let needle = value.to_lowercase();
    match name {
        "search" => spec.search_fields.iter().any(|f| {
            record
                .display_field(f)
                .is_some_and(|v| v.to_lowercase().contains(&needle))
        }),
        "location" => ["city", "state", "address"].iter().any(|f| {
            record
                .display_field(f)
                .is_some_and(|v| v.to_lowercase().contains(&needle))
        }),
        field => record
            .display_field(field)
            .is_some_and(|v| v.to_lowercase() == needle),
    }
}

fn list(
    state: &MemoryState,
    spec: &ResourceSpec,
    scope: Scope,
    query: &BTreeMap<String, String>,
) -> ApiResponse {
    let rows: Vec<Value> = state
        .tables
        .get(&spec.kind)
        .into_iter()
        .flat_map(|t| t.values().rev())
        .filter(|r| in_scope(spec, r, scope, state.user_id))
        .filter(|r| {
            query.iter().all(|(name, value)| {
                !spec.is_server_filter(name)
                    || value.is_empty()
                    || value == "all"
                    || matches_filter(spec, r, name, value)
            })
        })
        .map(Record::to_wire)
        .collect();
    ApiResponse::json(200, &Value::Array(rows))
}

fn get_item(state: &MemoryState, spec: &ResourceSpec, id: i64) -> ApiResponse {
    match state.tables.get(&spec.kind).and_then(|t| t.get(&id)) {
        Some(record) => ApiResponse::json(200, &record.to_wire()),
        None => not_found(&format!("{} not found", capitalized(spec.label))),
    }
}

fn push_history(state: &mut MemoryState, task_id: i64, kind: &str, message: &str) {
    let id = state.next_id;
    state.next_id += 1;
    let mut entry = Record::default();
    entry.set("id", json!(id));
    entry.set("task_id", json!(task_id));
    entry.set("type", json!(kind));
    entry.set("message", json!(message));
    entry.set("created_by", json!(state.user_id));
    entry.set("created_by_name", json!(state.user_name));
    entry.set("created_at", json!(now_rfc3339()));
    state
        .tables
        .entry(ResourceKind::TaskHistory)
        .or_default()
        .insert(id, entry);
}

fn insert_row(state: &mut MemoryState, kind: ResourceKind, mut record: Record) -> Record {
    let id = state.next_id;
    state.next_id += 1;
    record.set("id", json!(id));
    record.set("created_at", json!(now_rfc3339()));
    if record.get("created_by").is_none() {
        record.set("created_by", json!(state.user_id));
    }
    state
        .tables
        .entry(kind)
        .or_default()
        .insert(id, record.clone());
    record
}

fn create(state: &mut MemoryState, spec: &ResourceSpec, body: Option<Value>) -> ApiResponse {
    let Some(record) = body.as_ref().and_then(|b| Record::from_json(b).ok()) else {
        return bad_request("Request body must be a JSON object");
    };
    for field in spec.required_on_create {
        if record.require(field).is_err() {
            return bad_request(&format!("{} is required", field));
        }
    }

    let mut record = record;
    match spec.kind {
        ResourceKind::Tasks => {
            if record.str_field("status").is_none() {
                record.set("status", json!("pending"));
            }
            if record.str_field("priority").is_none() {
                record.set("priority", json!("medium"));
            }
            if let Some(customer) = record
                .i64_field("customer_id")
                .and_then(|c| state.tables.get(&ResourceKind::Customers)?.get(&c))
            {
                if let Some(name) = customer.str_field("name") {
                    record.set("customer_name", json!(name));
                }
            }
        }
        ResourceKind::TaskComments => {
            let task = record.i64_field("task_id");
            let exists = task.is_some_and(|t| {
                state
                    .tables
                    .get(&ResourceKind::Tasks)
                    .is_some_and(|tasks| tasks.contains_key(&t))
            });
            if !exists {
                return not_found("Task not found");
            }
            record.set("created_by_name", json!(state.user_name));
        }
        ResourceKind::Complaints => {
            record.set("status", json!("open"));
            record.set("engineer_name", json!(state.user_name));
        }
        ResourceKind::DailyReports => {
            record.set("engineer_name", json!(state.user_name));
        }
        ResourceKind::Documents => {
            if let Some(name) = record
                .i64_field("customer_id")
                .and_then(|c| state.tables.get(&ResourceKind::Customers)?.get(&c))
                .and_then(|c| c.str_field("name"))
                .map(str::to_string)
            {
                record.set("customer_name", json!(name));
            }
        }
        _ => {}
    }

    let mut created = insert_row(state, spec.kind, record);
    let id = created.id().unwrap_or_default();
    match spec.kind {
        ResourceKind::Tasks => {
            created.set("ticket_number", json!(format!("TKT-{:04}", id)));
            if let Some(row) = state
                .tables
                .get_mut(&ResourceKind::Tasks)
                .and_then(|t| t.get_mut(&id))
            {
                *row = created.clone();
            }
            push_history(state, id, "created", "Task created");
        }
        ResourceKind::Complaints => {
            created.set("complaint_id", json!(format!("CMP-{:04}", id)));
            if let Some(row) = state
                .tables
                .get_mut(&ResourceKind::Complaints)
                .and_then(|t| t.get_mut(&id))
            {
                *row = created.clone();
            }
        }
        ResourceKind::TaskComments => {
            if let Some(task) = created.i64_field("task_id") {
                push_history(state, task, "comment", "Comment added");
            }
        }
        _ => {}
    }
    ApiResponse::json(201, &created.to_wire())
}

fn update(
    state: &mut MemoryState,
    spec: &ResourceSpec,
    id: i64,
    body: Option<Value>,
) -> ApiResponse {
    let Some(patch) = body.as_ref().and_then(|b| Record::from_json(b).ok()) else {
        return bad_request("Request body must be a JSON object");
    };
    let user_name = state.user_name.clone();
    let Some(row) = state
        .tables
        .get_mut(&spec.kind)
        .and_then(|t| t.get_mut(&id))
    else {
        return not_found(&format!("{} not found", capitalized(spec.label)));
    };

    let old_status = row.str_field("status").map(str::to_string);
    let mut patch = patch;
    patch.remove("id");
    row.overlay(&patch);
    row.set("updated_at", json!(now_rfc3339()));
    if spec.kind == ResourceKind::Complaints {
        row.set("status_updated_by", json!(user_name));
    }
    let updated = row.clone();

    if spec.kind == ResourceKind::Tasks {
        let new_status = updated.str_field("status").map(str::to_string);
        if new_status != old_status {
            let message = format!(
                "Status changed to {}",
                new_status.as_deref().unwrap_or("none")
            );
            push_history(state, id, "status_change", &message);
        } else {
            push_history(state, id, "updated", "Task updated");
        }
    }
    ApiResponse::json(200, &updated.to_wire())
}

fn delete(state: &mut MemoryState, spec: &ResourceSpec, id: i64) -> ApiResponse {
    let removed = state
        .tables
        .get_mut(&spec.kind)
        .and_then(|t| t.remove(&id));
    match removed {
        Some(_) => ApiResponse::json(
            200,
            &json!({ "message": format!("{} deleted successfully", capitalized(spec.label)) }),
        ),
        None => not_found(&format!("{} not found", capitalized(spec.label))),
    }
}

// ── Uploads ─────────────────────────────────────────────────────────

/// Validate a `data:<mime>;base64,<payload>` URL and return its mime type.
fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), String> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| "Expected a data URL".to_string())?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| "Expected base64 data".to_string())?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| "Invalid base64 data".to_string())?;
    Ok((mime.to_string(), bytes))
}

fn upload_cctv_image(state: &mut MemoryState, body: Option<Value>) -> ApiResponse {
    let body = body.unwrap_or(Value::Null);
    let Some(data) = body.get("imageData").and_then(Value::as_str) else {
        return bad_request("No image data provided");
    };
    let (mime, _) = match decode_data_url(data) {
        Ok(decoded) => decoded,
        Err(message) => return bad_request(&message),
    };
    if !mime.starts_with("image/") {
        return bad_request("Only image files are allowed");
    }
    state.uploads += 1;
    let file_name = body
        .get("fileName")
        .and_then(Value::as_str)
        .unwrap_or("image");
    ApiResponse::json(
        200,
        &json!({
            "message": "Image uploaded successfully",
            "imageUrl": format!("/uploads/cctv/{}-{}", state.uploads, file_name),
        }),
    )
}

fn upload_profile_photo(state: &mut MemoryState, body: Option<Value>) -> ApiResponse {
    let Some(data) = body
        .as_ref()
        .and_then(|b| b.get("photoData"))
        .and_then(Value::as_str)
    else {
        return bad_request("No photo data provided");
    };
    if let Err(message) = decode_data_url(data) {
        return bad_request(&message);
    }
    state.uploads += 1;
    ApiResponse::json(
        200,
        &json!({
            "message": "Profile photo updated",
            "profileImageUrl": format!("/uploads/profiles/{}-{}.jpg", state.user_id, state.uploads),
        }),
    )
}

fn upload_task_files(state: &mut MemoryState, task_id: i64, body: Option<Value>) -> ApiResponse {
    let task_exists = state
        .tables
        .get(&ResourceKind::Tasks)
        .is_some_and(|t| t.contains_key(&task_id));
    if !task_exists {
        return not_found("Task not found");
    }
    let files = body
        .as_ref()
        .and_then(|b| b.get("files"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if files.is_empty() {
        return bad_request("No files provided");
    }
    let mut urls = Vec::with_capacity(files.len());
    for file in &files {
        let name = file.get("name").and_then(Value::as_str).unwrap_or("file");
        let Some(data) = file.get("data").and_then(Value::as_str) else {
            return bad_request("File data missing");
        };
        if let Err(message) = decode_data_url(data) {
            return bad_request(&message);
        }
        urls.push(format!("/uploads/tasks/{}/{}", task_id, name));
    }
    state.uploads += 1;
    push_history(
        state,
        task_id,
        "attachment",
        &format!("{} file(s) attached", urls.len()),
    );
    ApiResponse::json(200, &json!({ "message": "Files uploaded", "files": urls }))
}

// ── CSV export / import ─────────────────────────────────────────────

const CUSTOMER_COLUMNS: [(&str, &str); 10] = [
    ("Customer ID", "customer_id"),
    ("Name", "name"),
    ("Contact Person", "contact_person"),
    ("Email", "email"),
    ("Mobile Phone", "mobile_phone"),
    ("Address", "address"),
    ("City", "city"),
    ("State", "state"),
    ("Service Plan", "service_plan"),
    ("Status", "status"),
];

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_header() -> String {
    CUSTOMER_COLUMNS
        .iter()
        .map(|(h, _)| *h)
        .collect::<Vec<_>>()
        .join(",")
}

fn export_customers(state: &MemoryState) -> ApiResponse {
    let mut out = csv_header();
    out.push('\n');
    for record in state
        .tables
        .get(&ResourceKind::Customers)
        .into_iter()
        .flat_map(|t| t.values())
    {
        let row: Vec<String> = CUSTOMER_COLUMNS
            .iter()
            .map(|(_, f)| csv_escape(&record.display_field(f).unwrap_or_default()))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    let date = time::OffsetDateTime::now_utc().date();
    ApiResponse::new(200, out.into_bytes())
        .with_header("content-type", "text/csv; charset=utf-8")
        .with_header(
            "content-disposition",
            &format!("attachment; filename=\"customers-export-{}.csv\"", date),
        )
}

fn import_template() -> ApiResponse {
    let body = format!(
        "{}\nCUST-0001,Acme Networks,Jane Doe,jane@acme.example,555-0100,1 Main St,Springfield,IL,Fiber 100,active\n",
        csv_header()
    );
    ApiResponse::new(200, body.into_bytes())
        .with_header("content-type", "text/csv; charset=utf-8")
        .with_header(
            "content-disposition",
            "attachment; filename=\"customer-import-template.csv\"",
        )
}

/// Split CSV text into rows of fields, honouring double-quoted fields.
fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match (ch, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => row.push(std::mem::take(&mut field)),
            ('\r', false) => {}
            ('\n', false) => {
                row.push(std::mem::take(&mut field));
                if row.iter().any(|f| !f.trim().is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            (c, _) => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        if row.iter().any(|f| !f.trim().is_empty()) {
            rows.push(row);
        }
    }
    rows
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Extract the named part of a `multipart/form-data` body.
fn multipart_part(content_type: &str, body: &[u8], name: &str) -> Option<Vec<u8>> {
    let boundary = content_type.split("boundary=").nth(1)?.trim_matches('"');
    let delimiter = format!("--{}", boundary);
    let wanted = format!("name=\"{}\"", name);
    let mut rest = body;
    while let Some(start) = find(rest, delimiter.as_bytes()) {
        rest = &rest[start + delimiter.len()..];
        if rest.starts_with(b"--") {
            break;
        }
        let header_end = find(rest, b"\r\n\r\n")?;
        let headers = String::from_utf8_lossy(&rest[..header_end]);
        let content = &rest[header_end + 4..];
        let end = find(content, delimiter.as_bytes()).unwrap_or(content.len());
        let data = content[..end]
            .strip_suffix(b"\r\n")
            .unwrap_or(&content[..end]);
        if headers.contains(&wanted) {
            return Some(data.to_vec());
        }
    }
    None
}

fn import_customers(state: &mut MemoryState, body: Option<(String, Vec<u8>)>) -> ApiResponse {
    let Some((content_type, data)) = body else {
        return bad_request("No file uploaded");
    };
    if !content_type.starts_with("multipart/form-data") {
        return bad_request("Expected multipart/form-data");
    }
    let Some(file) = multipart_part(&content_type, &data, "file") else {
        return bad_request("No file uploaded");
    };
    let text = String::from_utf8_lossy(&file);
    let mut rows = parse_csv(&text).into_iter();
    let Some(header) = rows.next() else {
        return bad_request("CSV file is empty");
    };
    let columns: Vec<String> = header.iter().map(|h| to_snake_case(h.trim())).collect();

    let (mut imported, mut updated, mut errors) = (0u64, 0u64, 0u64);
    let mut details = Vec::new();
    let mut total = 0u64;
    for (index, row) in rows.enumerate() {
        total += 1;
        let mut record = Record::default();
        for (column, value) in columns.iter().zip(row) {
            let value = value.trim();
            if !value.is_empty() {
                record.set(column, json!(value));
            }
        }
        if record.require("name").is_err() {
            errors += 1;
            details.push(format!("Row {}: name is required", index + 2));
            continue;
        }
        let existing = record.str_field("customer_id").and_then(|code| {
            state
                .tables
                .get(&ResourceKind::Customers)?
                .iter()
                .find(|(_, r)| r.str_field("customer_id") == Some(code))
                .map(|(id, _)| *id)
        });
        match existing {
            Some(id) => {
                if let Some(row) = state
                    .tables
                    .get_mut(&ResourceKind::Customers)
                    .and_then(|t| t.get_mut(&id))
                {
                    row.overlay(&record);
                }
                updated += 1;
            }
            None => {
                insert_row(state, ResourceKind::Customers, record);
                imported += 1;
            }
        }
    }

    ApiResponse::json(
        200,
        &json!({
            "imported": imported,
            "updated": updated,
            "errors": errors,
            "total": total,
            "errorDetails": details,
        }),
    )
}

fn bulk_upload_cctv(state: &mut MemoryState, body: Option<Value>) -> ApiResponse {
    let rows = body
        .as_ref()
        .and_then(|b| b.get("data"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if rows.is_empty() {
        return bad_request("No data provided");
    }
    let mut created = Vec::with_capacity(rows.len());
    for row in &rows {
        match Record::from_json(row) {
            Ok(record) => created.push(insert_row(state, ResourceKind::CctvRecords, record)),
            Err(e) => return bad_request(&e.to_string()),
        }
    }
    ApiResponse::json(
        201,
        &json!({
            "message": format!("{} records uploaded", created.len()),
            "count": created.len(),
            "records": created.iter().map(Record::to_wire).collect::<Vec<_>>(),
        }),
    )
}
