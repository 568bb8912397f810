//! The generic resource client.
//!
//! One `FieldOpsClient` serves every resource in the route table. Lists go
//! through the shared [`QueryCache`]; mutations go straight to the API and,
//! on success, invalidate and refetch every cached collection that could
//! contain the affected record. Nothing is written to the cache
//! optimistically.

use std::sync::Arc;
use std::time::Instant;

use fieldops_interchange::{
    normalize_collection, Operation, Record, ResourceKind, ResourceSpec, Scope, UpdateMethod,
};
use fieldops_transport::{
    ApiRequest, ApiResponse, ApiTransport, HttpTransport, Method, RequestBody,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheEvent, CollectionStatus, QueryCache, Snapshot};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::filter;
use crate::invalidation::InvalidationPlan;
use crate::mutation::{MutationKey, PendingMutations};
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::query::{Filters, QueryKey};

/// Answer to the "are you sure?" prompt in front of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined; no request was sent.
    Declined,
}

struct Inner {
    transport: Arc<dyn ApiTransport>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
    pending: PendingMutations,
    config: ClientConfig,
}

/// When a queued fetch may reuse the result of the fetch ahead of it.
#[derive(Debug, Clone, Copy)]
enum Join {
    /// A fetch landed after this instant.
    FetchedSince(Instant),
    /// A fetch started at or after this invalidation epoch landed.
    Covers(u64),
}

/// Cheap to clone; clones share the transport, cache and pending set.
#[derive(Clone)]
pub struct FieldOpsClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FieldOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOpsClient")
            .field("transport", &self.inner.transport.transport_id())
            .field("cached_collections", &self.inner.cache.len())
            .finish()
    }
}

fn capitalized(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

impl FieldOpsClient {
    pub fn new(transport: Arc<dyn ApiTransport>, config: ClientConfig) -> Self {
        FieldOpsClient {
            inner: Arc::new(Inner {
                transport,
                cache: Arc::new(QueryCache::with_unviewed_capacity(
                    config.cache.unviewed_capacity,
                )),
                notifier: Arc::new(LogNotifier),
                pending: PendingMutations::new(),
                config,
            }),
        }
    }

    /// HTTP client for `config.base_url`, carrying the session cookie.
    pub fn connect(config: ClientConfig) -> Self {
        let mut transport = HttpTransport::with_timeout(&config.base_url, config.timeout())
            .chunk_size(config.upload.chunk_size);
        if let Some(cookie) = &config.session_cookie {
            transport = transport.session_cookie(cookie.clone());
        }
        Self::new(Arc::new(transport), config)
    }

    /// Replace the notification sink.
    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        FieldOpsClient {
            inner: Arc::new(Inner {
                transport: self.inner.transport.clone(),
                cache: self.inner.cache.clone(),
                notifier,
                pending: self.inner.pending.clone(),
                config: self.inner.config.clone(),
            }),
        }
    }

    pub fn transport(&self) -> &Arc<dyn ApiTransport> {
        &self.inner.transport
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.inner.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn pending(&self) -> &PendingMutations {
        &self.inner.pending
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.cache.subscribe()
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.inner.notifier.notify(notification);
    }

    // ── Lists ────────────────────────────────────────────────────────

    /// The collection for (kind, scope, filters), from cache when fresh.
    pub async fn list(&self, kind: ResourceKind, scope: Scope, filters: Filters) -> Snapshot {
        self.query(&QueryKey::new(kind, scope, filters)).await
    }

    /// The collection for `key`, from cache when fresh.
    pub async fn query(&self, key: &QueryKey) -> Snapshot {
        if let Some(snapshot) = self.inner.cache.snapshot(key) {
            if snapshot.is_fresh() {
                debug!(key = %key, "cache hit");
                return snapshot;
            }
        }
        self.refresh(key).await
    }

    /// Fetch `key` regardless of freshness.
    ///
    /// The fetch runs as its own task, so its result lands in the cache
    /// even if the caller stops waiting. Callers racing on the same key
    /// share one request.
    pub async fn refresh(&self, key: &QueryKey) -> Snapshot {
        self.spawn_fetch(key, Join::FetchedSince(Instant::now()))
            .await
    }

    /// Refetch `key` after an invalidation, unless a fetch started since
    /// the latest invalidation has already landed or is in flight.
    pub async fn revalidate(&self, key: &QueryKey) -> Snapshot {
        match self.inner.cache.epoch(key) {
            Some(epoch) => self.spawn_fetch(key, Join::Covers(epoch)).await,
            None => self.refresh(key).await,
        }
    }

    async fn spawn_fetch(&self, key: &QueryKey, join: Join) -> Snapshot {
        let client = self.clone();
        let owned = key.clone();
        match tokio::spawn(async move { client.fetch(&owned, join).await }).await {
            Ok(snapshot) => snapshot,
            Err(e) => Snapshot {
                records: Arc::new(Vec::new()),
                status: CollectionStatus::Failed {
                    message: format!("fetch task failed: {}", e),
                },
                stale: true,
                fetched_at: None,
            },
        }
    }

    async fn fetch(&self, key: &QueryKey, join: Join) -> Snapshot {
        let cache = &self.inner.cache;
        let lock = cache.fetch_lock(key);
        let _guard = lock.lock().await;

        // Someone else fetched while we waited for the lock.
        let joined = match join {
            Join::FetchedSince(requested_at) => cache.snapshot(key).filter(|s| {
                !s.stale && s.fetched_at.is_some_and(|t| t >= requested_at)
            }),
            Join::Covers(epoch) => cache.covering(key, epoch),
        };
        if let Some(snapshot) = joined {
            debug!(key = %key, "joined in-flight fetch");
            return snapshot;
        }

        let epoch = cache.begin_fetch(key);
        let (records, status) = self.load(key).await;
        cache.store(key, epoch, records, status)
    }

    async fn load(&self, key: &QueryKey) -> (Vec<Record>, CollectionStatus) {
        let spec = key.resource.spec();
        let Some(request) = key.request() else {
            let err = ClientError::unsupported(key.resource, format!("scope {}", key.scope));
            return (
                Vec::new(),
                CollectionStatus::Failed {
                    message: err.to_string(),
                },
            );
        };
        debug!(key = %key, target = %request.target(), "fetching collection");

        let failure = match self.inner.transport.send(request).await {
            Ok(response) if response.status == 401 => {
                warn!(key = %key, "session expired; collection left empty");
                return (Vec::new(), CollectionStatus::SessionExpired);
            }
            Ok(response) if response.is_success() => {
                match response
                    .body_json()
                    .map_err(ClientError::from)
                    .and_then(|body| normalize_collection(&body).map_err(ClientError::from))
                {
                    Ok(records) => {
                        let records = filter::apply_local(spec, &key.filters, records);
                        return (records, CollectionStatus::Ready);
                    }
                    Err(e) => e.to_string(),
                }
            }
            Ok(response) => response
                .error_message()
                .unwrap_or_else(|| format!("server returned {}", response.status)),
            Err(e) => e.to_string(),
        };

        warn!(key = %key, error = %failure, "collection fetch failed");
        self.notify(Notification::error(
            format!("Failed to load {}", spec.name.replace('_', " ")),
            failure.clone(),
        ));
        (Vec::new(), CollectionStatus::Failed { message: failure })
    }

    /// Suggested next serial for a new record: collection length + 1.
    ///
    /// A display hint only; the server assigns real identifiers.
    pub async fn suggest_next_serial(&self, kind: ResourceKind, scope: Scope) -> usize {
        self.list(kind, scope, Filters::new()).await.records.len() + 1
    }

    // ── Single records ───────────────────────────────────────────────

    /// One record by id. Resources without an item endpoint are looked up
    /// in their global list.
    pub async fn get(&self, kind: ResourceKind, id: i64) -> Result<Record, ClientError> {
        let spec = kind.spec();
        let result = if let Some(path) = spec.item_path(id).filter(|_| spec.get) {
            self.send_classified(spec, ApiRequest::get(path), Some(id))
                .await
                .and_then(|response| Ok(Record::try_from(response.body_json()?)?))
        } else if let Some(path) = spec.list_path(Scope::All) {
            self.send_classified(spec, ApiRequest::get(path), Some(id))
                .await
                .and_then(|response| Ok(normalize_collection(&response.body_json()?)?))
                .and_then(|rows| {
                    rows.into_iter()
                        .find(|r| r.id() == Some(id))
                        .ok_or_else(|| ClientError::NotFound {
                            resource: kind,
                            id,
                            message: format!("{} not found", capitalized(spec.label)),
                        })
                })
        } else {
            Err(ClientError::unsupported(kind, "get"))
        };
        result.map_err(|e| self.failed(spec, Operation::Get, e))
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Create a record. The server assigns id, timestamps and display
    /// numbers; the returned record is the server's.
    pub async fn create(&self, kind: ResourceKind, payload: &Value) -> Result<Record, ClientError> {
        let spec = kind.spec();
        let result = self.try_create(spec, payload).await;
        let created = result.map_err(|e| self.failed(spec, Operation::Create, e))?;
        info!(resource = %kind, id = ?created.id(), "created");
        self.notify(Notification::success(
            format!("{} created", capitalized(spec.label)),
            spec.display_id_field
                .and_then(|f| created.display_field(f))
                .unwrap_or_else(|| format!("id {}", created.id().unwrap_or_default())),
        ));
        Ok(created)
    }

    async fn try_create(&self, spec: &ResourceSpec, payload: &Value) -> Result<Record, ClientError> {
        let path = spec
            .create
            .ok_or_else(|| ClientError::unsupported(spec.kind, "create"))?;
        let record = payload_record(payload)?;
        for field in spec.required_on_create {
            if record.require(field).is_err() {
                return Err(ClientError::Validation {
                    message: format!("{} is required", field),
                });
            }
        }
        let wire = record.to_wire();
        let _pending = self
            .inner
            .pending
            .begin(MutationKey::create(spec.kind, &wire))?;

        let parent = spec
            .task_field
            .or(spec.customer_field)
            .and_then(|f| record.i64_field(f));
        let response = self
            .send_classified(spec, ApiRequest::post(path, wire), parent)
            .await?;
        let created = Record::try_from(response.body_json()?)?;

        self.apply(InvalidationPlan::for_mutation(spec.kind, &[&created]))
            .await;
        Ok(created)
    }

    /// Overlay `patch` onto record `id`.
    pub async fn update(
        &self,
        kind: ResourceKind,
        id: i64,
        patch: &Value,
    ) -> Result<Record, ClientError> {
        let spec = kind.spec();
        let updated = self
            .try_update(spec, id, patch)
            .await
            .map_err(|e| self.failed(spec, Operation::Update, e))?;
        info!(resource = %kind, id, "updated");
        self.notify(Notification::success(
            format!("{} updated", capitalized(spec.label)),
            format!("id {}", id),
        ));
        Ok(updated)
    }

    async fn try_update(
        &self,
        spec: &ResourceSpec,
        id: i64,
        patch: &Value,
    ) -> Result<Record, ClientError> {
        let (method, path) = spec
            .update_route(id)
            .ok_or_else(|| ClientError::unsupported(spec.kind, "update"))?;
        let patch = payload_record(patch)?;
        let _pending = self
            .inner
            .pending
            .begin(MutationKey::on(spec.kind, Operation::Update, id))?;

        let before = self.inner.cache.find_record(spec.kind, id);
        let method = match method {
            UpdateMethod::Put => Method::Put,
            UpdateMethod::Patch => Method::Patch,
        };
        let request =
            ApiRequest::new(method, path).with_body(RequestBody::Json(patch.to_wire()));
        let response = self.send_classified(spec, request, Some(id)).await?;

        let updated = match response.body_json()? {
            Value::Object(map) => Record::try_from(Value::Object(map))?,
            // Some endpoints answer with a message only.
            _ => {
                let mut merged = before.clone().unwrap_or_default();
                merged.overlay(&patch);
                merged.set("id", Value::from(id));
                merged
            }
        };

        let mut touched: Vec<&Record> = vec![&updated];
        if let Some(before) = &before {
            touched.push(before);
        }
        self.apply(InvalidationPlan::for_mutation(spec.kind, &touched))
            .await;
        Ok(updated)
    }

    /// Delete record `id` once the user has confirmed.
    ///
    /// A record that is already gone fails with `NotFound` and is dropped
    /// from every cached collection still showing it.
    pub async fn delete(
        &self,
        kind: ResourceKind,
        id: i64,
        confirmation: Confirmation,
    ) -> Result<DeleteOutcome, ClientError> {
        if confirmation == Confirmation::Declined {
            debug!(resource = %kind, id, "delete declined");
            return Ok(DeleteOutcome::Declined);
        }
        let spec = kind.spec();
        match self.try_delete(spec, id).await {
            Ok(()) => {
                info!(resource = %kind, id, "deleted");
                self.notify(Notification::success(
                    format!("{} deleted", capitalized(spec.label)),
                    format!("id {}", id),
                ));
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                if e.is_not_found() {
                    self.inner.cache.remove_record(kind, id);
                }
                Err(self.failed(spec, Operation::Delete, e))
            }
        }
    }

    async fn try_delete(&self, spec: &ResourceSpec, id: i64) -> Result<(), ClientError> {
        let path = spec
            .item_path(id)
            .filter(|_| spec.delete)
            .ok_or_else(|| ClientError::unsupported(spec.kind, "delete"))?;
        let _pending = self
            .inner
            .pending
            .begin(MutationKey::on(spec.kind, Operation::Delete, id))?;

        let before = self.inner.cache.find_record(spec.kind, id);
        self.send_classified(spec, ApiRequest::delete(path), Some(id))
            .await?;

        let touched: Vec<&Record> = before.iter().collect();
        self.apply(InvalidationPlan::for_mutation(spec.kind, &touched))
            .await;
        Ok(())
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    /// Invalidate every cached collection matching `plan`, then refetch
    /// them concurrently. Returns the keys that were refetched.
    pub async fn apply(&self, plan: InvalidationPlan) -> Vec<QueryKey> {
        let keys = self.inner.cache.invalidate_where(|k| plan.matches(k));
        let mut set = JoinSet::new();
        for key in keys.iter().cloned() {
            let Some(epoch) = self.inner.cache.epoch(&key) else {
                continue;
            };
            let client = self.clone();
            set.spawn(async move { client.fetch(&key, Join::Covers(epoch)).await });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "refetch task failed");
            }
        }
        keys
    }

    /// Send `request` and map non-2xx statuses onto [`ClientError`].
    pub(crate) async fn send_classified(
        &self,
        spec: &ResourceSpec,
        request: ApiRequest,
        id: Option<i64>,
    ) -> Result<ApiResponse, ClientError> {
        debug!(method = %request.method, target = %request.target(), "sending");
        let response = self.inner.transport.send(request).await?;
        classify(spec, response, id)
    }

    /// Report a failed operation and hand the error back.
    fn failed(&self, spec: &ResourceSpec, operation: Operation, err: ClientError) -> ClientError {
        warn!(resource = %spec.kind, operation = %operation, error = %err, "operation failed");
        let title = match &err {
            ClientError::Unauthorized { .. } => "Unauthorized".to_string(),
            _ => format!("Failed to {} {}", operation.verb(), spec.label),
        };
        self.notify(Notification::error(title, err.to_string()));
        err
    }
}

/// Map a response status onto the error taxonomy. 2xx passes through.
pub(crate) fn classify(
    spec: &ResourceSpec,
    response: ApiResponse,
    id: Option<i64>,
) -> Result<ApiResponse, ClientError> {
    if response.is_success() {
        return Ok(response);
    }
    let message = response.error_message();
    Err(match response.status {
        401 | 403 => ClientError::Unauthorized {
            message: message.unwrap_or_else(|| "Not authenticated".to_string()),
        },
        404 => ClientError::NotFound {
            resource: spec.kind,
            id: id.unwrap_or_default(),
            message: message.unwrap_or_else(|| format!("{} not found", capitalized(spec.label))),
        },
        400 | 409 | 422 => ClientError::Validation {
            message: message.unwrap_or_else(|| "The request was rejected".to_string()),
        },
        status => ClientError::Server {
            status,
            message: message.unwrap_or_else(|| "Unexpected server response".to_string()),
        },
    })
}

fn payload_record(payload: &Value) -> Result<Record, ClientError> {
    if !payload.is_object() {
        return Err(ClientError::Validation {
            message: "payload must be a JSON object".to_string(),
        });
    }
    Ok(Record::from_json(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldops_transport::MemoryTransport;
    use serde_json::json;

    fn client() -> (Arc<MemoryTransport>, FieldOpsClient) {
        let memory = Arc::new(MemoryTransport::new());
        let client = FieldOpsClient::new(memory.clone(), ClientConfig::default());
        (memory, client)
    }

    #[test]
    fn classify_maps_statuses() {
        let spec = ResourceKind::Tasks.spec();
        let err = classify(spec, ApiResponse::json(404, &json!({})), Some(42)).unwrap_err();
        assert_eq!(err.to_string(), "Task not found");
        let err = classify(
            spec,
            ApiResponse::json(400, &json!({"message": "title is required"})),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::Validation { ref message } if message == "title is required"));
        let err = classify(spec, ApiResponse::json(403, &json!({})), None).unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized { .. }));
        let err = classify(spec, ApiResponse::new(502, Vec::new()), None).unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 502, .. }));
    }

    #[tokio::test]
    async fn cached_list_is_served_without_request() {
        let (memory, client) = client();
        memory.seed(ResourceKind::Customers, json!({"name": "Acme"}));
        let first = client
            .list(ResourceKind::Customers, Scope::All, Filters::new())
            .await;
        assert_eq!(first.records.len(), 1);
        let again = client
            .list(ResourceKind::Customers, Scope::All, Filters::new())
            .await;
        assert!(Arc::ptr_eq(&first.records, &again.records));
        assert_eq!(memory.request_count("GET /api/customers"), 1);
    }

    #[tokio::test]
    async fn unsupported_operations_send_nothing() {
        let (memory, client) = client();
        let err = client
            .update(ResourceKind::DailyReports, 1, &json!({"work_done": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unsupported { .. }));
        let snap = client
            .list(ResourceKind::Customers, Scope::Mine, Filters::new())
            .await;
        assert!(matches!(snap.status, CollectionStatus::Failed { .. }));
        assert!(memory.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_required_field_is_validation_error() {
        let (memory, client) = client();
        let err = client
            .create(ResourceKind::Tasks, &json!({"priority": "high"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation { ref message } if message == "title is required"));
        assert!(memory.requests().is_empty());
    }

    #[tokio::test]
    async fn get_falls_back_to_list_for_resources_without_item_endpoint() {
        let (memory, client) = client();
        let id = memory.seed(
            ResourceKind::SystemDetails,
            json!({"systemName": "PC-7", "customerId": 1}),
        );
        let record = client.get(ResourceKind::SystemDetails, id).await.unwrap();
        assert_eq!(record.str_field("system_name"), Some("PC-7"));
        let err = client
            .get(ResourceKind::SystemDetails, id + 100)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn declined_delete_sends_nothing() {
        let (memory, client) = client();
        let id = memory.seed(ResourceKind::Customers, json!({"name": "Acme"}));
        let outcome = client
            .delete(ResourceKind::Customers, id, Confirmation::Declined)
            .await
            .unwrap();
        assert_eq!(outcome, DeleteOutcome::Declined);
        assert!(memory.requests().is_empty());
        assert_eq!(memory.records(ResourceKind::Customers).len(), 1);
    }

    #[tokio::test]
    async fn complaint_update_uses_status_route() {
        let (memory, client) = client();
        let id = memory.seed(
            ResourceKind::Complaints,
            json!({"subject": "Van", "description": "flat tyre", "status": "open"}),
        );
        let updated = client
            .update(ResourceKind::Complaints, id, &json!({"status": "resolved"}))
            .await
            .unwrap();
        assert_eq!(updated.str_field("status"), Some("resolved"));
        assert_eq!(
            memory.request_count(&format!("PUT /api/complaints/{}/status", id)),
            1
        );
    }
}
