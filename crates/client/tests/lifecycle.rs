//! List / mutate / invalidate lifecycle against the in-memory API.

use std::sync::Arc;
use std::time::Duration;

use fieldops_client::{
    ClientConfig, ClientError, CollectingNotifier, CollectionStatus, Confirmation, ErrorClass,
    FieldOpsClient, Filters, QueryKey, RenderState, ResourceView,
};
use fieldops_interchange::{Record, ResourceKind, Scope, Task};
use fieldops_transport::{ApiRequest, ApiTransport, Injected, MemoryTransport, TransportError};
use serde_json::json;

fn setup() -> (Arc<MemoryTransport>, FieldOpsClient, Arc<CollectingNotifier>) {
    let memory = Arc::new(MemoryTransport::new());
    let notifier = Arc::new(CollectingNotifier::new());
    let client = FieldOpsClient::new(memory.clone(), ClientConfig::default())
        .with_notifier(notifier.clone());
    (memory, client, notifier)
}

fn ids(records: &[Record]) -> Vec<i64> {
    records.iter().filter_map(Record::id).collect()
}

fn titles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.str_field("title").map(str::to_string))
        .collect()
}

// ── Keys and fetch de-duplication ───────────────────────────────────

#[tokio::test]
async fn concurrent_reads_of_one_key_share_one_request() {
    let (memory, client, _) = setup();
    memory.seed(ResourceKind::Tasks, json!({"title": "a", "status": "pending"}));
    memory.delay("/api/tasks", Duration::from_millis(100));

    let pending = || client.list(ResourceKind::Tasks, Scope::All, Filters::new().with("status", "pending"));
    let (a, b, c) = tokio::join!(pending(), pending(), pending());

    assert_eq!(a.records.len(), 1);
    assert!(Arc::ptr_eq(&a.records, &b.records));
    assert!(Arc::ptr_eq(&b.records, &c.records));
    assert_eq!(memory.request_count("GET /api/tasks?status=pending"), 1);
}

#[tokio::test]
async fn each_filter_combination_is_fetched_separately() {
    let (memory, client, _) = setup();
    memory.seed(ResourceKind::Tasks, json!({"title": "a", "status": "pending"}));
    memory.seed(ResourceKind::Tasks, json!({"title": "b", "status": "completed"}));

    let pending = client
        .list(ResourceKind::Tasks, Scope::All, Filters::new().with("status", "pending"))
        .await;
    let completed = client
        .list(ResourceKind::Tasks, Scope::All, Filters::new().with("status", "completed"))
        .await;
    assert_eq!(titles(&pending.records), vec!["a"]);
    assert_eq!(titles(&completed.records), vec!["b"]);
    assert_eq!(memory.request_count("status=pending"), 1);
    assert_eq!(memory.request_count("status=completed"), 1);
}

// ── Empty and degraded lists ────────────────────────────────────────

#[tokio::test]
async fn new_filter_with_no_matches_renders_empty_state() {
    let (memory, client, _) = setup();
    memory.seed(ResourceKind::Tasks, json!({"title": "a", "status": "pending"}));
    let mut view = ResourceView::new(client, ResourceKind::Tasks, Scope::All);
    view.set_filter("status", "cancelled");
    assert_eq!(view.load().await, RenderState::Empty);
    assert!(view.rows().is_empty());
}

#[tokio::test]
async fn unauthenticated_list_is_empty_without_error() {
    let (memory, client, notifier) = setup();
    memory.seed(ResourceKind::Customers, json!({"name": "Acme"}));
    memory.set_authenticated(false);

    let snap = client
        .list(ResourceKind::Customers, Scope::All, Filters::new())
        .await;
    assert!(snap.records.is_empty());
    assert_eq!(snap.status, CollectionStatus::SessionExpired);
    assert!(notifier.errors().is_empty());
}

#[tokio::test]
async fn transport_failure_degrades_to_flagged_empty_list() {
    let (memory, client, notifier) = setup();
    memory.seed(ResourceKind::Tasks, json!({"title": "a"}));
    memory.inject(Injected::Transport(TransportError::Unreachable {
        url: "http://localhost:5000/api/tasks".into(),
        message: "connection refused".into(),
    }));

    let snap = client.list(ResourceKind::Tasks, Scope::All, Filters::new()).await;
    assert!(snap.records.is_empty());
    assert!(matches!(snap.status, CollectionStatus::Failed { .. }));
    let errors = notifier.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Failed to load tasks");

    // Not retried automatically; the next read fetches again.
    let again = client.list(ResourceKind::Tasks, Scope::All, Filters::new()).await;
    assert_eq!(again.records.len(), 1);
}

// ── Mutations ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_invalidates_and_next_list_contains_record() {
    let (memory, client, notifier) = setup();
    let all = QueryKey::new(ResourceKind::Tasks, Scope::All, Filters::new());
    client.query(&all).await;
    client
        .list(ResourceKind::Tasks, Scope::Mine, Filters::new())
        .await;
    client
        .list(ResourceKind::Tasks, Scope::Customer(7), Filters::new())
        .await;
    client
        .list(ResourceKind::Tasks, Scope::Customer(8), Filters::new())
        .await;

    let created = client
        .create(
            ResourceKind::Tasks,
            &json!({"title": "Printer issue", "priority": "high", "customerId": 7}),
        )
        .await
        .unwrap();
    assert!(created.id().is_some());
    assert_eq!(created.str_field("ticket_number").map(|s| s.starts_with("TKT-")), Some(true));
    let task: Task = created.decode().unwrap();
    assert_eq!(task.customer_id, Some(7));
    assert_eq!(task.priority.as_deref(), Some("high"));

    let snap = client.query(&all).await;
    assert!(snap.is_fresh());
    assert_eq!(titles(&snap.records), vec!["Printer issue"]);
    assert_eq!(memory.request_count("GET /api/tasks"), 4);
    assert_eq!(memory.request_count("GET /api/tasks/my-tasks"), 2);
    assert_eq!(memory.request_count("GET /api/customers/7/tasks"), 2);
    assert_eq!(memory.request_count("GET /api/customers/8/tasks"), 1);

    let mine = client.list(ResourceKind::Tasks, Scope::Mine, Filters::new()).await;
    assert_eq!(titles(&mine.records), vec!["Printer issue"]);
    assert_eq!(notifier.all().last().map(|n| n.title.as_str()), Some("Task created"));
}

#[tokio::test]
async fn update_of_missing_id_is_not_found_and_cache_unchanged() {
    let (memory, client, notifier) = setup();
    memory.seed(ResourceKind::Tasks, json!({"id": 1, "title": "a", "status": "pending"}));
    let before = client.list(ResourceKind::Tasks, Scope::All, Filters::new()).await;

    let err = client
        .update(ResourceKind::Tasks, 42, &json!({"status": "completed"}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert_eq!(err.to_string(), "Task not found");

    let after = client.list(ResourceKind::Tasks, Scope::All, Filters::new()).await;
    assert!(Arc::ptr_eq(&before.records, &after.records));
    assert!(after.is_fresh());
    assert_eq!(memory.request_count("GET /api/tasks"), 1);
    assert_eq!(notifier.errors()[0].title, "Failed to update task");
}

#[tokio::test]
async fn update_moving_parent_refetches_old_and_new_parent() {
    let (memory, client, _) = setup();
    let id = memory.seed(
        ResourceKind::CctvRecords,
        json!({"customerId": 1, "cameraIp": "10.0.0.5"}),
    );
    for c in [1, 2, 3] {
        client
            .list(ResourceKind::CctvRecords, Scope::Customer(c), Filters::new())
            .await;
    }

    client
        .update(ResourceKind::CctvRecords, id, &json!({"customerId": 2}))
        .await
        .unwrap();

    assert_eq!(memory.request_count("/api/customers/1/cctv-information"), 2);
    assert_eq!(memory.request_count("/api/customers/2/cctv-information"), 2);
    assert_eq!(memory.request_count("/api/customers/3/cctv-information"), 1);
    let moved = client
        .list(ResourceKind::CctvRecords, Scope::Customer(2), Filters::new())
        .await;
    assert_eq!(ids(&moved.records), vec![id]);
    let old = client
        .list(ResourceKind::CctvRecords, Scope::Customer(1), Filters::new())
        .await;
    assert!(old.records.is_empty());
}

#[tokio::test]
async fn delete_of_already_deleted_id_is_not_found_and_prunes_it() {
    let (memory, client, notifier) = setup();
    let gone = memory.seed(ResourceKind::Tasks, json!({"title": "gone"}));
    let kept = memory.seed(ResourceKind::Tasks, json!({"title": "kept"}));
    let snap = client.list(ResourceKind::Tasks, Scope::All, Filters::new()).await;
    assert_eq!(snap.records.len(), 2);

    // Someone else deletes it first.
    memory
        .send(ApiRequest::delete(format!("/api/tasks/{}", gone)))
        .await
        .unwrap();

    let err = client
        .delete(ResourceKind::Tasks, gone, Confirmation::Confirmed)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let snap = client.list(ResourceKind::Tasks, Scope::All, Filters::new()).await;
    assert_eq!(ids(&snap.records), vec![kept]);
    assert_eq!(notifier.errors()[0].title, "Failed to delete task");
}

#[tokio::test]
async fn delete_refetches_affected_collections() {
    let (memory, client, _) = setup();
    let id = memory.seed(ResourceKind::Customers, json!({"name": "Acme"}));
    client.list(ResourceKind::Customers, Scope::All, Filters::new()).await;
    client
        .list(ResourceKind::Tasks, Scope::Customer(id), Filters::new())
        .await;

    client
        .delete(ResourceKind::Customers, id, Confirmation::Confirmed)
        .await
        .unwrap();
    let snap = client.list(ResourceKind::Customers, Scope::All, Filters::new()).await;
    assert!(snap.records.is_empty());
    assert_eq!(memory.request_count(&format!("/api/customers/{}/tasks", id)), 2);
}

#[tokio::test]
async fn duplicate_submission_is_rejected_while_pending() {
    let (memory, client, _) = setup();
    let id = memory.seed(ResourceKind::Tasks, json!({"title": "a"}));
    memory.delay(&format!("/api/tasks/{}", id), Duration::from_millis(100));

    let patch = json!({"status": "in_progress"});
    let (first, second) = tokio::join!(
        client.update(ResourceKind::Tasks, id, &patch),
        client.update(ResourceKind::Tasks, id, &patch),
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(ClientError::DuplicateSubmission { .. })));
    assert_eq!(memory.request_count("PUT /api/tasks/"), 1);
    assert!(client.pending().is_empty());
}

#[tokio::test]
async fn unauthorized_mutation_raises_unauthorized_notification() {
    let (memory, client, notifier) = setup();
    memory.set_authenticated(false);
    let err = client
        .create(ResourceKind::Customers, &json!({"name": "Acme"}))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Authorization);
    assert_eq!(notifier.errors()[0].title, "Unauthorized");
}

#[tokio::test]
async fn failed_mutation_leaves_cache_untouched() {
    let (memory, client, _) = setup();
    memory.seed(ResourceKind::Customers, json!({"name": "Acme"}));
    let before = client.list(ResourceKind::Customers, Scope::All, Filters::new()).await;
    memory.inject(Injected::Transport(TransportError::Timeout {
        url: "http://localhost:5000/api/customers".into(),
        timeout_ms: 30_000,
    }));

    let err = client
        .create(ResourceKind::Customers, &json!({"name": "Beta"}))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transport);
    let after = client.list(ResourceKind::Customers, Scope::All, Filters::new()).await;
    assert!(Arc::ptr_eq(&before.records, &after.records));
}

#[tokio::test]
async fn server_validation_message_is_surfaced_verbatim() {
    let (memory, client, _) = setup();
    memory.inject(Injected::Status {
        status: 422,
        message: "Email already exists".into(),
    });
    let err = client
        .create(ResourceKind::Customers, &json!({"name": "Acme"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation { ref message } if message == "Email already exists"));
}

#[tokio::test]
async fn comment_refetches_task_comments_and_history() {
    let (memory, client, _) = setup();
    let task = memory.seed(ResourceKind::Tasks, json!({"title": "Fiber cut"}));
    client
        .list(ResourceKind::TaskComments, Scope::Task(task), Filters::new())
        .await;
    client
        .list(ResourceKind::TaskHistory, Scope::Task(task), Filters::new())
        .await;

    client
        .create(
            ResourceKind::TaskComments,
            &json!({"taskId": task, "comment": "Splice done"}),
        )
        .await
        .unwrap();

    let comments = client
        .list(ResourceKind::TaskComments, Scope::Task(task), Filters::new())
        .await;
    assert_eq!(comments.records.len(), 1);
    let history = client
        .list(ResourceKind::TaskHistory, Scope::Task(task), Filters::new())
        .await;
    assert!(history
        .records
        .iter()
        .any(|r| r.str_field("type") == Some("comment")));
}

#[tokio::test]
async fn next_serial_is_length_plus_one() {
    let (memory, client, _) = setup();
    for i in 0..3 {
        memory.seed(ResourceKind::CctvRecords, json!({ "serialNumber": i + 1 }));
    }
    assert_eq!(
        client
            .suggest_next_serial(ResourceKind::CctvRecords, Scope::All)
            .await,
        4
    );
}

// ── Views ───────────────────────────────────────────────────────────

#[tokio::test]
async fn switching_filters_back_never_shows_the_other_response() {
    let (memory, client, _) = setup();
    memory.seed(ResourceKind::Tasks, json!({"title": "p1", "status": "pending"}));
    memory.seed(ResourceKind::Tasks, json!({"title": "c1", "status": "completed"}));
    memory.delay("status=completed", Duration::from_millis(200));

    let mut view = ResourceView::new(client.clone(), ResourceKind::Tasks, Scope::All);
    view.set_filter("status", "pending");
    assert_eq!(view.load().await, RenderState::Rows(1));

    view.set_filter("status", "completed");
    view.set_filter("status", "pending");
    assert_eq!(titles(&view.rows()), vec!["p1"]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(view.render(), RenderState::Rows(1));
    assert_eq!(titles(&view.rows()), vec!["p1"]);

    // The abandoned fetch still populated the shared cache.
    let completed = QueryKey::new(
        ResourceKind::Tasks,
        Scope::All,
        Filters::new().with("status", "completed"),
    );
    let snap = client.cache().snapshot(&completed).unwrap();
    assert_eq!(titles(&snap.records), vec!["c1"]);
}

#[tokio::test]
async fn returning_to_a_recent_filter_shows_its_rows_at_once() {
    let (memory, client, _) = setup();
    memory.seed(ResourceKind::Tasks, json!({"title": "p1", "status": "pending"}));
    memory.seed(ResourceKind::Tasks, json!({"title": "c1", "status": "completed"}));

    let mut view = ResourceView::new(client.clone(), ResourceKind::Tasks, Scope::All);
    view.set_filter("status", "pending");
    view.load().await;
    view.set_filter("status", "completed");
    view.load().await;

    view.set_filter("status", "pending");
    assert_eq!(view.render(), RenderState::Rows(1));
    assert_eq!(titles(&view.rows()), vec!["p1"]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(memory.request_count("status=pending"), 1);
    assert_eq!(memory.request_count("status=completed"), 1);
}

#[tokio::test]
async fn viewed_collection_is_refetched_once_per_mutation() {
    let (memory, client, _) = setup();
    let view = ResourceView::new(client.clone(), ResourceKind::Customers, Scope::All);
    assert_eq!(view.load().await, RenderState::Empty);

    client
        .create(ResourceKind::Customers, &json!({"name": "Acme"}))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(memory.request_count("GET /api/customers"), 2);
    assert_eq!(view.render(), RenderState::Rows(1));
}

#[tokio::test]
async fn typing_a_search_keeps_the_cache_bounded() {
    let memory = Arc::new(MemoryTransport::new());
    let mut config = ClientConfig::default();
    config.cache.unviewed_capacity = 1;
    let client = FieldOpsClient::new(memory.clone(), config);
    memory.seed(ResourceKind::Tasks, json!({"title": "acme gate"}));
    memory.delay("/api/tasks", Duration::from_millis(20));

    let mut view = ResourceView::new(client.clone(), ResourceKind::Tasks, Scope::All);
    for text in ["a", "ac", "acm", "acme", "acme ", "acme g"] {
        view.set_search(text);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let cache = client.cache();
    assert!(cache.unviewed_keys().len() <= 1, "{:?}", cache.unviewed_keys());
    assert!(cache.len() <= 5, "{} entries", cache.len());
    assert_eq!(titles(&view.rows()), vec!["acme gate"]);

    let before = memory.request_count("GET /api/tasks");
    client
        .apply(fieldops_client::InvalidationPlan::whole_resource(
            ResourceKind::Tasks,
        ))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(memory.request_count("GET /api/tasks") - before <= 5);
}

#[tokio::test]
async fn direct_lists_beyond_capacity_evict_the_oldest() {
    let memory = Arc::new(MemoryTransport::new());
    let mut config = ClientConfig::default();
    config.cache.unviewed_capacity = 3;
    let client = FieldOpsClient::new(memory.clone(), config);

    for i in 0..10 {
        client
            .list(
                ResourceKind::Customers,
                Scope::All,
                Filters::new().with("search", &format!("c{}", i)),
            )
            .await;
    }
    let key = |text: &str| {
        QueryKey::new(
            ResourceKind::Customers,
            Scope::All,
            Filters::new().with("search", text),
        )
    };
    assert_eq!(client.cache().len(), 3);
    assert!(client.cache().snapshot(&key("c9")).is_some());
    assert!(client.cache().snapshot(&key("c0")).is_none());
}

#[tokio::test]
async fn polling_picks_up_server_side_changes_and_stops_on_drop() {
    let (memory, client, _) = setup();
    let mut view = ResourceView::new(client, ResourceKind::Tasks, Scope::All);
    assert_eq!(view.load().await, RenderState::Empty);
    view.start_polling(Duration::from_millis(30));

    memory.seed(ResourceKind::Tasks, json!({"title": "from elsewhere"}));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(titles(&view.rows()), vec!["from elsewhere"]);

    drop(view);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let seen = memory.request_count("GET /api/tasks");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(memory.request_count("GET /api/tasks"), seen);
}

#[tokio::test]
async fn view_refetches_when_its_key_is_invalidated() {
    let (memory, client, _) = setup();
    let view = ResourceView::new(client.clone(), ResourceKind::Complaints, Scope::All);
    assert_eq!(view.load().await, RenderState::Empty);

    memory.seed(
        ResourceKind::Complaints,
        json!({"subject": "Van", "description": "flat tyre"}),
    );
    client
        .apply(fieldops_client::InvalidationPlan::whole_resource(
            ResourceKind::Complaints,
        ))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(view.render(), RenderState::Rows(1));
}
