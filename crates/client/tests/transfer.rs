//! CSV export/import and CCTV bulk upload.

use std::sync::Arc;

use fieldops_client::{
    ClientConfig, ClientError, CollectingNotifier, ErrorClass, FieldOpsClient, Filters, Level,
    QueryKey,
};
use fieldops_interchange::{ResourceKind, Scope};
use fieldops_transport::MemoryTransport;
use serde_json::json;

fn setup() -> (Arc<MemoryTransport>, FieldOpsClient, Arc<CollectingNotifier>) {
    let memory = Arc::new(MemoryTransport::new());
    let notifier = Arc::new(CollectingNotifier::default());
    let client = FieldOpsClient::new(memory.clone(), ClientConfig::default())
        .with_notifier(notifier.clone());
    (memory, client, notifier)
}

#[tokio::test]
async fn export_uses_server_file_name() {
    let (memory, client, _) = setup();
    memory.seed(
        ResourceKind::Customers,
        json!({"customerId": "C-9", "name": "Acme, Inc."}),
    );
    let file = client.export(ResourceKind::Customers).await.unwrap();
    assert!(file.file_name.starts_with("customers-export-"));
    assert!(file.file_name.ends_with(".csv"));

    let text = String::from_utf8(file.bytes).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("Customer ID,Name"));
    assert!(lines.next().unwrap().starts_with("C-9,\"Acme, Inc.\""));
}

#[tokio::test]
async fn import_reports_counts_and_refetches_customers() {
    let (memory, client, notifier) = setup();
    memory.seed(
        ResourceKind::Customers,
        json!({"customerId": "C-1", "name": "Old name"}),
    );
    let key = QueryKey::new(ResourceKind::Customers, Scope::All, Filters::new());
    let before = client
        .list(ResourceKind::Customers, Scope::All, Filters::new())
        .await;
    assert_eq!(before.records.len(), 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("customers.csv");
    std::fs::write(&path, "Customer ID,Name\nC-1,Acme\nC-2,\nC-3,Beta\n").unwrap();

    let summary = client.import(ResourceKind::Customers, &path).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.error_details.len(), 1);

    assert_eq!(memory.request_count("GET /api/customers"), 2);
    let after = client.cache().snapshot(&key).unwrap();
    assert_eq!(after.records.len(), 2);
    assert!(after
        .records
        .iter()
        .any(|r| r.str_field("name") == Some("Acme")));
    assert!(notifier
        .take()
        .iter()
        .any(|n| n.level == Level::Success && n.title == "Import complete"));
}

#[tokio::test]
async fn import_of_missing_file_fails_without_request() {
    let (memory, client, notifier) = setup();
    let err = client
        .import(
            ResourceKind::Customers,
            std::path::Path::new("/no/such/file.csv"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Read { ref path, .. } if path == "/no/such/file.csv"));
    assert_eq!(err.class(), ErrorClass::Transport);
    assert!(memory.requests().is_empty());
    assert_eq!(notifier.take()[0].title, "Failed to import customers");
}

#[tokio::test]
async fn import_template_is_downloadable() {
    let (_memory, client, _) = setup();
    let file = client
        .import_template(ResourceKind::Customers)
        .await
        .unwrap();
    assert_eq!(file.file_name, "customer-import-template.csv");
    assert!(String::from_utf8_lossy(&file.bytes).starts_with("Customer ID,"));
}

#[tokio::test]
async fn export_is_unsupported_for_tasks() {
    let (memory, client, _) = setup();
    let err = client.export(ResourceKind::Tasks).await.unwrap_err();
    assert!(matches!(err, ClientError::Unsupported { .. }));
    assert!(memory.requests().is_empty());
}

#[tokio::test]
async fn bulk_cctv_refetches_the_customer_collection() {
    let (memory, client, _) = setup();
    let key = QueryKey::new(ResourceKind::CctvRecords, Scope::Customer(5), Filters::new());
    let before = client
        .list(ResourceKind::CctvRecords, Scope::Customer(5), Filters::new())
        .await;
    assert!(before.records.is_empty());

    let created = client
        .bulk_create_cctv(&[
            json!({"customerId": 5, "serialNumber": "CAM-1", "cameraIp": "10.0.0.11"}),
            json!({"customerId": 5, "serialNumber": "CAM-2", "cameraIp": "10.0.0.12"}),
        ])
        .await
        .unwrap();
    assert_eq!(created.count, 2);
    assert_eq!(created.records.len(), 2);

    assert_eq!(
        memory.request_count("GET /api/customers/5/cctv-information"),
        2
    );
    let cached = client.cache().snapshot(&key).unwrap();
    assert_eq!(cached.records.len(), 2);
}

#[tokio::test]
async fn bulk_cctv_rejects_empty_input() {
    let (memory, client, _) = setup();
    let err = client.bulk_create_cctv(&[]).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation { .. }));
    assert!(memory.requests().is_empty());
}
