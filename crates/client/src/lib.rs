//! fieldops-client: the list / filter / mutate / invalidate lifecycle shared
//! by every resource page, and the base64 upload helper.
//!
//! [`FieldOpsClient`] is generic over the resource route table in
//! `fieldops-interchange`. Collections are cached per [`QueryKey`]
//! (resource, scope, filters); a successful mutation invalidates and
//! refetches exactly the collections that could contain the affected
//! record, including collections scoped to its parent customer or ticket.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use fieldops_client::{ClientConfig, Confirmation, FieldOpsClient, Filters};
//! use fieldops_interchange::{ResourceKind, Scope};
//!
//! let client = FieldOpsClient::connect(ClientConfig::load(None)?);
//! let pending = client
//!     .list(ResourceKind::Tasks, Scope::All, Filters::new().with("status", "pending"))
//!     .await;
//! println!("{} pending tickets", pending.records.len());
//!
//! client
//!     .create(ResourceKind::Tasks, &serde_json::json!({"title": "Printer issue"}))
//!     .await?;
//! client.delete(ResourceKind::Tasks, 42, Confirmation::Confirmed).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod client;
pub mod config;
mod error;
pub mod filter;
pub mod invalidation;
mod mutation;
pub mod notify;
mod query;
mod transfer;
mod upload;
mod view;

pub use cache::{CacheEvent, CollectionStatus, QueryCache, Snapshot};
pub use client::{Confirmation, DeleteOutcome, FieldOpsClient};
pub use config::{CacheConfig, ClientConfig, ConfigError, UploadConfig};
pub use error::{ClientError, ErrorClass, UploadError};
pub use invalidation::InvalidationPlan;
pub use mutation::{MutationKey, PendingGuard, PendingMutations};
pub use notify::{CollectingNotifier, Level, LogNotifier, Notification, Notifier};
pub use query::{Filters, QueryKey};
pub use transfer::{default_export_name, disposition_file_name, BulkCreated, ExportFile};
pub use upload::{
    mime_for, ProgressCallback, UploadHandle, UploadOptions, UploadPolicy, UploadTarget,
};
pub use view::{RenderState, ResourceView};
