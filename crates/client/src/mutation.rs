//! In-flight mutation tracking.
//!
//! While a create/update/delete is pending, an identical second submission
//! is rejected; this is the equivalent of disabling the submit control.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use fieldops_interchange::{Operation, ResourceKind};

use crate::error::ClientError;

/// Identity of a pending mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub resource: ResourceKind,
    pub operation: Operation,
    /// Target id for update/delete.
    pub target: Option<i64>,
    /// Serialized payload for creates, which have no id yet.
    pub fingerprint: Option<String>,
}

impl MutationKey {
    pub fn create(resource: ResourceKind, payload: &serde_json::Value) -> Self {
        MutationKey {
            resource,
            operation: Operation::Create,
            target: None,
            fingerprint: Some(payload.to_string()),
        }
    }

    pub fn on(resource: ResourceKind, operation: Operation, id: i64) -> Self {
        MutationKey {
            resource,
            operation,
            target: Some(id),
            fingerprint: None,
        }
    }
}

/// The set of mutations currently in flight.
#[derive(Debug, Clone, Default)]
pub struct PendingMutations {
    inner: Arc<Mutex<HashSet<MutationKey>>>,
}

impl PendingMutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` pending until the returned guard is dropped.
    pub fn begin(&self, key: MutationKey) -> Result<PendingGuard, ClientError> {
        let mut set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return Err(ClientError::DuplicateSubmission {
                resource: key.resource,
                operation: key.operation,
            });
        }
        Ok(PendingGuard {
            set: self.inner.clone(),
            key,
        })
    }

    pub fn is_pending(&self, key: &MutationKey) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clears its mutation from the pending set on drop, including when the
/// mutation future is cancelled.
#[derive(Debug)]
pub struct PendingGuard {
    set: Arc<Mutex<HashSet<MutationKey>>>,
    key: MutationKey,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
