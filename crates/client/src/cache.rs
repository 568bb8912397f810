//! The shared query cache.
//!
//! One entry per [`QueryKey`]. An entry's rows are an `Arc<Vec<Record>>`
//! that is only ever replaced whole, so readers never observe a partially
//! updated collection. The entry map sits behind a `std::sync::Mutex` held
//! for short, non-async sections; each key also owns a `tokio` mutex that
//! serializes fetches so concurrent readers share one request.
//!
//! Invalidation marks entries stale and bumps their epoch. A fetch records
//! the epoch it started under; if the key was invalidated while the fetch
//! was in flight, the result is stored but the entry stays stale.
//!
//! Entries referenced by a view live until the last view releases them.
//! Entries no view references are kept up to a fixed capacity, oldest
//! fetch evicted first. An entry is never removed while a fetch holds or
//! waits on its lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use fieldops_interchange::{Record, ResourceKind};
use tokio::sync::broadcast;
use tracing::debug;

use crate::query::QueryKey;

/// Fetch state of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    /// Never fetched, or first fetch in flight.
    Loading,
    Ready,
    /// The server answered 401; rows are empty, not an error.
    SessionExpired,
    /// The last fetch failed; rows are empty.
    Failed { message: String },
}

/// A point-in-time view of one cached collection.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Arc<Vec<Record>>,
    pub status: CollectionStatus,
    pub stale: bool,
    pub fetched_at: Option<Instant>,
}

impl Snapshot {
    pub fn is_fresh(&self) -> bool {
        !self.stale && self.fetched_at.is_some() && self.status == CollectionStatus::Ready
    }
}

/// Published on every cache change; views refetch on `Invalidated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Invalidated(QueryKey),
    Updated(QueryKey),
}

struct Entry {
    records: Arc<Vec<Record>>,
    status: CollectionStatus,
    stale: bool,
    epoch: u64,
    /// Epoch of the last fetch that landed without being invalidated.
    fetched_epoch: Option<u64>,
    fetched_at: Option<Instant>,
    /// Store order, for eviction.
    stored_seq: u64,
    fetch_lock: Arc<tokio::sync::Mutex<()>>,
    views: usize,
}

impl Entry {
    fn new() -> Self {
        Entry {
            records: Arc::new(Vec::new()),
            status: CollectionStatus::Loading,
            stale: false,
            epoch: 0,
            fetched_epoch: None,
            fetched_at: None,
            stored_seq: 0,
            fetch_lock: Arc::new(tokio::sync::Mutex::new(())),
            views: 0,
        }
    }

    /// A fetch is running or queued on this key.
    fn busy(&self) -> bool {
        Arc::strong_count(&self.fetch_lock) > 1
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self.records.clone(),
            status: self.status.clone(),
            stale: self.stale,
            fetched_at: self.fetched_at,
        }
    }
}

/// Unviewed entries kept by default.
pub const DEFAULT_UNVIEWED_CAPACITY: usize = 32;

pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    events: broadcast::Sender<CacheEvent>,
    unviewed_capacity: usize,
    store_seq: AtomicU64,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_unviewed_capacity(DEFAULT_UNVIEWED_CAPACITY)
    }

    /// A cache keeping at most `capacity` entries that no view references.
    pub fn with_unviewed_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(256);
        QueryCache {
            entries: Mutex::new(HashMap::new()),
            events,
            unviewed_capacity: capacity,
            store_seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self, key: &QueryKey) -> Option<Snapshot> {
        self.lock().get(key).map(Entry::snapshot)
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The per-key fetch mutex, creating the entry on first use.
    pub(crate) fn fetch_lock(&self, key: &QueryKey) -> Arc<tokio::sync::Mutex<()>> {
        self.lock()
            .entry(key.clone())
            .or_insert_with(Entry::new)
            .fetch_lock
            .clone()
    }

    /// Epoch a fetch of `key` starts under.
    pub(crate) fn begin_fetch(&self, key: &QueryKey) -> u64 {
        self.lock()
            .entry(key.clone())
            .or_insert_with(Entry::new)
            .epoch
    }

    /// Current invalidation epoch of `key`.
    pub(crate) fn epoch(&self, key: &QueryKey) -> Option<u64> {
        self.lock().get(key).map(|e| e.epoch)
    }

    /// The snapshot of `key` if a fetch started at or after `epoch` has
    /// already landed.
    pub(crate) fn covering(&self, key: &QueryKey, epoch: u64) -> Option<Snapshot> {
        self.lock()
            .get(key)
            .filter(|e| !e.stale && e.fetched_epoch.is_some_and(|f| f >= epoch))
            .map(Entry::snapshot)
    }

    /// Replace the rows of `key` with a fetch result.
    pub(crate) fn store(
        &self,
        key: &QueryKey,
        epoch: u64,
        records: Vec<Record>,
        status: CollectionStatus,
    ) -> Snapshot {
        let fetched_at = Some(Instant::now());
        let snapshot = {
            let mut entries = self.lock();
            let snapshot = match entries.get_mut(key) {
                Some(entry) => {
                    entry.records = Arc::new(records);
                    entry.status = status;
                    entry.fetched_at = fetched_at;
                    entry.stored_seq = self.store_seq.fetch_add(1, Ordering::Relaxed) + 1;
                    entry.stale = entry.epoch != epoch;
                    if entry.stale {
                        debug!(key = %key, "fetch finished after invalidation; entry left stale");
                    } else {
                        entry.fetched_epoch = Some(epoch);
                    }
                    entry.snapshot()
                }
                // Evicted while the result was in flight; hand it back
                // without re-creating the entry.
                None => Snapshot {
                    records: Arc::new(records),
                    status,
                    stale: false,
                    fetched_at,
                },
            };
            self.evict_unviewed(&mut entries, key);
            snapshot
        };
        self.publish(CacheEvent::Updated(key.clone()));
        snapshot
    }

    /// Drop the oldest idle unviewed entries beyond capacity. `stored` was
    /// just written by a fetch that still holds its lock; it counts as idle
    /// unless another fetch is queued behind it.
    fn evict_unviewed(&self, entries: &mut HashMap<QueryKey, Entry>, stored: &QueryKey) {
        let unviewed = entries.values().filter(|e| e.views == 0).count();
        if unviewed <= self.unviewed_capacity {
            return;
        }
        let mut idle: Vec<(QueryKey, u64)> = entries
            .iter()
            .filter(|(k, e)| {
                let holders = Arc::strong_count(&e.fetch_lock);
                e.views == 0 && (holders == 1 || (*k == stored && holders == 2))
            })
            .map(|(k, e)| (k.clone(), e.stored_seq))
            .collect();
        idle.sort_by_key(|(_, seq)| *seq);
        for (key, _) in idle.into_iter().take(unviewed - self.unviewed_capacity) {
            entries.remove(&key);
            debug!(key = %key, "evicted unviewed collection");
        }
    }

    /// Mark every entry matching `pred` stale. Returns the affected keys.
    pub fn invalidate_where<P>(&self, pred: P) -> Vec<QueryKey>
    where
        P: Fn(&QueryKey) -> bool,
    {
        let keys: Vec<QueryKey> = {
            let mut entries = self.lock();
            entries
                .iter_mut()
                .filter(|(k, _)| pred(*k))
                .map(|(k, entry)| {
                    entry.stale = true;
                    entry.epoch += 1;
                    k.clone()
                })
                .collect()
        };
        for key in &keys {
            debug!(key = %key, "invalidated");
            self.publish(CacheEvent::Invalidated(key.clone()));
        }
        keys
    }

    /// Drop record `id` from every cached collection of `resource`.
    ///
    /// Each affected collection is replaced whole; collections that do not
    /// contain the id are left untouched.
    pub fn remove_record(&self, resource: ResourceKind, id: i64) -> Vec<QueryKey> {
        let keys: Vec<QueryKey> = {
            let mut entries = self.lock();
            entries
                .iter_mut()
                .filter(|(k, entry)| {
                    k.resource == resource && entry.records.iter().any(|r| r.id() == Some(id))
                })
                .map(|(k, entry)| {
                    let kept: Vec<Record> = entry
                        .records
                        .iter()
                        .filter(|r| r.id() != Some(id))
                        .cloned()
                        .collect();
                    entry.records = Arc::new(kept);
                    k.clone()
                })
                .collect()
        };
        for key in &keys {
            self.publish(CacheEvent::Updated(key.clone()));
        }
        keys
    }

    /// Find a cached record of `resource` by id in any collection.
    pub fn find_record(&self, resource: ResourceKind, id: i64) -> Option<Record> {
        self.lock()
            .iter()
            .filter(|(k, _)| k.resource == resource)
            .find_map(|(_, entry)| entry.records.iter().find(|r| r.id() == Some(id)).cloned())
    }

    /// Register a view's interest in `key`.
    pub fn retain(&self, key: &QueryKey) {
        self.lock()
            .entry(key.clone())
            .or_insert_with(Entry::new)
            .views += 1;
    }

    /// Drop a view's interest; the entry is discarded when no view is left.
    ///
    /// An entry with a fetch in flight is kept so the result still lands;
    /// it then counts against the unviewed capacity.
    pub fn release(&self, key: &QueryKey) {
        let mut entries = self.lock();
        let discard = match entries.get_mut(key) {
            Some(entry) => {
                entry.views = entry.views.saturating_sub(1);
                entry.views == 0 && !entry.busy()
            }
            None => false,
        };
        if discard {
            entries.remove(key);
            debug!(key = %key, "discarded unreferenced collection");
        }
    }

    pub fn view_count(&self, key: &QueryKey) -> usize {
        self.lock().get(key).map_or(0, |e| e.views)
    }

    /// Cached keys no view references.
    pub fn unviewed_keys(&self) -> Vec<QueryKey> {
        self.lock()
            .iter()
            .filter(|(_, e)| e.views == 0)
            .map(|(k, _)| k.clone())
            .collect()
    }
}
