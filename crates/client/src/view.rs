//! Per-page view state.
//!
//! A [`ResourceView`] owns the filter and scope state of one page and reads
//! its rows from the shared cache under the current [`QueryKey`]. Changing
//! a filter changes the key; the old key's in-flight fetch still lands in
//! the cache but is never shown by this view.
//!
//! A view keeps its most recent keys (`cache.view_history`) referenced, so
//! switching back to an earlier filter shows that filter's cached rows at
//! once. Older keys are released as the view moves on.
//!
//! Each view runs one background task. It refetches the current key when
//! the cache reports it invalidated and, when polling is on, on every
//! interval tick. Dropping the view stops the task and releases its keys.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use fieldops_interchange::{Record, ResourceKind, Scope};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::cache::{CacheEvent, CollectionStatus};
use crate::client::FieldOpsClient;
use crate::filter;
use crate::query::{Filters, QueryKey};

/// What a page should draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    Loading,
    /// Fetched, nothing matched (or the session expired).
    Empty,
    Failed(String),
    Rows(usize),
}

pub struct ResourceView {
    client: FieldOpsClient,
    kind: ResourceKind,
    scope: Scope,
    filters: Filters,
    page_size: usize,
    key: watch::Sender<QueryKey>,
    /// Keys this view references, most recent first.
    held: VecDeque<QueryKey>,
    interval: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ResourceView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceView")
            .field("key", &*self.key.borrow())
            .field("page_size", &self.page_size)
            .field("interval", &self.interval)
            .finish()
    }
}

impl ResourceView {
    /// A view of `kind` in `scope` with no filters. Must be created inside
    /// a tokio runtime.
    pub fn new(client: FieldOpsClient, kind: ResourceKind, scope: Scope) -> Self {
        let key = QueryKey::new(kind, scope, Filters::new());
        client.cache().retain(&key);
        let held = VecDeque::from([key.clone()]);
        let (tx, _) = watch::channel(key);
        let mut view = ResourceView {
            client,
            kind,
            scope,
            filters: Filters::new(),
            page_size: 0,
            key: tx,
            held,
            interval: None,
            task: None,
        };
        view.restart_task();
        view
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn key(&self) -> QueryKey {
        self.key.borrow().clone()
    }

    // ── Filter state ─────────────────────────────────────────────────

    pub fn set_filter(&mut self, name: &str, value: &str) {
        self.filters.set(name, value);
        self.rekey();
    }

    pub fn clear_filter(&mut self, name: &str) {
        self.filters.remove(name);
        self.rekey();
    }

    pub fn set_search(&mut self, text: &str) {
        self.set_filter("search", text);
    }

    pub fn set_filters(&mut self, filters: Filters) {
        self.filters = filters;
        self.rekey();
    }

    pub fn set_scope(&mut self, scope: Scope) {
        self.scope = scope;
        self.rekey();
    }

    /// Rows per page; 0 shows everything on one page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size;
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Point the view at the key for the current state and start fetching
    /// it in the background.
    fn rekey(&mut self) {
        let next = QueryKey::new(self.kind, self.scope, self.filters.clone());
        let previous = self.key();
        if next == previous {
            return;
        }
        self.hold(&next);
        debug!(from = %previous, to = %next, "view key changed");
        self.key.send_replace(next.clone());

        let client = self.client.clone();
        tokio::spawn(async move {
            client.query(&next).await;
        });
    }

    /// Move `key` to the front of the held keys, releasing the oldest
    /// beyond the configured history.
    fn hold(&mut self, key: &QueryKey) {
        let cache = self.client.cache().clone();
        match self.held.iter().position(|k| k == key) {
            Some(index) => {
                if let Some(existing) = self.held.remove(index) {
                    self.held.push_front(existing);
                }
            }
            None => {
                cache.retain(key);
                self.held.push_front(key.clone());
            }
        }
        let history = self.client.config().cache.view_history.max(1);
        while self.held.len() > history {
            if let Some(oldest) = self.held.pop_back() {
                cache.release(&oldest);
            }
        }
    }

    /// Keys this view keeps cached, most recent first.
    pub fn held_keys(&self) -> Vec<QueryKey> {
        self.held.iter().cloned().collect()
    }

    // ── Reading ──────────────────────────────────────────────────────

    /// Fetch the current key if it is not fresh, then render.
    pub async fn load(&self) -> RenderState {
        let key = self.key();
        self.client.query(&key).await;
        self.render()
    }

    pub fn render(&self) -> RenderState {
        let Some(snapshot) = self.client.cache().snapshot(&self.key()) else {
            return RenderState::Loading;
        };
        match snapshot.status {
            CollectionStatus::Loading if snapshot.fetched_at.is_none() => RenderState::Loading,
            CollectionStatus::Failed { message } => RenderState::Failed(message),
            _ if snapshot.records.is_empty() => RenderState::Empty,
            _ => RenderState::Rows(snapshot.records.len()),
        }
    }

    /// Whether the last fetch was answered with 401.
    pub fn session_expired(&self) -> bool {
        self.client
            .cache()
            .snapshot(&self.key())
            .is_some_and(|s| s.status == CollectionStatus::SessionExpired)
    }

    /// Every row of the current key.
    pub fn rows(&self) -> Arc<Vec<Record>> {
        self.client
            .cache()
            .snapshot(&self.key())
            .map(|s| s.records)
            .unwrap_or_default()
    }

    pub fn page_count(&self) -> usize {
        filter::page_count(self.rows().len(), self.page_size)
    }

    /// Rows of page `index` (zero-based).
    pub fn page(&self, index: usize) -> Vec<Record> {
        filter::page(&self.rows(), self.page_size, index).to_vec()
    }

    // ── Background refresh ───────────────────────────────────────────

    /// Refetch the current key every `interval`, in addition to refetching
    /// on invalidation.
    pub fn start_polling(&mut self, interval: Duration) {
        self.interval = Some(interval);
        self.restart_task();
    }

    /// Start polling at the configured interval for this resource.
    pub fn start_default_polling(&mut self) {
        let interval = self.client.config().poll_interval(self.kind);
        self.start_polling(interval);
    }

    pub fn stop_polling(&mut self) {
        self.interval = None;
        self.restart_task();
    }

    pub fn is_polling(&self) -> bool {
        self.interval.is_some()
    }

    fn restart_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let client = self.client.clone();
        let keys = self.key.subscribe();
        let events = client.subscribe();
        self.task = Some(tokio::spawn(watch_current_key(
            client,
            keys,
            events,
            self.interval,
        )));
    }
}

impl Drop for ResourceView {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let cache = self.client.cache();
        for key in self.held.drain(..) {
            cache.release(&key);
        }
    }
}

async fn watch_current_key(
    client: FieldOpsClient,
    mut keys: watch::Receiver<QueryKey>,
    mut events: broadcast::Receiver<CacheEvent>,
    interval: Option<Duration>,
) {
    let mut ticker = interval.map(|period| {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let tick = async {
            match ticker.as_mut() {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tick => {
                let key = keys.borrow().clone();
                debug!(key = %key, "poll");
                client.refresh(&key).await;
            }
            event = events.recv() => match event {
                Ok(CacheEvent::Invalidated(key)) => {
                    let current = keys.borrow().clone();
                    if key == current {
                        client.revalidate(&key).await;
                    }
                }
                Ok(CacheEvent::Updated(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "cache events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = keys.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
