//! Store - the canonical, deduplicated in-memory copy of one dataset.
//!
//! A store drives at most one streaming fetch at a time. Items become visible
//! to readers as soon as they are committed, so paginated reads are served
//! from partial data while the fetch is still running.
//!
//! # Load cycle
//!
//! ```text
//! NotLoaded --ensure_loading--> Loading --stream done/failed/cancelled--> Loaded
//!     ^                            |                                        |
//!     +----------- reset ----------+------------------ reset ---------------+
//! ```
//!
//! Every reset and every new fetch bumps the store generation. The fetch task
//! and the dedup set belong to the generation they started under; a task whose
//! generation is stale stops committing and never touches the store state again.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::CacheConfig;
use crate::context::{ContextRegistry, RegisteredContext};
use crate::error::{CacheError, Result, SourceError};
use crate::event::{EventBus, ProgressEvent, StatusEvent, StoreEvent};
use crate::page::{Page, SortSpec, paginate};
use crate::source::StreamSource;

/// Derives a string key from an item, for dedup or point lookups
pub type KeyFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
}

/// Dataset identity: which collection, and which slice of the world
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub category: String,
    pub dataset: String,
}

impl StoreKey {
    pub fn new(category: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            dataset: dataset.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.dataset)
    }
}

/// Shared collaborators every store needs
#[derive(Debug, Clone)]
pub struct StoreEnv {
    pub contexts: Arc<ContextRegistry>,
    pub events: EventBus,
    pub config: CacheConfig,
}

impl StoreEnv {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            contexts: Arc::new(ContextRegistry::new()),
            events: EventBus::new(config.event_capacity),
            config,
        }
    }
}

impl Default for StoreEnv {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Filtered copy of the store taken under one read lock
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub state: LoadState,
    pub expected_total: usize,
}

impl<T> Snapshot<T> {
    /// Apply the pagination window and turn the snapshot into a page
    pub fn into_page(self, first: i64, page_size: i64) -> Page<T> {
        let total_items = self.items.len();
        Page {
            items: paginate(self.items, first, page_size),
            total_items,
            expected_total: self.expected_total,
            is_fetching: self.state == LoadState::Loading,
            state: self.state,
        }
    }
}

struct StoreInner<T> {
    items: Vec<T>,
    state: LoadState,
    expected_total: usize,
    seen: HashSet<String>,
    index: HashMap<String, usize>,
    generation: u64,
    last_error: Option<SourceError>,
    /// A zero-item failure no caller has been told about yet
    failure_pending: AtomicBool,
    /// Facet that triggered the current load, reported in progress events
    origin: String,
}

impl<T> StoreInner<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            state: LoadState::NotLoaded,
            expected_total: 0,
            seen: HashSet::new(),
            index: HashMap::new(),
            generation: 0,
            last_error: None,
            failure_pending: AtomicBool::new(false),
            origin: String::new(),
        }
    }
}

pub struct Store<T: Clone + Send + Sync + 'static> {
    key: StoreKey,
    source: Arc<dyn StreamSource<T>>,
    dedup_key: Option<KeyFn<T>>,
    index_key: Option<KeyFn<T>>,
    inner: RwLock<StoreInner<T>>,
    env: StoreEnv,
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Store")
            .field("key", &self.key)
            .field("source", &self.source.name())
            .field("state", &inner.state)
            .field("items", &inner.items.len())
            .field("expected_total", &inner.expected_total)
            .field("generation", &inner.generation)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    pub fn new(key: StoreKey, source: Arc<dyn StreamSource<T>>, env: StoreEnv) -> Self {
        Self {
            key,
            source,
            dedup_key: None,
            index_key: None,
            inner: RwLock::new(StoreInner::new()),
            env,
        }
    }

    /// Drop streamed items whose key was already committed in this load cycle
    pub fn with_dedup_key(mut self, key: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.dedup_key = Some(Arc::new(key));
        self
    }

    /// Maintain a key -> item index for [`get_item_from_map`](Self::get_item_from_map)
    /// and for targeted CRUD updates
    pub fn with_index_key(mut self, key: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.index_key = Some(Arc::new(key));
        self
    }

    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn state(&self) -> LoadState {
        self.inner.read().state
    }

    pub fn needs_update(&self) -> bool {
        self.state() != LoadState::Loaded
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    pub fn is_fetching(&self) -> bool {
        self.state() == LoadState::Loading
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    pub fn expected_total(&self) -> usize {
        self.inner.read().expected_total
    }

    /// Error left behind by the most recent fetch, if it failed
    pub fn last_error(&self) -> Option<SourceError> {
        self.inner.read().last_error.clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&T) -> bool) -> usize {
        self.inner.read().items.iter().filter(|item| predicate(item)).count()
    }

    /// Progress and status notifications for every store sharing this bus
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.env.events.subscribe()
    }

    /// Clone of every committed item in canonical order
    pub fn items(&self) -> Vec<T> {
        self.inner.read().items.clone()
    }

    /// Start the background fetch unless one is running or the data is loaded.
    ///
    /// Returns true when this call started a fetch. A zero-item failure that
    /// no read has reported yet is returned once as `FetchFailed` instead of
    /// retrying; the call after that starts a fresh fetch.
    ///
    /// Fails with `NoRuntime`, leaving the store untouched, when called
    /// outside a tokio runtime.
    pub fn ensure_loading(self: &Arc<Self>, origin: &str) -> Result<bool> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime {
            store: self.key.to_string(),
        })?;

        let (generation, ctx) = {
            let mut inner = self.inner.write();
            if inner.state != LoadState::NotLoaded {
                return Ok(false);
            }
            if inner.failure_pending.swap(false, Ordering::AcqRel) {
                if let Some(cause) = &inner.last_error {
                    return Err(self.fetch_failed(cause.clone()));
                }
            }
            inner.state = LoadState::Loading;
            inner.generation += 1;
            inner.seen.clear();
            inner.index.clear();
            inner.items.clear();
            inner.expected_total = 0;
            inner.last_error = None;
            inner.origin = origin.to_string();
            // Registered under the lock so a concurrent reset cannot interleave
            let ctx = self.env.contexts.register(&self.key.to_string());
            (inner.generation, ctx)
        };

        debug!(
            "{}: starting fetch from {} for {} (generation {})",
            self.key,
            self.source.name(),
            origin,
            generation
        );
        let store = Arc::clone(self);
        runtime.spawn(async move {
            store.run_fetch(generation, ctx).await;
        });
        Ok(true)
    }

    /// Cancel any in-flight fetch and drop every cached item.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        if self.env.contexts.cancel(&self.key.to_string()) {
            debug!("{}: cancelled in-flight fetch on reset", self.key);
        }
        inner.generation += 1;
        inner.items.clear();
        inner.seen.clear();
        inner.index.clear();
        inner.expected_total = 0;
        inner.last_error = None;
        inner.failure_pending.store(false, Ordering::Release);
        inner.state = LoadState::NotLoaded;
    }

    /// Stop the in-flight fetch but keep what was already committed.
    ///
    /// The fetch task settles the store: `Loaded` when any item was committed,
    /// `NotLoaded` otherwise. Returns whether a fetch was running.
    pub fn cancel(&self) -> bool {
        let inner = self.inner.read();
        if inner.state != LoadState::Loading {
            return false;
        }
        self.env.contexts.cancel(&self.key.to_string())
    }

    /// Filtered copy of the current items. When the store is still fetching,
    /// `dedupe_key` additionally keeps only the first item per key.
    pub fn select(
        &self,
        filter: impl Fn(&T) -> bool,
        dedupe_key: Option<&KeyFn<T>>,
    ) -> Result<Snapshot<T>> {
        let mut snapshot = {
            let inner = self.inner.read();
            if inner.items.is_empty() && inner.state != LoadState::Loading {
                if let Some(cause) = &inner.last_error {
                    inner.failure_pending.store(false, Ordering::Release);
                    return Err(self.fetch_failed(cause.clone()));
                }
            }
            Snapshot {
                items: inner.items.iter().filter(|item| filter(item)).cloned().collect(),
                state: inner.state,
                expected_total: inner.expected_total,
            }
        };

        // Deduped on the copy, after the lock is gone
        if let Some(key) = dedupe_key.filter(|_| snapshot.state == LoadState::Loading) {
            let mut seen = HashSet::new();
            snapshot.items.retain(|item| seen.insert(key(item)));
        }
        Ok(snapshot)
    }

    /// Filtered, sorted, paginated read of whatever has arrived so far.
    ///
    /// The sort runs on the filtered copy after the read lock is released; the
    /// canonical order inside the store is never changed by a read.
    pub fn get_page<S>(
        &self,
        first: i64,
        page_size: i64,
        filter: impl Fn(&T) -> bool,
        sort_spec: &SortSpec,
        sort_fn: S,
    ) -> Result<Page<T>>
    where
        S: FnOnce(&mut [T], &SortSpec) -> Result<()>,
    {
        let mut snapshot = self.select(filter, None)?;
        sort_fn(&mut snapshot.items, sort_spec)?;
        Ok(snapshot.into_page(first, page_size))
    }

    /// O(1) point lookup through the index, valid mid-fetch
    pub fn get_item_from_map(&self, key: &str) -> Option<T> {
        let inner = self.inner.read();
        let position = *inner.index.get(key)?;
        inner.items.get(position).cloned()
    }

    /// Insert or replace an item by its index (or dedup) key.
    ///
    /// Returns false without touching anything when the store holds no data;
    /// the next load fetches fresh state anyway.
    pub fn upsert(&self, item: T) -> bool {
        let mut inner = self.inner.write();
        if inner.state == LoadState::NotLoaded {
            return false;
        }
        match self.position_of_item(&inner, &item) {
            Some(position) => inner.items[position] = item,
            None => {
                if let Some(dedup_key) = &self.dedup_key {
                    let key = dedup_key(&item);
                    inner.seen.insert(key);
                }
                if let Some(index_key) = &self.index_key {
                    let key = index_key(&item);
                    let position = inner.items.len();
                    inner.index.insert(key, position);
                }
                inner.items.push(item);
            }
        }
        true
    }

    /// Mutate the item stored under `key` in place. Returns whether it was found.
    pub fn update_by_key(&self, key: &str, update: impl FnOnce(&mut T)) -> bool {
        let mut inner = self.inner.write();
        match self.position_of_key(&inner, key) {
            Some(position) => {
                update(&mut inner.items[position]);
                true
            }
            None => false,
        }
    }

    /// Remove the item stored under `key`, returning it.
    pub fn remove_by_key(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.write();
        let position = self.position_of_key(&inner, key)?;
        let removed = inner.items.remove(position);
        if let Some(dedup_key) = &self.dedup_key {
            let key = dedup_key(&removed);
            inner.seen.remove(&key);
        }
        if let Some(index_key) = &self.index_key {
            let rebuilt: HashMap<String, usize> = inner
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| (index_key(item), i))
                .collect();
            inner.index = rebuilt;
        }
        Some(removed)
    }

    fn fetch_failed(&self, cause: SourceError) -> CacheError {
        CacheError::fetch_failed(self.key.to_string(), self.source.name(), cause)
    }

    fn position_of_key(&self, inner: &StoreInner<T>, key: &str) -> Option<usize> {
        if self.index_key.is_some() {
            return inner.index.get(key).copied();
        }
        let dedup_key = self.dedup_key.as_ref()?;
        inner.items.iter().position(|item| dedup_key(item) == key)
    }

    fn position_of_item(&self, inner: &StoreInner<T>, item: &T) -> Option<usize> {
        let key = match (&self.index_key, &self.dedup_key) {
            (Some(index_key), _) => index_key(item),
            (None, Some(dedup_key)) => dedup_key(item),
            (None, None) => return None,
        };
        self.position_of_key(inner, &key)
    }

    async fn run_fetch(self: Arc<Self>, generation: u64, ctx: RegisteredContext) {
        let token = ctx.token();

        // The count races the fetch; items never wait on it
        let count = self.source.expected_count();
        tokio::pin!(count);
        let mut counted = false;

        let mut handler = |item: T| self.commit(generation, item);
        let fetch = self.source.fetch(token, &mut handler);
        tokio::pin!(fetch);

        let period = self.env.config.heartbeat().max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                expected = &mut count, if !counted => {
                    counted = true;
                    if let Some(expected) = expected {
                        self.set_expected(generation, expected);
                    }
                }
                result = &mut fetch => break result,
                _ = heartbeat.tick() => self.emit_progress(generation, false),
            }
        };

        self.env.contexts.release(&self.key.to_string(), ctx.id());
        self.finish(generation, result);
    }

    fn set_expected(&self, generation: u64, expected: usize) {
        let mut inner = self.inner.write();
        if inner.generation == generation {
            inner.expected_total = expected;
        }
    }

    /// Commit one streamed item. Returns false when the fetch should stop.
    fn commit(&self, generation: u64, item: T) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation || inner.state != LoadState::Loading {
            return false;
        }
        if let Some(dedup_key) = &self.dedup_key {
            if !inner.seen.insert(dedup_key(&item)) {
                return true;
            }
        }
        if let Some(index_key) = &self.index_key {
            let position = inner.items.len();
            inner.index.insert(index_key(&item), position);
        }
        inner.items.push(item);

        let count = inner.items.len();
        if count % self.env.config.refresh_every.max(1) == 0 {
            let event = self.progress_event(&inner, false);
            drop(inner);
            self.env.events.publish(StoreEvent::Progress(event));
        }
        true
    }

    fn finish(&self, generation: u64, result: std::result::Result<(), SourceError>) {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            debug!(
                "{}: fetch generation {} superseded, discarding its outcome",
                self.key, generation
            );
            return;
        }

        let committed = inner.items.len();
        let mut status = None;
        match result {
            Ok(()) => {
                inner.state = LoadState::Loaded;
                info!("{}: loaded {} items", self.key, committed);
            }
            Err(SourceError::Cancelled) => {
                inner.state = if committed > 0 {
                    LoadState::Loaded
                } else {
                    LoadState::NotLoaded
                };
                debug!(
                    "{}: fetch cancelled after {} items, now {:?}",
                    self.key, committed, inner.state
                );
            }
            Err(cause) if committed > 0 => {
                warn!(
                    "{}: fetch failed after {} items, keeping partial data: {}",
                    self.key, committed, cause
                );
                status = Some(format!("partial load of {}: {}", self.key, cause));
                inner.state = LoadState::Loaded;
                inner.last_error = Some(cause);
            }
            Err(cause) => {
                error!("{}: fetch failed before any data arrived: {}", self.key, cause);
                status = Some(format!("load of {} failed: {}", self.key, cause));
                inner.state = LoadState::NotLoaded;
                inner.last_error = Some(cause);
                inner.failure_pending.store(true, Ordering::Release);
            }
        }

        let progress = self.progress_event(&inner, true);
        let origin = inner.origin.clone();
        drop(inner);

        if let Some(message) = status {
            self.env.events.publish(StoreEvent::Status(StatusEvent {
                category: self.key.category.clone(),
                facet: origin,
                message,
            }));
        }
        self.env.events.publish(StoreEvent::Progress(progress));
    }

    fn emit_progress(&self, generation: u64, is_loaded: bool) {
        let inner = self.inner.read();
        if inner.generation != generation {
            return;
        }
        let event = self.progress_event(&inner, is_loaded);
        drop(inner);
        self.env.events.publish(StoreEvent::Progress(event));
    }

    fn progress_event(&self, inner: &StoreInner<T>, is_loaded: bool) -> ProgressEvent {
        ProgressEvent {
            category: self.key.category.clone(),
            facet: inner.origin.clone(),
            current: inner.items.len(),
            expected: inner.expected_total,
            is_loaded,
        }
    }
}
