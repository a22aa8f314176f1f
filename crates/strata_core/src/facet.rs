//! Facet - a named, filtered view over a shared store.
//!
//! Facets hold no data. All state (loaded, loading, expected count) comes
//! from the underlying [`Store`], so facets sharing a store load and reset
//! together.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::page::{Page, SortSpec};
use crate::store::{KeyFn, LoadState, Store};

pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

pub struct Facet<T: Clone + Send + Sync + 'static> {
    kind: String,
    predicate: Option<Predicate<T>>,
    dedupe_key: Option<KeyFn<T>>,
    store: Arc<Store<T>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Facet<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            predicate: self.predicate.clone(),
            dedupe_key: self.dedupe_key.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Facet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facet")
            .field("kind", &self.kind)
            .field("has_predicate", &self.predicate.is_some())
            .field("has_dedupe", &self.dedupe_key.is_some())
            .field("store", &self.store.key())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Facet<T> {
    /// A facet accepting every item of `store`
    pub fn new(kind: impl Into<String>, store: Arc<Store<T>>) -> Self {
        Self {
            kind: kind.into(),
            predicate: None,
            dedupe_key: None,
            store,
        }
    }

    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// View-local duplicate suppression while the store is fetching: only the
    /// first item per key is shown
    pub fn with_dedupe_key(mut self, key: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.dedupe_key = Some(Arc::new(key));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn store(&self) -> &Arc<Store<T>> {
        &self.store
    }

    pub fn matches(&self, item: &T) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(item))
    }

    /// Start loading the underlying store. Re-entrant: a no-op while loading
    /// or once loaded. Returns true when this call started the fetch.
    pub fn load(&self) -> Result<bool> {
        self.store.ensure_loading(&self.kind)
    }

    /// Reset the underlying store, and with it every facet sharing it
    pub fn reset(&self) {
        self.store.reset()
    }

    pub fn cancel(&self) -> bool {
        self.store.cancel()
    }

    pub fn state(&self) -> LoadState {
        self.store.state()
    }

    pub fn needs_update(&self) -> bool {
        self.store.needs_update()
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_loaded()
    }

    pub fn is_fetching(&self) -> bool {
        self.store.is_fetching()
    }

    pub fn expected_total(&self) -> usize {
        self.store.expected_total()
    }

    /// Items currently matching this facet's predicate
    pub fn count(&self) -> usize {
        self.store.count_matching(|item| self.matches(item))
    }

    /// Page through the items matching both this facet and `extra_filter`.
    pub fn get_page<S>(
        &self,
        first: i64,
        page_size: i64,
        extra_filter: impl Fn(&T) -> bool,
        sort_spec: &SortSpec,
        sort_fn: S,
    ) -> Result<Page<T>>
    where
        S: FnOnce(&mut [T], &SortSpec) -> Result<()>,
    {
        let mut snapshot = self.store.select(
            |item| self.matches(item) && extra_filter(item),
            self.dedupe_key.as_ref(),
        )?;
        sort_fn(&mut snapshot.items, sort_spec)?;
        Ok(snapshot.into_page(first, page_size))
    }
}
