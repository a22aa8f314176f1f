//! Explicit registry of every store the cache owns.
//!
//! Stores are keyed by [`StoreKey`] and created on first use. Collections
//! built for the same key get the same `Arc<Store<T>>`, which is what keeps
//! one fetch per dataset no matter how many views ask for it.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::store::{LoadState, Store, StoreKey};

/// Type-erased view of a store for registry-wide operations
pub trait ManagedStore: Send + Sync + Debug {
    fn key(&self) -> &StoreKey;
    fn state(&self) -> LoadState;
    fn len(&self) -> usize;
    fn reset(&self);
    fn cancel(&self) -> bool;

    /// Recover the concrete store via [`Arc::downcast`]
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Clone + Send + Sync + 'static> ManagedStore for Store<T> {
    fn key(&self) -> &StoreKey {
        Store::key(self)
    }

    fn state(&self) -> LoadState {
        Store::state(self)
    }

    fn len(&self) -> usize {
        Store::len(self)
    }

    fn reset(&self) {
        Store::reset(self)
    }

    fn cancel(&self) -> bool {
        Store::cancel(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Brief per-store status, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub key: StoreKey,
    pub state: LoadState,
    pub items: usize,
}

#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: DashMap<StoreKey, Arc<dyn ManagedStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the store registered under `key`, building it with `build` when
    /// absent. Fails when the key is already bound to a different item type.
    pub fn get_or_create<T, F>(&self, key: StoreKey, build: F) -> Result<Arc<Store<T>>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Store<T>,
    {
        let erased = {
            let entry = self.stores.entry(key.clone()).or_insert_with(|| {
                debug!("Registering store {}", key);
                Arc::new(build()) as Arc<dyn ManagedStore>
            });
            Arc::clone(entry.value())
        };
        Self::downcast(&key, erased)
    }

    pub fn get<T: Clone + Send + Sync + 'static>(
        &self,
        key: &StoreKey,
    ) -> Result<Option<Arc<Store<T>>>> {
        match self.stores.get(key) {
            Some(entry) => {
                let erased = Arc::clone(entry.value());
                drop(entry);
                Self::downcast(key, erased).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.stores.contains_key(key)
    }

    /// Reset and forget the store under `key`. Returns whether one existed.
    pub fn remove(&self, key: &StoreKey) -> bool {
        match self.stores.remove(key) {
            Some((_, store)) => {
                store.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every store in `category`, e.g. after switching projects
    pub fn reset_category(&self, category: &str) -> usize {
        let mut reset = 0;
        for entry in self.stores.iter().filter(|e| e.key().category == category) {
            entry.value().reset();
            reset += 1;
        }
        reset
    }

    /// Cancel every in-flight fetch, keeping committed data
    pub fn cancel_all(&self) -> usize {
        self.stores.iter().filter(|e| e.value().cancel()).count()
    }

    pub fn summaries(&self) -> Vec<StoreSummary> {
        let mut summaries: Vec<_> = self
            .stores
            .iter()
            .map(|e| StoreSummary {
                key: e.key().clone(),
                state: e.value().state(),
                items: e.value().len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));
        summaries
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    fn downcast<T: Clone + Send + Sync + 'static>(
        key: &StoreKey,
        erased: Arc<dyn ManagedStore>,
    ) -> Result<Arc<Store<T>>> {
        erased
            .into_any()
            .downcast::<Store<T>>()
            .map_err(|_| CacheError::StoreTypeMismatch {
                store: key.to_string(),
            })
    }
}
