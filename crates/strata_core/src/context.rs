//! Registry of cancellable streaming contexts, one per store key.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a context registered under a store key
#[derive(Debug, Clone)]
pub struct RegisteredContext {
    id: u64,
    token: CancellationToken,
}

impl RegisteredContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// At most one live context exists per key. Registering a new one cancels
/// whatever was left behind by an earlier load of the same store.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: DashMap<String, RegisteredContext>,
    next_id: AtomicU64,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh context under `key`, cancelling any stale one.
    pub fn register(&self, key: &str) -> RegisteredContext {
        let ctx = RegisteredContext {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        if let Some(stale) = self.contexts.insert(key.to_string(), ctx.clone()) {
            debug!("Cancelling stale streaming context {} for {}", stale.id, key);
            stale.token.cancel();
        }
        ctx
    }

    /// Cancel and forget the context under `key`. Returns whether one existed.
    pub fn cancel(&self, key: &str) -> bool {
        match self.contexts.remove(key) {
            Some((_, ctx)) => {
                ctx.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget the context under `key` if it is still the one identified by `id`.
    /// A finished fetch must not remove a context registered by a newer one.
    pub fn release(&self, key: &str, id: u64) {
        self.contexts.remove_if(key, |_, ctx| ctx.id == id);
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Cancel every registered context, e.g. on shutdown.
    pub fn cancel_all(&self) {
        for entry in self.contexts.iter() {
            entry.value().token.cancel();
        }
        self.contexts.clear();
    }
}
