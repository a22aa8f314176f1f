//! Progress and status notifications emitted while stores load.
//!
//! Events are fanned out on a tokio broadcast channel. Nobody listening is the
//! normal case for headless use, so publishing never fails.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Progress of a running (or just finished) fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Collection category, e.g. "abis" or "names"
    pub category: String,
    /// Facet that triggered the load
    pub facet: String,
    /// Items committed so far
    pub current: usize,
    /// Best-effort total announced by the upstream count query
    pub expected: usize,
    pub is_loaded: bool,
}

/// A non-fatal condition worth showing in a status bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub category: String,
    pub facet: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    Progress(ProgressEvent),
    Status(StatusEvent),
}

impl StoreEvent {
    pub fn category(&self) -> &str {
        match self {
            Self::Progress(p) => &p.category,
            Self::Status(s) => &s.category,
        }
    }

    pub fn as_progress(&self) -> Option<&ProgressEvent> {
        match self {
            Self::Progress(p) => Some(p),
            Self::Status(_) => None,
        }
    }
}

/// Cloneable handle to the shared event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        // Err only means there are no receivers right now
        let _ = self.tx.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CAPACITY)
    }
}
