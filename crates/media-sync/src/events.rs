//! In-process event infrastructure.
//!
//! `MediaEvent` surfaces sync milestones (conflicts, rollbacks, remote
//! changes) to the host application; `EventBus` delivers them to
//! subscribers. Wrap the bus in `Arc` to enable subscriptions.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Events emitted by the sync engine for the host application to observe.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaEvent {
    /// A query-scoped push named a changed video document.
    RemoteVideoChanged {
        #[serde(rename = "documentId")]
        document_id: Option<String>,
    },
    /// The continuous listener observed a newly created document.
    RemoteVideoAdded {
        #[serde(rename = "documentId")]
        document_id: String,
    },
    /// A soft delete from another device was applied locally.
    RemoteVideoDeleted {
        #[serde(rename = "documentId")]
        document_id: String,
    },
    /// The preferences subscription fired.
    PreferencesChanged,
    /// A store-wide push arrived; local state should be fully resynced.
    FullResyncRequested,
    /// A metadata write overwrote a concurrent remote edit (last-write-wins).
    ConflictDetected {
        #[serde(rename = "documentId")]
        document_id: String,
        #[serde(rename = "remoteUpdatedAt")]
        remote_updated_at: i64,
    },
    /// A compensating delete failed; the remote object is orphaned.
    RollbackFailed {
        reference: String,
        reason: String,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus for publishing sync events to subscribers.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(MediaEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    ///
    /// Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(MediaEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // Use try_write to avoid deadlock if Drop runs during panic unwinding
        // while a read lock is held (e.g., during emit).
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: MediaEvent) {
        // Clone the callback list to prevent deadlock if a callback calls subscribe.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
