//! Subscription manager for broadcasting field changes.

use crate::types::{Field, FieldValue};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{
    Callback, DropReason, StateEvent, Subscription, SubscriptionId, WatchHandle,
};

/// Internal callback registration.
struct Registration {
    id: SubscriptionId,
    callback: Callback,
    /// Cleared on removal so an in-flight notification pass skips it.
    active: AtomicBool,
}

/// Internal channel watcher state.
struct Watcher {
    field: Field,
    sender: Sender<StateEvent>,
}

impl Watcher {
    /// Try to send an event. On failure the watcher should be dropped for
    /// the returned reason.
    fn try_send(&self, event: StateEvent) -> Result<(), DropReason> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::TrySendError::Full(_)) => Err(DropReason::BufferOverflow),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                Err(DropReason::Disconnected)
            }
        }
    }
}

/// Manages per-field callbacks and channel watchers.
pub struct SubscriptionManager {
    /// Callback lists indexed by `Field::slot`, in registration order.
    callbacks: Mutex<[Vec<Arc<Registration>>; 2]>,
    /// Active channel watchers by ID.
    watchers: RwLock<HashMap<SubscriptionId, Watcher>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new([Vec::new(), Vec::new()]),
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a callback for a field.
    ///
    /// The same callback may be registered several times; each registration
    /// is invoked once per change.
    pub fn subscribe(self: &Arc<Self>, field: Field, callback: Callback) -> Subscription {
        let id = self.next_id();
        let registration = Arc::new(Registration {
            id,
            callback,
            active: AtomicBool::new(true),
        });

        self.callbacks.lock()[field.slot()].push(registration);
        tracing::debug!(%field, id = id.0, "callback subscribed");

        Subscription::new(id, field, Arc::downgrade(self))
    }

    /// Remove a callback registration. Returns false if it was already gone.
    pub fn unsubscribe(&self, field: Field, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let list = &mut callbacks[field.slot()];
        match list.iter().position(|r| r.id == id) {
            Some(pos) => {
                let registration = list.remove(pos);
                registration.active.store(false, Ordering::SeqCst);
                tracing::debug!(%field, id = id.0, "callback unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Number of live callback registrations for a field.
    pub fn callback_count(&self, field: Field) -> usize {
        self.callbacks.lock()[field.slot()].len()
    }

    /// Create a channel watcher for a field.
    pub fn watch(self: &Arc<Self>, field: Field, buffer_size: usize) -> WatchHandle {
        let id = self.next_id();
        let (sender, receiver) = bounded(buffer_size);

        self.watchers.write().insert(id, Watcher { field, sender });
        tracing::debug!(%field, id = id.0, buffer_size, "watcher added");

        WatchHandle::new(id, field, receiver, Arc::downgrade(self))
    }

    /// Remove a watcher and notify it. No-op if it is already gone.
    pub fn unwatch(&self, id: SubscriptionId) {
        if let Some(watcher) = self.watchers.write().remove(&id) {
            tracing::debug!(field = %watcher.field, id = id.0, "watcher removed");
            // Best effort, the receiver may already be gone
            let _ = watcher.sender.try_send(StateEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get watcher count.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    // --- Broadcasting ---

    /// Invoke every callback registered for the changed field, in
    /// registration order, then forward the change to matching watchers.
    ///
    /// The registry lock is released before callbacks run, so a callback may
    /// read or write the store and subscribe or unsubscribe freely.
    pub fn notify(&self, change: FieldValue) {
        let field = change.field();
        let registrations: Vec<Arc<Registration>> =
            self.callbacks.lock()[field.slot()].clone();

        tracing::trace!(%field, callbacks = registrations.len(), "notifying");
        for registration in registrations {
            if registration.active.load(Ordering::SeqCst) {
                (registration.callback)(change);
            }
        }

        self.broadcast(field, StateEvent::Changed { change });
    }

    /// Internal broadcast helper. Drops watchers that fail to receive.
    fn broadcast(&self, field: Field, event: StateEvent) {
        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, watcher) in watchers.iter() {
                if watcher.field == field {
                    if let Err(reason) = watcher.try_send(event.clone()) {
                        to_remove.push((*id, reason));
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            for (id, reason) in to_remove {
                if let Some(watcher) = watchers.remove(&id) {
                    tracing::warn!(%field, id = id.0, ?reason, "dropping watcher");
                    // Might fail when the buffer is still full, that's ok
                    let _ = watcher.sender.try_send(StateEvent::Dropped { reason });
                }
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
