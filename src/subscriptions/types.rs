//! Subscription types for state change notification.

use crate::types::{Field, FieldValue};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

use super::manager::SubscriptionManager;

/// Callback invoked synchronously with the new value of a field.
pub type Callback = Arc<dyn Fn(FieldValue) + Send + Sync>;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Events delivered to channel watchers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// A field was replaced.
    Changed { change: FieldValue },

    /// Watcher was dropped.
    Dropped { reason: DropReason },
}

/// Why a watcher was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Registration of a callback, owned by the caller.
///
/// Unsubscribes when dropped. Call [`Subscription::detach`] to keep the
/// callback registered for the lifetime of the store instead.
#[must_use = "dropping a Subscription immediately unsubscribes it"]
pub struct Subscription {
    id: SubscriptionId,
    field: Field,
    manager: Weak<SubscriptionManager>,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, field: Field, manager: Weak<SubscriptionManager>) -> Self {
        Self {
            id,
            field,
            manager,
            active: true,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn field(&self) -> Field {
        self.field
    }

    /// True until `unsubscribe` or `detach` is called.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remove exactly this registration. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(manager) = self.manager.upgrade() {
            manager.unsubscribe(self.field, self.id);
        }
    }

    /// Leave the callback registered and give up the handle.
    ///
    /// The returned id can still be passed to `Store::unsubscribe`.
    pub fn detach(mut self) -> SubscriptionId {
        self.active = false;
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("field", &self.field)
            .field("active", &self.active)
            .finish()
    }
}

/// Handle to a channel watcher. Unwatches when dropped.
pub struct WatchHandle {
    pub id: SubscriptionId,
    pub field: Field,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StateEvent>,
    manager: Weak<SubscriptionManager>,
}

impl WatchHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        field: Field,
        receiver: crossbeam_channel::Receiver<StateEvent>,
        manager: Weak<SubscriptionManager>,
    ) -> Self {
        Self {
            id,
            field,
            receiver,
            manager,
        }
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StateEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StateEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StateEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain every event buffered so far.
    pub fn drain(&self) -> Vec<StateEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.unwatch(self.id);
        }
    }
}
