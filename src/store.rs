//! Main Store struct tying the state record and its subscribers together.

use crate::error::{Result, StoreError};
use crate::subscriptions::{Subscription, SubscriptionId, SubscriptionManager, WatchHandle};
use crate::types::{catalog_len, Field, FieldValue, FlavorPolicy, State, StateUpdate};
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Record the store starts from.
    pub initial: State,

    /// Number of flavors in the host's catalog (None = unknown).
    pub flavor_count: Option<usize>,

    /// How out-of-range flavor indices are handled. Only applies when
    /// `flavor_count` is set.
    pub flavor_policy: FlavorPolicy,

    /// Buffered events per watcher before it is dropped.
    /// Default: 64
    pub watch_buffer_size: usize,

    /// Delay before the ready timer flips `ready`.
    /// Default: 1000ms
    pub ready_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial: State::default(),
            flavor_count: None,
            flavor_policy: FlavorPolicy::Unchecked,
            watch_buffer_size: 64,
            ready_delay_ms: 1000,
        }
    }
}

impl StoreConfig {
    /// Config for a catalog of `count` flavors with the given policy.
    pub fn with_catalog(count: usize, policy: FlavorPolicy) -> Self {
        Self {
            flavor_count: Some(count),
            flavor_policy: policy,
            ..Default::default()
        }
    }

    /// Parse a config from JSON. Missing keys take their defaults.
    pub fn from_json(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Delay before the ready timer flips `ready`.
    pub fn ready_delay(&self) -> Duration {
        Duration::from_millis(self.ready_delay_ms)
    }

    /// Check the config for values the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.flavor_count == Some(0) {
            return Err(StoreError::InvalidConfig(
                "flavor_count must be at least 1".to_string(),
            ));
        }
        if let Some(count) = self.flavor_count {
            catalog_len(count)?;
        }
        if self.watch_buffer_size == 0 {
            return Err(StoreError::InvalidConfig(
                "watch_buffer_size must be at least 1".to_string(),
            ));
        }
        self.flavor_policy
            .resolve(self.initial.current_flavor, self.flavor_count)
            .map_err(|e| StoreError::InvalidConfig(format!("initial flavor: {}", e)))?;
        Ok(())
    }
}

/// The observable state store.
///
/// Holds the shared [`State`] record and notifies per-field subscribers
/// synchronously whenever a field is replaced. Construct one per
/// application and pass it by reference (or `Arc`) to every consumer.
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Current record.
    state: RwLock<State>,

    /// Callback and watcher registry.
    subscriptions: Arc<SubscriptionManager>,

    /// Serializes write-then-notify so subscribers see writes in call order.
    /// Reentrant so a callback can write on the notifying thread.
    write_lock: ReentrantMutex<()>,
}

impl Store {
    /// Create a store from a validated config.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            flavor_count = ?config.flavor_count,
            policy = ?config.flavor_policy,
            "creating store"
        );
        Ok(Self::from_config(config))
    }

    fn from_config(config: StoreConfig) -> Self {
        Self {
            state: RwLock::new(config.initial),
            config,
            subscriptions: Arc::new(SubscriptionManager::new()),
            write_lock: ReentrantMutex::new(()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Reads ---

    /// Apply `selector` to a snapshot of the current record.
    ///
    /// The selector sees every field as of one instant and runs without
    /// any store lock held.
    pub fn read<T, F>(&self, selector: F) -> T
    where
        F: FnOnce(&State) -> T,
    {
        let snapshot = *self.state.read();
        selector(&snapshot)
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> State {
        *self.state.read()
    }

    pub fn ready(&self) -> bool {
        self.state.read().ready
    }

    pub fn current_flavor(&self) -> i64 {
        self.state.read().current_flavor
    }

    // --- Writes ---

    /// Replace `ready` and notify its subscribers.
    pub fn set_ready(&self, value: bool) {
        self.set_ready_if(value, || true);
    }

    /// Replace `ready` only if `proceed` still agrees once the write lock is
    /// held. Returns whether the write happened.
    pub(crate) fn set_ready_if<F>(&self, value: bool, proceed: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let _guard = self.write_lock.lock();
        if !proceed() {
            return false;
        }
        let previous = std::mem::replace(&mut self.state.write().ready, value);
        tracing::debug!(previous, value, "ready set");
        self.subscriptions.notify(FieldValue::Ready(value));
        true
    }

    /// Replace `current_flavor` and notify its subscribers.
    ///
    /// The value goes through the configured [`FlavorPolicy`] first; the
    /// stored value is returned. Never fails unless the policy is `Reject`.
    pub fn set_current_flavor(&self, value: i64) -> Result<i64> {
        let resolved = self.resolve_flavor(value)?;
        let _guard = self.write_lock.lock();
        self.write_flavor(resolved);
        Ok(resolved)
    }

    /// Write every field present in `update` under one lock, then notify
    /// each supplied field once (`ready` first).
    ///
    /// Nothing is written if the flavor is rejected.
    pub fn apply(&self, update: StateUpdate) -> Result<State> {
        let flavor = update
            .current_flavor
            .map(|v| self.resolve_flavor(v))
            .transpose()?;

        let _guard = self.write_lock.lock();
        let updated = {
            let mut state = self.state.write();
            if let Some(ready) = update.ready {
                state.ready = ready;
            }
            if let Some(flavor) = flavor {
                state.current_flavor = flavor;
            }
            *state
        };
        tracing::debug!(?update, ?updated, "update applied");

        if let Some(ready) = update.ready {
            self.subscriptions.notify(FieldValue::Ready(ready));
        }
        if let Some(flavor) = flavor {
            self.subscriptions.notify(FieldValue::CurrentFlavor(flavor));
        }
        Ok(updated)
    }

    /// Advance to the next flavor, wrapping at the end of the catalog.
    pub fn next_flavor(&self) -> Result<i64> {
        self.step_flavor(1)
    }

    /// Go back one flavor, wrapping at the start of the catalog.
    pub fn previous_flavor(&self) -> Result<i64> {
        self.step_flavor(-1)
    }

    fn step_flavor(&self, delta: i64) -> Result<i64> {
        let count = catalog_len(self.config.flavor_count.ok_or(StoreError::NoFlavorCatalog)?)?;

        let _guard = self.write_lock.lock();
        // Unchecked writes can leave any integer; bring it into range before stepping
        let current = self.current_flavor().rem_euclid(count);
        let next = (current + delta).rem_euclid(count);
        self.write_flavor(next);
        Ok(next)
    }

    fn resolve_flavor(&self, value: i64) -> Result<i64> {
        let resolved = self
            .config
            .flavor_policy
            .resolve(value, self.config.flavor_count);
        match &resolved {
            Ok(stored) if *stored != value => {
                tracing::debug!(requested = value, stored, "flavor adjusted by policy")
            }
            Err(e) => tracing::warn!(requested = value, error = %e, "flavor rejected"),
            _ => {}
        }
        resolved
    }

    /// Caller holds `write_lock`.
    fn write_flavor(&self, value: i64) {
        let previous = std::mem::replace(&mut self.state.write().current_flavor, value);
        tracing::debug!(previous, value, "current flavor set");
        self.subscriptions.notify(FieldValue::CurrentFlavor(value));
    }

    // --- Subscriptions ---

    /// Register a callback for every future write of `field`.
    ///
    /// The returned [`Subscription`] removes the registration when
    /// unsubscribed or dropped.
    pub fn subscribe<F>(&self, field: Field, callback: F) -> Subscription
    where
        F: Fn(FieldValue) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(field, Arc::new(callback))
    }

    /// Register a callback for `ready`.
    pub fn subscribe_ready<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.subscribe(Field::Ready, move |change| {
            if let Some(ready) = change.as_ready() {
                callback(ready);
            }
        })
    }

    /// Register a callback for `current_flavor`.
    pub fn subscribe_current_flavor<F>(&self, callback: F) -> Subscription
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        self.subscribe(Field::CurrentFlavor, move |change| {
            if let Some(flavor) = change.as_current_flavor() {
                callback(flavor);
            }
        })
    }

    /// Remove a registration by id, e.g. one given up with
    /// [`Subscription::detach`]. Returns false if it was already gone.
    pub fn unsubscribe(&self, field: Field, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(field, id)
    }

    /// Number of live callbacks for a field.
    pub fn subscriber_count(&self, field: Field) -> usize {
        self.subscriptions.callback_count(field)
    }

    /// Open a channel watcher on a field.
    pub fn watch(&self, field: Field) -> WatchHandle {
        self.subscriptions
            .watch(field, self.config.watch_buffer_size)
    }

    /// Close a channel watcher.
    pub fn unwatch(&self, id: SubscriptionId) {
        self.subscriptions.unwatch(id);
    }

    /// Number of open watchers across all fields.
    pub fn watcher_count(&self) -> usize {
        self.subscriptions.watcher_count()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::from_config(StoreConfig::default())
    }
}
