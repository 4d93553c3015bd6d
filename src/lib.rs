//! # Showcase State
//!
//! The shared readiness/flavor record behind the 3D showcase site, with
//! per-field change notification.
//!
//! ## Core Concepts
//!
//! - **State**: `ready` flag plus `current_flavor` index, read through a selector
//! - **Subscriptions**: per-field callbacks, removed when their handle drops
//! - **Watchers**: channel-backed subscribers for other threads
//! - **Ready timer**: delayed `ready` flip, cancelled with its owner
//!
//! ## Example
//!
//! ```ignore
//! use showcase_state::{FlavorPolicy, Store, StoreConfig};
//!
//! let store = Store::new(StoreConfig::with_catalog(4, FlavorPolicy::Wrap))?;
//!
//! let sub = store.subscribe_current_flavor(|flavor| println!("now showing {flavor}"));
//! store.next_flavor()?;
//! store.set_ready(true);
//!
//! let ready = store.read(|s| s.ready);
//! drop(sub);
//! ```

pub mod error;
pub mod store;
pub mod subscriptions;
pub mod timer;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use store::{Store, StoreConfig};
pub use subscriptions::{
    Callback, DropReason, StateEvent, Subscription, SubscriptionId, SubscriptionManager,
    WatchHandle,
};
pub use timer::ReadyTimer;
pub use types::*;
