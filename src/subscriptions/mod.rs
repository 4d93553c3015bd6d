//! Subscription system for live state updates.
//!
//! Two kinds of subscriber are supported:
//! - Callbacks, invoked synchronously inside the setter in registration order
//! - Channel watchers, fed through bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let store = Store::default();
//!
//! let sub = store.subscribe_current_flavor(|flavor| println!("flavor {flavor}"));
//! store.set_current_flavor(2)?;
//! drop(sub); // unsubscribes
//!
//! let watch = store.watch(Field::Ready);
//! store.set_ready(true);
//! assert!(matches!(watch.recv()?, StateEvent::Changed { .. }));
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    Callback, DropReason, StateEvent, Subscription, SubscriptionId, WatchHandle,
};
