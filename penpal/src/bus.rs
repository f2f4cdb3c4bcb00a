//! Publish-subscribe bus consumed by servers and clients.
//!
//! The protocol only needs two capabilities from its transport:
//!
//! - `subscribe(channel, topic, listener)`
//! - `broadcast(channel, topic, payload)`
//!
//! Delivery fans out to every listener of the exact `(channel, topic)` pair.
//! Each listener receives its own copy of the payload.
//!
//! [`LocalBus`] is the in-process implementation. It is single-threaded and
//! delivers every broadcast through `tokio::task::spawn_local`, so it must be
//! driven from inside a `tokio::task::LocalSet`.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ LocalBus                                 │
//! │                                          │
//! │  ("Request.Foo", "greeting") → [l1]      │
//! │  ("Response.Foo", "greeting") → [l2, l3] │
//! └──────────────────────────────────────────┘
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// Callback invoked for each payload delivered on a subscribed address.
pub type Listener = Rc<dyn Fn(Value)>;

/// Channel/topic publish-subscribe transport.
pub trait MessageBus {
    /// Register `listener` for payloads broadcast on `(channel, topic)`.
    fn subscribe(&self, channel: &str, topic: &str, listener: Listener);

    /// Deliver `payload` to every listener of `(channel, topic)`.
    fn broadcast(&self, channel: &str, topic: &str, payload: Value);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Address {
    channel: String,
    topic: String,
}

impl Address {
    fn new(channel: &str, topic: &str) -> Self {
        Self {
            channel: channel.to_string(),
            topic: topic.to_string(),
        }
    }
}

#[derive(Default)]
struct LocalBusInner {
    subscribers: RefCell<HashMap<Address, Vec<Listener>>>,
    broadcast_count: Cell<u64>,
}

/// In-process bus for a single-threaded runtime.
///
/// Cloning yields another handle to the same subscriber table.
///
/// # Example
///
/// ```rust,ignore
/// let bus = LocalBus::new();
/// bus.subscribe("Request.Foo", "greeting", Rc::new(|payload| println!("{payload}")));
/// bus.broadcast("Request.Foo", "greeting", json!({"hello": "world"}));
/// ```
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Rc<LocalBusInner>,
}

impl LocalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners registered on `(channel, topic)`.
    pub fn subscriber_count(&self, channel: &str, topic: &str) -> usize {
        self.inner
            .subscribers
            .borrow()
            .get(&Address::new(channel, topic))
            .map_or(0, Vec::len)
    }

    /// Number of broadcasts issued on this bus so far.
    pub fn broadcast_count(&self) -> u64 {
        self.inner.broadcast_count.get()
    }
}

impl MessageBus for LocalBus {
    fn subscribe(&self, channel: &str, topic: &str, listener: Listener) {
        tracing::trace!(channel, topic, "LocalBus::subscribe");
        self.inner
            .subscribers
            .borrow_mut()
            .entry(Address::new(channel, topic))
            .or_default()
            .push(listener);
    }

    fn broadcast(&self, channel: &str, topic: &str, payload: Value) {
        self.inner
            .broadcast_count
            .set(self.inner.broadcast_count.get() + 1);

        // Snapshot so listeners may subscribe while deliveries are queued.
        let listeners = self
            .inner
            .subscribers
            .borrow()
            .get(&Address::new(channel, topic))
            .cloned()
            .unwrap_or_default();

        if listeners.is_empty() {
            tracing::trace!(channel, topic, "LocalBus::broadcast: no subscribers");
            return;
        }

        tracing::trace!(
            channel,
            topic,
            listeners = listeners.len(),
            "LocalBus::broadcast"
        );

        for listener in listeners {
            let payload = payload.clone();
            tokio::task::spawn_local(async move {
                listener(payload);
            });
        }
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("addresses", &self.inner.subscribers.borrow().len())
            .field("broadcast_count", &self.inner.broadcast_count.get())
            .finish()
    }
}
