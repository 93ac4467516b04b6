//! Typed publish/subscribe delivery of [`AgentEvent`]s.
//!
//! The bus holds its subscriber list behind a short critical section: `emit`
//! snapshots the matching handlers under the lock and invokes them outside
//! it, so a subscriber can re-enter the bus (to emit or to unsubscribe)
//! without deadlocking. A panicking subscriber is logged and swallowed;
//! delivery failure never propagates to the emitter.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::error::{AgentError, Result};

use super::{AgentEvent, EVENT_NAMES, EventKind};

type Handler = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

/// Identifies one subscription, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A struct-shaped subscriber, for exporters that carry state.
pub trait Subscriber: Send + Sync + 'static {
    /// Called for every delivered event.
    ///
    /// Implementations must not block the emitting task for long; a
    /// long-running exporter should copy the event and hand it off.
    fn on_event(&self, event: &AgentEvent);
}

#[derive(Clone)]
struct Subscription {
    id: u64,
    /// `None` subscribes to every event.
    filter: Option<&'static str>,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// The event bus.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    /// Create a new bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    /// Subscribe to a single event variant by its stable name alias.
    pub fn subscribe_to<F>(&self, event_name: &str, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        let name = Self::resolve_name(event_name)?;
        Ok(self.insert(Some(name), Arc::new(handler)))
    }

    /// Attach a struct-shaped subscriber to every event.
    pub fn attach(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        self.subscribe(move |event| subscriber.on_event(event))
    }

    /// Remove a subscription. Safe to call at any time, including from
    /// inside a handler. Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id.0);
        inner.subscriptions.len() != before
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .subscriptions
            .len()
    }

    /// Stamp and deliver an event to every matching subscriber, in
    /// subscription order. Returns the stamped event.
    pub fn emit(&self, kind: EventKind) -> AgentEvent {
        let event = AgentEvent::new(kind);
        let name = event.name();

        // Short critical section: snapshot matching handlers only.
        let handlers: Vec<Handler> = {
            let inner = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            inner
                .subscriptions
                .iter()
                .filter(|s| s.filter.is_none_or(|f| f == name))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!(event = name, "Event subscriber panicked; continuing");
            }
        }

        event
    }

    fn insert(&self, filter: Option<&'static str>, handler: Handler) -> SubscriptionId {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscriptions.push(Subscription {
            id,
            filter,
            handler,
        });
        SubscriptionId(id)
    }

    fn resolve_name(event_name: &str) -> Result<&'static str> {
        EVENT_NAMES
            .iter()
            .find(|n| **n == event_name)
            .copied()
            .ok_or_else(|| AgentError::InvalidCallback {
                name: event_name.to_owned(),
            })
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
