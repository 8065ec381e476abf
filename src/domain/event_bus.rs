//! In-process publish/subscribe bus for domain and system events.
//!
//! [`EventBus`] is a cheaply clonable handle to one shared subscription
//! list. `publish` runs every matching handler synchronously on the
//! caller's task, in subscription order, and returns once they have all
//! finished. Handlers must not block; long work belongs on a spawned
//! task.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use super::event::Event;
use super::event_pattern::EventPattern;
use super::system_event::SystemEvent;

/// Callback invoked for each matching event.
///
/// An `Err` is logged and otherwise ignored; so is a panic.
pub type EventHandler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    id: u64,
    pattern: EventPattern,
    handler: EventHandler,
    active: AtomicBool,
}

struct BusInner {
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Shared publish/subscribe registry.
///
/// Constructed once at startup and passed to every component that
/// publishes or subscribes. [`EventBus::shutdown`] ends its lifetime.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscriptions: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Registers `handler` for every event whose name matches `pattern`.
    ///
    /// Never fails. After [`EventBus::shutdown`] the returned handle is
    /// inert and the handler is never called.
    pub fn subscribe<P, F>(&self, pattern: P, handler: F) -> SubscriptionHandle
    where
        P: Into<EventPattern>,
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let pattern = pattern.into();
        if self.inner.closed.load(Ordering::Acquire) {
            tracing::warn!(%pattern, "subscribe on a shut down event bus ignored");
            return SubscriptionHandle(id);
        }
        tracing::debug!(subscription = id, %pattern, "event bus subscription added");
        self.inner.subscriptions.write().push(Arc::new(Subscription {
            id,
            pattern,
            handler: Arc::new(handler),
            active: AtomicBool::new(true),
        }));
        SubscriptionHandle(id)
    }

    /// Removes a subscription. No-op if it is already gone.
    ///
    /// Takes effect immediately, including for a publish already in
    /// progress on another task.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut subs = self.inner.subscriptions.write();
        if let Some(pos) = subs.iter().position(|s| s.id == handle.0) {
            let removed = subs.remove(pos);
            removed.active.store(false, Ordering::Release);
            tracing::debug!(subscription = handle.0, "event bus subscription removed");
        }
    }

    /// Publishes a new event built from `name` and `payload`.
    ///
    /// Returns the number of handlers that were invoked.
    pub fn publish(&self, name: impl Into<String>, payload: serde_json::Value) -> usize {
        self.publish_event(&Event::new(name, payload))
    }

    /// Publishes a typed system event.
    pub fn emit(&self, event: &SystemEvent) -> usize {
        match event.to_event() {
            Ok(event) => self.publish_event(&event),
            Err(e) => {
                tracing::error!(event = event.name(), error = %e, "failed to encode system event");
                0
            }
        }
    }

    /// Runs every matching handler for `event`, in subscription order.
    ///
    /// A handler that returns `Err` or panics is logged and skipped; the
    /// remaining handlers still run. Returns the number of handlers that
    /// were invoked.
    pub fn publish_event(&self, event: &Event) -> usize {
        if self.inner.closed.load(Ordering::Acquire) {
            tracing::debug!(event = event.name(), "publish on a shut down event bus dropped");
            return 0;
        }

        // Snapshot so handlers may (un)subscribe without deadlocking.
        let subs = self.inner.subscriptions.read().clone();

        let mut invoked = 0;
        for sub in subs.iter().filter(|s| s.pattern.matches(event.name())) {
            if !sub.active.load(Ordering::Acquire) {
                continue;
            }
            invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| (sub.handler)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        event = event.name(),
                        subscription = sub.id,
                        error = %e,
                        "event handler failed"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        event = event.name(),
                        subscription = sub.id,
                        "event handler panicked"
                    );
                }
            }
        }
        invoked
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Ends the bus lifetime: drops every subscription and ignores all
    /// later publishes and subscribes. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let removed = std::mem::take(&mut *self.inner.subscriptions.write());
        for sub in &removed {
            sub.active.store(false, Ordering::Release);
        }
        tracing::info!(subscriptions = removed.len(), "event bus shut down");
    }

    /// Returns `true` after [`EventBus::shutdown`].
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}
