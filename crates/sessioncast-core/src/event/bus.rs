use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::error;

use super::{Event, EventKind};

type Handler = Arc<dyn Fn(Event) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

type SubscriberMap = RwLock<HashMap<EventKind, Vec<Entry>>>;

/// Typed publish/subscribe fan-out.
///
/// Delivery is asynchronous by default (one task per handler invocation);
/// [`EventBus::sync`] delivers inline in publish order, which tests rely
/// on. Handler panics are caught and logged so one bad subscriber cannot
/// take out its siblings. Publishing a concrete event also notifies
/// subscribers registered for [`EventKind::Any`].
pub struct EventBus {
    subscribers: Arc<SubscriberMap>,
    async_dispatch: bool,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Bus with asynchronous fan-out.
    pub fn new() -> Self {
        Self::with_dispatch(true)
    }

    /// Bus that delivers inline on the publishing task.
    pub fn sync() -> Self {
        Self::with_dispatch(false)
    }

    fn with_dispatch(async_dispatch: bool) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            async_dispatch,
            closed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for events of `kind`. The returned subscription
    /// keeps delivering until disposed.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(Event) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().entry(kind).or_default().push(Entry {
            id,
            handler: Arc::new(handler),
        });
        Subscription {
            map: Arc::downgrade(&self.subscribers),
            kind,
            id,
            disposed: AtomicBool::new(false),
        }
    }

    /// Register `handler` for every event.
    pub fn subscribe_all(&self, handler: impl Fn(Event) + Send + Sync + 'static) -> Subscription {
        self.subscribe(EventKind::Any, handler)
    }

    pub fn publish(&self, event: Event) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.notify(event.kind(), &event);
        self.notify(EventKind::Any, &event);
    }

    fn notify(&self, kind: EventKind, event: &Event) {
        // Snapshot under a short read lock; dispatch outside it so
        // handlers can subscribe and dispose freely.
        let handlers: Vec<Handler> = {
            let guard = self.subscribers.read();
            guard
                .get(&kind)
                .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            if self.async_dispatch {
                let event = event.clone();
                tokio::spawn(async move {
                    safe_handle(&handler, event);
                });
            } else {
                safe_handle(&handler, event.clone());
            }
        }
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Stop delivering. Events published afterwards are discarded.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear();
    }
}

fn safe_handle(handler: &Handler, event: Event) {
    let kind = event.kind();
    if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
        error!(?kind, "event handler panicked");
    }
}

/// Disposable capability over one bus registration.
///
/// `dispose` is idempotent; once it returns, the handler is never invoked
/// for later publishes. Dropping a subscription without disposing leaves
/// the handler registered.
pub struct Subscription {
    map: Weak<SubscriberMap>,
    kind: EventKind,
    id: u64,
    disposed: AtomicBool,
}

impl Subscription {
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(map) = self.map.upgrade() {
            if let Some(entries) = map.write().get_mut(&self.kind) {
                entries.retain(|entry| entry.id != self.id);
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
