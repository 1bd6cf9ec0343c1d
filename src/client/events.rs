//! Lifecycle event bus.
//!
//! Listeners are called in registration order, outside of any lock, so a
//! listener may register or remove listeners (including itself) while
//! being notified. Such changes take effect from the next publish.

use parking_lot::Mutex;
use std::sync::Arc;

/// Connection and subscription lifecycle events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    Disconnected,
    ConnectionError(String),
    SubscriptionApplied,
    SubscriptionError(String),
    /// Rows in the client cache changed outside a subscription ack.
    RowsChanged,
}

/// Handle returned by every registration; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Inner<E> {
    next_id: u64,
    entries: Vec<(ListenerId, Callback<E>)>,
}

/// Ordered set of callbacks.
pub struct ListenerSet<E> {
    inner: Mutex<Inner<E>>,
}

impl<E> ListenerSet<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                entries: Vec::new(),
            }),
        }
    }

    pub fn add(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, Arc::new(callback)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != id);
        inner.entries.len() != before
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

impl<E> Default for ListenerSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide fan-out of lifecycle events. Cheap to clone; clones share
/// the same listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<ListenerSet<LifecycleEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&LifecycleEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn publish(&self, event: LifecycleEvent) {
        self.listeners.notify(&event);
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
