//! Snapshot-plus-notify views for UI readers.
//!
//! A bridge never pushes values. It tells its listeners that something
//! changed, and they pull the new value with
//! [`Observable::current_value`]. Values are `Arc`s into the shared state,
//! so two reads with no change in between are `Arc::ptr_eq`.

use std::sync::Arc;

use super::cache::RowCache;
use super::events::{EventBus, LifecycleEvent, ListenerId, ListenerSet};
use super::status::{ConnectionStatus, StatusCell};
use crate::types::AddressStats;

/// Pull-based view over shared client state.
pub trait Observable {
    type Value;

    /// Live shared value.
    fn current_value(&self) -> Arc<Self::Value>;

    /// Fixed default for readers with no live connection (e.g. server-side
    /// rendering). Independent of any connection attempt.
    fn server_value(&self) -> Arc<Self::Value>;

    /// Register a change handler. The handler gets no payload.
    fn on_change<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static;

    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Listener set plus the bus registration that feeds it.
struct Relay {
    listeners: Arc<ListenerSet<()>>,
    bus: EventBus,
    bus_listener: ListenerId,
}

impl Relay {
    fn new(bus: &EventBus, relevant: fn(&LifecycleEvent) -> bool) -> Self {
        let listeners: Arc<ListenerSet<()>> = Arc::new(ListenerSet::new());
        let fan_out = Arc::clone(&listeners);
        let bus_listener = bus.subscribe(move |event| {
            if relevant(event) {
                fan_out.notify(&());
            }
        });
        Self {
            listeners,
            bus: bus.clone(),
            bus_listener,
        }
    }

    fn add<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add(move |_| handler())
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.bus_listener);
    }
}

/// Connection status for status indicators.
pub struct ConnectionStatusBridge {
    status: StatusCell,
    server: Arc<ConnectionStatus>,
    relay: Relay,
}

impl ConnectionStatusBridge {
    pub fn new(bus: &EventBus, status: StatusCell) -> Self {
        Self {
            status,
            server: Arc::new(ConnectionStatus::default()),
            relay: Relay::new(bus, |event| !matches!(event, LifecycleEvent::RowsChanged)),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.relay.listeners.len()
    }
}

impl Observable for ConnectionStatusBridge {
    type Value = ConnectionStatus;

    fn current_value(&self) -> Arc<ConnectionStatus> {
        self.status.get()
    }

    fn server_value(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.server)
    }

    fn on_change<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.relay.add(handler)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.relay.listeners.remove(id)
    }
}

/// Subscribed ledger rows.
pub struct LedgerRowsBridge {
    rows: RowCache,
    server: Arc<Vec<AddressStats>>,
    relay: Relay,
}

impl LedgerRowsBridge {
    pub fn new(bus: &EventBus, rows: RowCache) -> Self {
        Self {
            rows,
            server: Arc::new(Vec::new()),
            relay: Relay::new(bus, |event| {
                matches!(
                    event,
                    LifecycleEvent::SubscriptionApplied
                        | LifecycleEvent::SubscriptionError(_)
                        | LifecycleEvent::RowsChanged
                )
            }),
        }
    }

    /// Cached row for one address.
    pub fn stats_for(&self, address: &str) -> Option<AddressStats> {
        self.rows.get(address)
    }

    pub fn listener_count(&self) -> usize {
        self.relay.listeners.len()
    }
}

impl Observable for LedgerRowsBridge {
    type Value = Vec<AddressStats>;

    fn current_value(&self) -> Arc<Vec<AddressStats>> {
        self.rows.snapshot()
    }

    fn server_value(&self) -> Arc<Vec<AddressStats>> {
        Arc::clone(&self.server)
    }

    fn on_change<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.relay.add(handler)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.relay.listeners.remove(id)
    }
}
