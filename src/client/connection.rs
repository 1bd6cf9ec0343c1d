//! Connection lifecycle manager.
//!
//! Owns the single logical connection to the backend and keeps it alive:
//!
//! ```text
//! Idle -> Connecting -> Connected -> (Disconnected | Error) -> Connecting -> ...
//!                                     \-> Closed (explicit disconnect only)
//! ```
//!
//! Drops and connect errors share one backoff path and retry without
//! limit. Nothing here blocks: transport completions and the reconnect
//! timer are both driven from [`ConnectionManager::pump`], which must be
//! called from a single loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::backoff::ReconnectionState;
use super::bridge::{ConnectionStatusBridge, LedgerRowsBridge};
use super::cache::RowCache;
use super::clock::{Clock, PendingReconnect, ReconnectTimer};
use super::config::ClientConfig;
use super::credentials::CredentialStore;
use super::events::{EventBus, LifecycleEvent};
use super::status::{ConnectionState, ConnectionStatus, StatusCell};
use super::subscription::SubscriptionCoordinator;
use super::transport::{Transport, TransportEvent};
use crate::types::{Identity, SessionToken};

/// Upper bound on poll rounds in one `pump` call.
const MAX_PUMP_ROUNDS: usize = 64;

/// Identifies one logical connection, from `connect()` to `disconnect()`.
/// Reconnects keep the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

pub struct ConnectionManager {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,

    state: ConnectionState,
    connection: Option<ConnectionId>,
    next_connection: u64,
    backoff: ReconnectionState,
    timer: ReconnectTimer,

    status: StatusCell,
    bus: EventBus,
    rows: RowCache,
    subscriptions: SubscriptionCoordinator,
}

impl ConnectionManager {
    pub fn new(
        config: ClientConfig,
        transport: Box<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let status = StatusCell::new();
        let bus = EventBus::new();
        let rows = RowCache::new();
        let subscriptions = SubscriptionCoordinator::new(
            config.queries.clone(),
            status.clone(),
            bus.clone(),
            rows.clone(),
        );

        Self {
            backoff: ReconnectionState::new(config.backoff()),
            config,
            transport,
            credentials,
            clock,
            state: ConnectionState::Idle,
            connection: None,
            next_connection: 1,
            timer: ReconnectTimer::default(),
            status,
            bus,
            rows,
            subscriptions,
        }
    }

    // --- Accessors ---

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> Arc<ConnectionStatus> {
        self.status.get()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn rows(&self) -> &RowCache {
        &self.rows
    }

    pub fn attempt_count(&self) -> u32 {
        self.backoff.attempt_count()
    }

    pub fn pending_reconnect(&self) -> Option<PendingReconnect> {
        self.timer.pending().copied()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscriptions.is_applied()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Observable view of the connection status.
    pub fn status_bridge(&self) -> ConnectionStatusBridge {
        ConnectionStatusBridge::new(&self.bus, self.status.clone())
    }

    /// Observable view of the subscribed ledger rows.
    pub fn rows_bridge(&self) -> LedgerRowsBridge {
        LedgerRowsBridge::new(&self.bus, self.rows.clone())
    }

    // --- Lifecycle ---

    /// Start the connection, or return the one already open or opening.
    ///
    /// Transport failures never surface here; they show up in the status
    /// record and on the event bus, and are retried.
    pub fn connect(&mut self) -> ConnectionId {
        if let (ConnectionState::Connecting | ConnectionState::Connected, Some(id)) =
            (self.state, self.connection)
        {
            debug!(connection = id.0, state = ?self.state, "connect joined existing connection");
            return id;
        }

        let id = match self.connection {
            Some(id) => id,
            None => {
                let id = ConnectionId(self.next_connection);
                self.next_connection += 1;
                self.connection = Some(id);
                id
            }
        };

        if let Some(superseded) = self.timer.cancel() {
            debug!(attempt = superseded.attempt, "pending reconnect superseded by connect()");
        }
        info!(
            connection = id.0,
            uri = %self.config.uri,
            module = %self.config.module_name,
            "connecting"
        );
        self.open_transport();
        id
    }

    /// Tear the connection down for good. No-op when nothing is open or
    /// scheduled.
    pub fn disconnect(&mut self) {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Closed)
            && self.timer.pending().is_none()
        {
            return;
        }

        if let Some(pending) = self.timer.cancel() {
            debug!(attempt = pending.attempt, "pending reconnect cancelled");
        }
        self.transport.close();
        self.subscriptions.teardown();
        let id = self.connection.take();
        self.state = ConnectionState::Closed;
        self.status.reset();
        info!(connection = ?id.map(|c| c.0), "disconnected");

        self.bus.publish(LifecycleEvent::Disconnected);
        self.bus.clear();
    }

    /// Drive the connection: dispatch transport completions and fire the
    /// reconnect timer when due. Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;

        for _ in 0..MAX_PUMP_ROUNDS {
            let events = self.transport.poll();
            let mut progressed = !events.is_empty();
            for event in events {
                self.handle_event(event);
                handled += 1;
            }

            if let Some(due) = self.timer.take_due(self.clock.now_ms()) {
                self.fire_reconnect(due);
                handled += 1;
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        handled
    }

    /// Dispatch one transport event. Events that do not fit the current
    /// state (late completions from a closed session) are dropped.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match (self.state, event) {
            (ConnectionState::Connecting, TransportEvent::Connected { identity, token }) => {
                self.on_connected(identity, token)
            }
            (ConnectionState::Connecting, TransportEvent::ConnectFailed { message }) => {
                self.on_connect_error(message)
            }
            (
                ConnectionState::Connecting | ConnectionState::Connected,
                TransportEvent::Disconnected { reason },
            ) => self.on_disconnected(reason),
            (ConnectionState::Connected, TransportEvent::SubscriptionApplied { request, rows }) => {
                self.subscriptions.on_applied(request, rows);
            }
            (ConnectionState::Connected, TransportEvent::SubscriptionFailed { request, message }) => {
                self.subscriptions.on_error(request, message);
            }
            (ConnectionState::Connected, TransportEvent::RowUpserted { row }) => {
                self.subscriptions.on_row(row);
            }
            (state, event) => {
                debug!(state = ?state, event = ?event, "ignoring transport event");
            }
        }
    }

    fn open_transport(&mut self) {
        self.state = ConnectionState::Connecting;

        let credential = match self.credentials.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "could not load session credential, connecting fresh");
                None
            }
        };

        if let Err(e) = self.transport.open(credential.as_ref()) {
            self.on_connect_error(e.to_string());
        }
    }

    fn on_connected(&mut self, identity: Identity, token: SessionToken) {
        self.state = ConnectionState::Connected;
        self.timer.cancel();
        self.backoff.reset();

        self.status.update(|s| {
            s.is_connected = true;
            s.error = None;
            s.identity = Some(identity);
            s.is_reconnecting = false;
            s.reconnect_attempts = 0;
        });

        if let Err(e) = self.credentials.save(&token) {
            warn!(error = %e, "could not persist session credential");
        }

        info!(identity = %identity, "connection established");
        self.bus.publish(LifecycleEvent::Connected);

        if let Err(e) = self.subscriptions.issue(self.transport.as_mut()) {
            debug!(error = %e, "subscription not issued, connection kept");
        }
    }

    fn on_disconnected(&mut self, reason: Option<String>) {
        self.state = ConnectionState::Disconnected;
        self.subscriptions.teardown();
        self.status.update(|s| {
            s.is_connected = false;
            s.is_subscribed = false;
        });
        warn!(reason = reason.as_deref().unwrap_or("closed"), "connection lost");

        self.schedule_reconnect();
        self.bus.publish(LifecycleEvent::Disconnected);
    }

    fn on_connect_error(&mut self, message: String) {
        self.state = ConnectionState::Error;
        self.subscriptions.teardown();
        self.status.update(|s| {
            s.is_connected = false;
            s.is_subscribed = false;
            s.error = Some(message.clone());
        });
        warn!(error = %message, "connection error");

        self.schedule_reconnect();
        self.bus.publish(LifecycleEvent::ConnectionError(message));
    }

    fn schedule_reconnect(&mut self) {
        let attempt = self.backoff.attempt_count();
        let delay: Duration = self.backoff.next_delay();
        let now = self.clock.now_ms();

        if let Some(superseded) = self.timer.schedule(now, delay, attempt) {
            debug!(attempt = superseded.attempt, "superseded pending reconnect");
        }
        let attempts = self.backoff.attempt_count();
        self.status.update(|s| {
            s.is_reconnecting = true;
            s.reconnect_attempts = attempts;
        });
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = attempt + 1,
            "reconnect scheduled"
        );
    }

    fn fire_reconnect(&mut self, due: PendingReconnect) {
        if !matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Error
        ) {
            debug!(state = ?self.state, "reconnect timer fired in unexpected state");
            return;
        }
        info!(attempt = due.attempt + 1, "reconnecting");
        self.transport.close();
        self.open_transport();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.timer.cancel();
        self.transport.close();
    }
}
