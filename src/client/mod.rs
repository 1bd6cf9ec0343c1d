//! Client connection layer.
//!
//! Keeps a local, observable copy of the ledger coherent with the backend
//! across an unreliable connection:
//! - [`ConnectionManager`] owns the connection and reconnects with backoff
//! - [`SubscriptionCoordinator`] re-issues the query set after every connect
//! - [`EventBus`] fans lifecycle events out to listeners
//! - [`ConnectionStatusBridge`] and [`LedgerRowsBridge`] give readers
//!   snapshot-plus-notify access
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(LedgerStore::default());
//! let (transport, _control) = LoopbackTransport::new(Arc::clone(&store));
//! let mut manager = ConnectionManager::new(
//!     ClientConfig::default(),
//!     Box::new(transport),
//!     Arc::new(MemoryCredentialStore::new()),
//!     Arc::new(SystemClock::new()),
//! );
//!
//! let rows = manager.rows_bridge();
//! rows.on_change(|| println!("rows changed"));
//!
//! manager.connect();
//! loop {
//!     manager.pump();
//!     std::thread::sleep(Duration::from_millis(50));
//! }
//! ```

mod backoff;
mod bridge;
mod cache;
mod clock;
mod config;
mod connection;
mod credentials;
mod events;
mod status;
mod subscription;
mod transport;

pub use backoff::{BackoffPolicy, ReconnectionState};
pub use bridge::{ConnectionStatusBridge, LedgerRowsBridge, Observable};
pub use cache::RowCache;
pub use clock::{Clock, ManualClock, PendingReconnect, ReconnectTimer, SystemClock};
pub use config::ClientConfig;
pub use connection::{ConnectionId, ConnectionManager};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use events::{EventBus, LifecycleEvent, ListenerId, ListenerSet};
pub use status::{ConnectionState, ConnectionStatus, StatusCell, StatusIndicator};
pub use subscription::SubscriptionCoordinator;
pub use transport::{
    LoopbackControl, LoopbackTransport, SubscriptionRequestId, Transport, TransportEvent,
};
