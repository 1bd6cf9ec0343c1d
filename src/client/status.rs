//! Connection status record shared with observers.

use crate::types::Identity;
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle state of the single logical connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Error,
    /// Reached only through an explicit `disconnect()`.
    Closed,
}

/// Current connection status. Replaced wholesale on every change, never
/// mutated in place, so a held `Arc` is a consistent snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub is_subscribed: bool,
    /// A reconnect is scheduled.
    pub is_reconnecting: bool,
    pub reconnect_attempts: u32,
    /// Last connection error; cleared on successful connect.
    pub error: Option<String>,
    pub identity: Option<Identity>,
}

/// What a live status indicator should show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusIndicator {
    /// Connected and subscribed.
    Live,
    /// Connected, waiting on the subscription.
    Syncing,
    Reconnecting,
    Offline,
}

impl ConnectionStatus {
    pub fn indicator(&self) -> StatusIndicator {
        match (self.is_connected, self.is_subscribed, self.is_reconnecting) {
            (true, true, _) => StatusIndicator::Live,
            (true, false, _) => StatusIndicator::Syncing,
            (false, _, true) => StatusIndicator::Reconnecting,
            (false, _, false) => StatusIndicator::Offline,
        }
    }
}

/// Shared cell holding the current status snapshot.
#[derive(Clone, Default)]
pub struct StatusCell {
    current: Arc<RwLock<Arc<ConnectionStatus>>>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Reference-equal across calls until the next
    /// update.
    pub fn get(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.current.read())
    }

    /// Apply `f` to a copy and publish it. Returns false (and keeps the old
    /// snapshot) when nothing changed.
    pub fn update(&self, f: impl FnOnce(&mut ConnectionStatus)) -> bool {
        let mut current = self.current.write();
        let mut next = ConnectionStatus::clone(&current);
        f(&mut next);
        if next == **current {
            return false;
        }
        *current = Arc::new(next);
        true
    }

    /// Back to the disconnected default.
    pub fn reset(&self) {
        self.update(|s| *s = ConnectionStatus::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_stable_until_update() {
        let cell = StatusCell::new();
        let a = cell.get();
        let b = cell.get();
        assert!(Arc::ptr_eq(&a, &b));

        assert!(cell.update(|s| s.is_connected = true));
        let c = cell.get();
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(c.is_connected);
        assert!(!a.is_connected);
    }

    #[test]
    fn test_noop_update_keeps_reference() {
        let cell = StatusCell::new();
        let a = cell.get();
        assert!(!cell.update(|s| s.is_connected = false));
        assert!(Arc::ptr_eq(&a, &cell.get()));
    }

    #[test]
    fn test_indicator() {
        let mut s = ConnectionStatus::default();
        assert_eq!(s.indicator(), StatusIndicator::Offline);
        s.is_reconnecting = true;
        assert_eq!(s.indicator(), StatusIndicator::Reconnecting);
        s.is_connected = true;
        s.is_reconnecting = false;
        assert_eq!(s.indicator(), StatusIndicator::Syncing);
        s.is_subscribed = true;
        assert_eq!(s.indicator(), StatusIndicator::Live);
    }
}
