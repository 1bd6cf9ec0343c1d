//! Issues the client's query set and tracks whether it is applied.

use crate::error::{LedgerError, Result};
use crate::ledger::{any_matches, LedgerQuery};
use crate::types::AddressStats;
use tracing::{debug, info, warn};

use super::cache::RowCache;
use super::events::{EventBus, LifecycleEvent};
use super::status::StatusCell;
use super::transport::{SubscriptionRequestId, Transport};

/// Query set for the current connection.
///
/// Subscriptions never outlive a connection: [`SubscriptionCoordinator::teardown`]
/// forgets the outstanding request, and [`SubscriptionCoordinator::issue`]
/// must run again after every connect.
pub struct SubscriptionCoordinator {
    queries: Vec<LedgerQuery>,
    applied: bool,
    current: Option<SubscriptionRequestId>,
    next_request: u64,
    status: StatusCell,
    bus: EventBus,
    rows: RowCache,
}

impl SubscriptionCoordinator {
    pub fn new(queries: Vec<LedgerQuery>, status: StatusCell, bus: EventBus, rows: RowCache) -> Self {
        Self {
            queries,
            applied: false,
            current: None,
            next_request: 1,
            status,
            bus,
            rows,
        }
    }

    pub fn queries(&self) -> &[LedgerQuery] {
        &self.queries
    }

    /// True only while acknowledged on the current connection.
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub fn current_request(&self) -> Option<SubscriptionRequestId> {
        self.current
    }

    /// Send the query set on `transport`. A request that cannot be started
    /// is reported like a rejection; the connection is left alone.
    pub fn issue(&mut self, transport: &mut dyn Transport) -> Result<SubscriptionRequestId> {
        let request = SubscriptionRequestId(self.next_request);
        self.next_request += 1;
        self.applied = false;
        self.current = Some(request);

        debug!(request = request.0, queries = self.queries.len(), "issuing subscription");
        if let Err(e) = transport.subscribe(request, &self.queries) {
            let message = e.to_string();
            self.on_error(request, message.clone());
            return Err(LedgerError::Subscription(message));
        }
        Ok(request)
    }

    /// Backend acknowledged `request` with its initial rows. Returns false
    /// for acks of superseded requests.
    pub fn on_applied(&mut self, request: SubscriptionRequestId, rows: Vec<AddressStats>) -> bool {
        if self.current != Some(request) {
            debug!(request = request.0, "ignoring ack for stale subscription");
            return false;
        }

        self.applied = true;
        info!(request = request.0, rows = rows.len(), "subscription applied");
        self.rows.replace_all(rows);
        self.status.update(|s| s.is_subscribed = true);
        self.bus.publish(LifecycleEvent::SubscriptionApplied);
        true
    }

    /// Backend rejected `request`.
    pub fn on_error(&mut self, request: SubscriptionRequestId, message: String) -> bool {
        if self.current != Some(request) {
            debug!(request = request.0, "ignoring error for stale subscription");
            return false;
        }

        self.applied = false;
        self.current = None;
        warn!(request = request.0, error = %message, "subscription rejected");
        self.status.update(|s| s.is_subscribed = false);
        self.bus.publish(LifecycleEvent::SubscriptionError(message));
        true
    }

    /// Incremental row update. Only applied while subscribed.
    pub fn on_row(&mut self, row: AddressStats) -> bool {
        if !self.applied || !any_matches(&self.queries, &row) {
            return false;
        }
        if self.rows.upsert(row) {
            self.bus.publish(LifecycleEvent::RowsChanged);
            return true;
        }
        false
    }

    /// Forget the subscription when its connection goes away.
    pub fn teardown(&mut self) {
        self.applied = false;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionToken;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingTransport {
        issued: Vec<SubscriptionRequestId>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn open(&mut self, _credential: Option<&SessionToken>) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
        fn subscribe(&mut self, request: SubscriptionRequestId, _q: &[LedgerQuery]) -> Result<()> {
            if self.fail {
                return Err(LedgerError::Transport("not connected".into()));
            }
            self.issued.push(request);
            Ok(())
        }
        fn poll(&mut self) -> Vec<crate::client::TransportEvent> {
            Vec::new()
        }
    }

    fn coordinator() -> (SubscriptionCoordinator, StatusCell, Arc<Mutex<Vec<LifecycleEvent>>>) {
        let status = StatusCell::new();
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |e| sink.lock().push(e.clone()));
        let coord = SubscriptionCoordinator::new(
            vec![LedgerQuery::All],
            status.clone(),
            bus,
            RowCache::new(),
        );
        (coord, status, seen)
    }

    #[test]
    fn test_applied_sets_flag_and_publishes() {
        let (mut coord, status, seen) = coordinator();
        let mut transport = RecordingTransport::default();

        let request = coord.issue(&mut transport).unwrap();
        assert!(!coord.is_applied());
        assert!(coord.on_applied(request, vec![AddressStats::zero("0xa")]));

        assert!(coord.is_applied());
        assert!(status.get().is_subscribed);
        assert_eq!(*seen.lock(), vec![LifecycleEvent::SubscriptionApplied]);
    }

    #[test]
    fn test_stale_ack_ignored() {
        let (mut coord, status, _seen) = coordinator();
        let mut transport = RecordingTransport::default();

        let first = coord.issue(&mut transport).unwrap();
        let second = coord.issue(&mut transport).unwrap();
        assert_ne!(first, second);

        assert!(!coord.on_applied(first, vec![]));
        assert!(!status.get().is_subscribed);
        assert!(coord.on_applied(second, vec![]));
    }

    #[test]
    fn test_rejection_keeps_flag_false() {
        let (mut coord, status, seen) = coordinator();
        let mut transport = RecordingTransport::default();

        let request = coord.issue(&mut transport).unwrap();
        assert!(coord.on_error(request, "bad query".into()));
        assert!(!status.get().is_subscribed);
        assert_eq!(
            *seen.lock(),
            vec![LifecycleEvent::SubscriptionError("bad query".into())]
        );
    }

    #[test]
    fn test_issue_failure_reported_as_subscription_error() {
        let (mut coord, _status, seen) = coordinator();
        let mut transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };

        assert!(coord.issue(&mut transport).is_err());
        assert!(matches!(seen.lock()[0], LifecycleEvent::SubscriptionError(_)));
        assert!(coord.current_request().is_none());
    }

    #[test]
    fn test_rows_ignored_after_teardown() {
        let (mut coord, _status, _seen) = coordinator();
        let mut transport = RecordingTransport::default();
        let request = coord.issue(&mut transport).unwrap();
        coord.on_applied(request, vec![]);

        assert!(coord.on_row(AddressStats::zero("0xa")));
        coord.teardown();
        assert!(!coord.on_row(AddressStats {
            last_day: 2,
            ..AddressStats::zero("0xa")
        }));
    }
}
