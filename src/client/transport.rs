//! Transport boundary between the connection manager and the backend.

use crate::error::{LedgerError, Result};
use crate::ledger::{LedgerQuery, LedgerStore};
use crate::subscriptions::{DropReason, FeedEvent, FeedHandle};
use crate::types::{AddressStats, Identity, SessionToken};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identifies one issued query set, so late acks for an older set can be
/// told apart from the current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionRequestId(pub u64);

/// Completion events produced by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        identity: Identity,
        token: SessionToken,
    },
    ConnectFailed {
        message: String,
    },
    Disconnected {
        reason: Option<String>,
    },
    SubscriptionApplied {
        request: SubscriptionRequestId,
        rows: Vec<AddressStats>,
    },
    SubscriptionFailed {
        request: SubscriptionRequestId,
        message: String,
    },
    RowUpserted {
        row: AddressStats,
    },
}

/// A connection to the ledger backend.
///
/// Every method returns immediately. Outcomes arrive later through
/// [`Transport::poll`]; a synchronous `Err` means the request could not
/// even be started.
pub trait Transport: Send {
    /// Begin opening a connection, presenting `credential` if one is cached.
    fn open(&mut self, credential: Option<&SessionToken>) -> Result<()>;

    /// Close the connection. Events from the closed session are discarded.
    fn close(&mut self);

    /// Issue a query set on the open connection.
    fn subscribe(&mut self, request: SubscriptionRequestId, queries: &[LedgerQuery]) -> Result<()>;

    /// Drain completed events in the order they happened.
    fn poll(&mut self) -> Vec<TransportEvent>;
}

struct ControlInner {
    online: AtomicBool,
    reject_subscriptions: AtomicBool,
    drop_epoch: AtomicU64,
    opens: AtomicU64,
    tokens_issued: AtomicU64,
}

/// Fault-injection handle for a [`LoopbackTransport`].
#[derive(Clone)]
pub struct LoopbackControl {
    inner: Arc<ControlInner>,
}

impl LoopbackControl {
    fn new() -> Self {
        Self {
            inner: Arc::new(ControlInner {
                online: AtomicBool::new(true),
                reject_subscriptions: AtomicBool::new(false),
                drop_epoch: AtomicU64::new(0),
                opens: AtomicU64::new(0),
                tokens_issued: AtomicU64::new(0),
            }),
        }
    }

    /// While offline, connect attempts fail and open sessions drop.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Drop the current session on the next poll.
    pub fn drop_connection(&self) {
        self.inner.drop_epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn reject_subscriptions(&self, reject: bool) {
        self.inner.reject_subscriptions.store(reject, Ordering::SeqCst);
    }

    /// Number of times a transport was opened.
    pub fn open_count(&self) -> u64 {
        self.inner.opens.load(Ordering::SeqCst)
    }

    fn issue_token(&self) -> SessionToken {
        let n = self.inner.tokens_issued.fetch_add(1, Ordering::SeqCst);
        SessionToken(format!("loopback-session-{}", n))
    }
}

/// In-process transport backed directly by a [`LedgerStore`].
pub struct LoopbackTransport {
    store: Arc<LedgerStore>,
    control: LoopbackControl,
    open: bool,
    seen_drop_epoch: u64,
    pending: VecDeque<TransportEvent>,
    feeds: Vec<(SubscriptionRequestId, FeedHandle)>,
}

impl LoopbackTransport {
    pub fn new(store: Arc<LedgerStore>) -> (Self, LoopbackControl) {
        let control = LoopbackControl::new();
        let transport = Self {
            store,
            control: control.clone(),
            open: false,
            seen_drop_epoch: 0,
            pending: VecDeque::new(),
            feeds: Vec::new(),
        };
        (transport, control)
    }

    fn release_feeds(&mut self) {
        for (_, feed) in self.feeds.drain(..) {
            self.store.unsubscribe(feed.id);
        }
    }

    fn drop_session(&mut self, reason: &str) {
        debug!(reason, "loopback session dropped");
        self.open = false;
        self.release_feeds();
        self.pending.push_back(TransportEvent::Disconnected {
            reason: Some(reason.to_string()),
        });
    }
}

fn drop_message(reason: &DropReason) -> String {
    match reason {
        DropReason::BufferOverflow => "feed dropped: buffer overflow".into(),
        DropReason::Unsubscribed => "feed dropped: unsubscribed".into(),
    }
}

/// Events queued on freshly registered feeds. Rows committed while a feed
/// was registering can sit next to (or ahead of) its snapshot.
#[derive(Default)]
struct InitialRows {
    snapshot: BTreeMap<String, AddressStats>,
    updates: Vec<AddressStats>,
}

impl InitialRows {
    /// Take one feed's queued events. A feed that was dropped or never got
    /// its snapshot is an error.
    fn absorb(&mut self, events: Vec<FeedEvent>) -> std::result::Result<(), String> {
        let mut saw_snapshot = false;
        for event in events {
            match event {
                FeedEvent::Snapshot { rows } => {
                    saw_snapshot = true;
                    for row in rows {
                        self.snapshot.insert(row.address.clone(), row);
                    }
                }
                FeedEvent::Row { row } => self.updates.push(row),
                FeedEvent::Dropped { reason } => return Err(drop_message(&reason)),
            }
        }
        if !saw_snapshot {
            return Err(drop_message(&DropReason::BufferOverflow));
        }
        Ok(())
    }

    /// Snapshot rows, then the rows to replay after it.
    fn finish(self) -> (Vec<AddressStats>, Vec<AddressStats>) {
        (self.snapshot.into_values().collect(), self.updates)
    }
}

impl Transport for LoopbackTransport {
    fn open(&mut self, credential: Option<&SessionToken>) -> Result<()> {
        self.control.inner.opens.fetch_add(1, Ordering::SeqCst);

        if !self.control.inner.online.load(Ordering::SeqCst) {
            self.pending.push_back(TransportEvent::ConnectFailed {
                message: "connection refused".into(),
            });
            return Ok(());
        }

        let token = credential
            .cloned()
            .unwrap_or_else(|| self.control.issue_token());
        self.open = true;
        self.seen_drop_epoch = self.control.inner.drop_epoch.load(Ordering::SeqCst);
        self.pending.push_back(TransportEvent::Connected {
            identity: token.identity(),
            token,
        });
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        self.release_feeds();
        self.pending.clear();
    }

    fn subscribe(&mut self, request: SubscriptionRequestId, queries: &[LedgerQuery]) -> Result<()> {
        if !self.open {
            return Err(LedgerError::Closed);
        }
        self.release_feeds();

        if self.control.inner.reject_subscriptions.load(Ordering::SeqCst) {
            self.pending.push_back(TransportEvent::SubscriptionFailed {
                request,
                message: "query rejected".into(),
            });
            return Ok(());
        }

        let mut initial = InitialRows::default();
        let mut failure = None;
        for query in queries {
            let feed = self.store.subscribe(query.clone());
            if let Err(message) = initial.absorb(feed.drain()) {
                failure.get_or_insert(message);
            }
            self.feeds.push((request, feed));
        }

        if let Some(message) = failure {
            self.release_feeds();
            self.pending
                .push_back(TransportEvent::SubscriptionFailed { request, message });
            return Ok(());
        }

        let (rows, updates) = initial.finish();
        self.pending
            .push_back(TransportEvent::SubscriptionApplied { request, rows });
        self.pending
            .extend(updates.into_iter().map(|row| TransportEvent::RowUpserted { row }));
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        if self.open {
            let epoch = self.control.inner.drop_epoch.load(Ordering::SeqCst);
            if epoch != self.seen_drop_epoch {
                self.drop_session("connection reset");
            } else if !self.control.inner.online.load(Ordering::SeqCst) {
                self.drop_session("network unreachable");
            }
        }

        let mut overflowed = None;
        for (request, feed) in &self.feeds {
            for event in feed.drain() {
                match event {
                    FeedEvent::Row { row } => {
                        self.pending.push_back(TransportEvent::RowUpserted { row })
                    }
                    FeedEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    } => overflowed = Some(*request),
                    FeedEvent::Dropped { .. } | FeedEvent::Snapshot { .. } => {}
                }
            }
        }
        if let Some(request) = overflowed {
            self.release_feeds();
            self.pending.push_back(TransportEvent::SubscriptionFailed {
                request,
                message: drop_message(&DropReason::BufferOverflow),
            });
        }

        self.pending.drain(..).collect()
    }
}
