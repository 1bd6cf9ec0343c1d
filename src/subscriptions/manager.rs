//! Feed manager for pushing accepted ledger mutations to subscribers.

use crate::types::AddressStats;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::types::{DropReason, FeedConfig, FeedEvent, FeedHandle, FeedId};

/// Internal subscription state.
struct Subscription {
    config: FeedConfig,
    sender: Sender<FeedEvent>,
}

impl Subscription {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (subscriber will be dropped).
    fn try_send(&self, event: FeedEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Manages feed subscriptions and broadcasts row changes.
pub struct FeedManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<FeedId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl FeedManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber and send it `initial` as its snapshot.
    ///
    /// The subscriber is registered before `initial` runs, so a row
    /// accepted meanwhile is either in the snapshot, queued as a `Row`, or
    /// both. A `Row` may therefore arrive ahead of the `Snapshot`. Rows are
    /// whole records, so consumers keep the one with the higher `last_day`.
    ///
    /// If those early rows fill the buffer before the snapshot fits, the
    /// subscriber is removed and the handle sees no `Snapshot`.
    pub fn subscribe(
        &self,
        config: FeedConfig,
        initial: impl FnOnce(&FeedConfig) -> Vec<AddressStats>,
    ) -> FeedHandle {
        let id = FeedId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        let snapshot_sender = sender.clone();

        // Never hold the map lock across `initial`: writers take a slot
        // lock, then this map's read lock.
        self.subscriptions.write().insert(
            id,
            Subscription {
                config: config.clone(),
                sender,
            },
        );

        let rows = initial(&config);
        if snapshot_sender.try_send(FeedEvent::Snapshot { rows }).is_ok() {
            debug!(feed = id.0, query = %config.query, "feed subscribed");
        } else {
            warn!(feed = id.0, "feed buffer filled before snapshot, subscriber dropped");
            self.subscriptions.write().remove(&id);
        }

        FeedHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: FeedId) {
        if let Some(sub) = self.subscriptions.write().remove(&id) {
            // Best effort
            let _ = sub.sender.try_send(FeedEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Push a changed row to every subscriber whose query selects it.
    /// Drops subscribers that fail to receive.
    pub fn broadcast_row(&self, row: &AddressStats) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.config.query.matches(row)
                    && !sub.try_send(FeedEvent::Row { row: row.clone() })
                {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    warn!(feed = id.0, "slow feed subscriber dropped");
                    let _ = sub.sender.try_send(FeedEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for FeedManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerQuery;
    use std::time::Duration;

    fn row(address: &str, day: i64) -> AddressStats {
        AddressStats {
            last_day: day,
            ..AddressStats::zero(address)
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = FeedManager::new();

        let handle = manager.subscribe(FeedConfig::default(), |_| vec![]);
        assert_eq!(manager.subscription_count(), 1);
        assert!(matches!(handle.try_recv(), Ok(FeedEvent::Snapshot { .. })));

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);
        assert!(matches!(
            handle.try_recv(),
            Ok(FeedEvent::Dropped {
                reason: DropReason::Unsubscribed
            })
        ));
    }

    #[test]
    fn test_snapshot_comes_first() {
        let manager = FeedManager::new();
        let handle = manager.subscribe(FeedConfig::default(), |_| vec![row("0xa", 1)]);

        manager.broadcast_row(&row("0xb", 1));

        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedEvent::Snapshot { rows } => assert_eq!(rows.len(), 1),
            other => panic!("Expected Snapshot, got {:?}", other),
        }
        assert!(matches!(handle.try_recv(), Ok(FeedEvent::Row { .. })));
    }

    #[test]
    fn test_row_committed_during_snapshot_is_delivered() {
        let manager = FeedManager::new();
        let handle = manager.subscribe(FeedConfig::for_query(LedgerQuery::All), |_| {
            let snapshot = vec![row("0xa", 1)];
            manager.broadcast_row(&row("0xa", 2));
            snapshot
        });

        let mut latest = None;
        let mut saw_snapshot = false;
        for event in handle.drain() {
            match event {
                FeedEvent::Snapshot { rows } => {
                    saw_snapshot = true;
                    latest = latest.max(rows.iter().map(|r| r.last_day).max());
                }
                FeedEvent::Row { row } => latest = latest.max(Some(row.last_day)),
                FeedEvent::Dropped { .. } => panic!("subscriber dropped"),
            }
        }
        assert!(saw_snapshot);
        assert_eq!(latest, Some(2));
        assert_eq!(manager.subscription_count(), 1);
    }

    #[test]
    fn test_rows_filling_buffer_before_snapshot_drop_subscriber() {
        let manager = FeedManager::new();
        let config = FeedConfig {
            buffer_size: 1,
            ..Default::default()
        };
        let handle = manager.subscribe(config, |_| {
            manager.broadcast_row(&row("0xa", 2));
            vec![row("0xa", 1)]
        });

        assert_eq!(manager.subscription_count(), 0);
        let events = handle.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FeedEvent::Row { row } if row.last_day == 2));
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_filters_by_query() {
        let manager = FeedManager::new();
        let handle = manager.subscribe(FeedConfig::for_query(LedgerQuery::address("0xa")), |_| {
            vec![]
        });
        handle.drain();

        manager.broadcast_row(&row("0xb", 1));
        assert!(handle.recv_timeout(Duration::from_millis(50)).is_err());

        manager.broadcast_row(&row("0xa", 1));
        match handle.recv_timeout(Duration::from_millis(100)).unwrap() {
            FeedEvent::Row { row } => assert_eq!(row.address, "0xa"),
            other => panic!("Expected Row, got {:?}", other),
        }
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = FeedManager::new();
        let config = FeedConfig {
            buffer_size: 2,
            ..Default::default()
        };
        let _handle = manager.subscribe(config, |_| vec![]);

        for day in 1..10 {
            manager.broadcast_row(&row("0xa", day));
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let manager = FeedManager::new();
        let handle = manager.subscribe(FeedConfig::default(), |_| vec![]);
        drop(handle);

        manager.broadcast_row(&row("0xa", 1));
        assert_eq!(manager.subscription_count(), 0);
    }
}
