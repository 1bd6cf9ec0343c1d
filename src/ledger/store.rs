//! Transactional ledger store.

use crate::error::Result;
use crate::subscriptions::{FeedConfig, FeedHandle, FeedId, FeedManager};
use crate::types::{normalize_address, AddressStats, DayReport, Profile, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::query::{any_matches, LedgerQuery};
use super::reducer::{apply_report, validate_report, Applied};

/// Ledger configuration.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Events buffered per feed subscriber before it is dropped.
    pub feed_buffer_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            feed_buffer_size: 1000,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Self {
        Self {
            feed_buffer_size: std::env::var("STREAKLINE_FEED_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        }
    }
}

/// One ranked leaderboard row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub address: String,
    pub all_time_count: u64,
    pub highest_streak: u32,
    pub profile: Profile,
}

/// Write slot for a single address. Holding its lock is the transaction.
type Slot = Arc<Mutex<Option<AddressStats>>>;

/// The streak ledger.
///
/// Reports for the same address are serialized on that address's slot;
/// reports for different addresses proceed independently.
pub struct LedgerStore {
    config: LedgerConfig,
    slots: RwLock<HashMap<String, Slot>>,
    feed: FeedManager,
}

impl LedgerStore {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            slots: RwLock::new(HashMap::new()),
            feed: FeedManager::new(),
        }
    }

    // --- Writes ---

    /// Apply a day report as one transaction.
    ///
    /// Invalid reports are rejected before any slot is created or locked.
    /// Accepted mutations are pushed to matching feed subscribers while the
    /// slot is still held, so per-address pushes arrive in commit order.
    pub fn report(&self, report: &DayReport) -> Result<Applied> {
        let address = validate_report(report)?;
        let slot = self.slot_for(&address);

        let mut current = slot.lock();
        let applied = apply_report(current.as_ref(), report, Timestamp::now())?;

        if applied.transition.is_accepted() {
            *current = Some(applied.record.clone());
            debug!(
                address = %address,
                day = report.day,
                transition = ?applied.transition,
                current_streak = applied.record.current_streak,
                "report accepted"
            );
            self.feed.broadcast_row(&applied.record);
        } else {
            debug!(address = %address, day = report.day, "duplicate report ignored");
        }

        Ok(applied)
    }

    fn slot_for(&self, address: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(address) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(slots.entry(address.to_string()).or_default())
    }

    // --- Reads ---

    /// Get the record for an address.
    pub fn get(&self, address: &str) -> Option<AddressStats> {
        let key = normalize_address(address);
        let slot = self.slots.read().get(&key).cloned()?;
        let record = slot.lock().clone();
        record
    }

    /// Record for an address, or a zeroed one if it has never reported.
    pub fn stats_or_zero(&self, address: &str) -> AddressStats {
        self.get(address)
            .unwrap_or_else(|| AddressStats::zero(normalize_address(address)))
    }

    /// Rows selected by any of `queries`, each row at most once, ordered by
    /// address.
    pub fn rows(&self, queries: &[LedgerQuery]) -> Vec<AddressStats> {
        if queries.is_empty() {
            return Vec::new();
        }

        let mut rows: Vec<AddressStats> = if queries.iter().any(|q| *q == LedgerQuery::All) {
            self.snapshot_all()
        } else {
            let keys: HashSet<String> = queries
                .iter()
                .filter_map(|q| match q {
                    LedgerQuery::Address(a) => Some(normalize_address(a)),
                    LedgerQuery::All => None,
                })
                .collect();
            keys.iter().filter_map(|k| self.get(k)).collect()
        };

        rows.retain(|r| any_matches(queries, r));
        rows.sort_by(|a, b| a.address.cmp(&b.address));
        rows
    }

    fn snapshot_all(&self) -> Vec<AddressStats> {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        slots.iter().filter_map(|s| s.lock().clone()).collect()
    }

    /// Number of addresses with an accepted report.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        slots.iter().filter(|s| s.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Profiled participants ranked by accepted reports.
    ///
    /// Ties break on highest streak, then address. Rows without a `fid`
    /// are left out.
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<AddressStats> = self
            .snapshot_all()
            .into_iter()
            .filter(|r| r.profile.fid.is_some() && r.all_time_count > 0)
            .collect();

        rows.sort_by(|a, b| {
            b.all_time_count
                .cmp(&a.all_time_count)
                .then(b.highest_streak.cmp(&a.highest_streak))
                .then(a.address.cmp(&b.address))
        });

        rows.into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, r)| LeaderboardEntry {
                rank: i + 1,
                address: r.address,
                all_time_count: r.all_time_count,
                highest_streak: r.highest_streak,
                profile: r.profile,
            })
            .collect()
    }

    // --- Feeds ---

    /// Subscribe to rows selected by `query`. The first event is a
    /// snapshot of the current matching rows.
    pub fn subscribe(&self, query: LedgerQuery) -> FeedHandle {
        let config = FeedConfig {
            buffer_size: self.config.feed_buffer_size,
            query,
        };
        self.feed
            .subscribe(config, |c| self.rows(std::slice::from_ref(&c.query)))
    }

    pub fn unsubscribe(&self, id: FeedId) {
        self.feed.unsubscribe(id);
    }

    pub fn feed_count(&self) -> usize {
        self.feed.subscription_count()
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::subscriptions::FeedEvent;
    use std::thread;

    #[test]
    fn test_report_persists_and_reads_back() {
        let store = LedgerStore::default();
        store.report(&DayReport::new("0xA", 1)).unwrap();
        store.report(&DayReport::new("0xa", 2)).unwrap();

        let r = store.get("0XA").unwrap();
        assert_eq!(r.current_streak, 2);
        assert_eq!(r.all_time_count, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_report_creates_nothing() {
        let store = LedgerStore::default();
        let result = store.report(&DayReport::new("0xa", 0));
        assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        assert!(store.slots.read().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_len_counts_committed_records() {
        let store = LedgerStore::default();
        store.report(&DayReport::new("0xa", 1)).unwrap();
        store.report(&DayReport::new("0xa", 1)).unwrap();
        store.report(&DayReport::new("0xb", 1)).unwrap();
        let _ = store.report(&DayReport::new("0xc", 0));
        assert_eq!(store.len(), 2);

        // A slot whose first report never committed is not a record.
        store.slot_for("0xd");
        assert_eq!(store.slots.read().len(), 3);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_stats_or_zero() {
        let store = LedgerStore::default();
        let zero = store.stats_or_zero(" 0xB ");
        assert_eq!(zero.address, "0xb");
        assert_eq!(zero.all_time_count, 0);
    }

    #[test]
    fn test_rows_dedupes_overlapping_queries() {
        let store = LedgerStore::default();
        store.report(&DayReport::new("0xa", 1)).unwrap();
        store.report(&DayReport::new("0xb", 1)).unwrap();

        let rows = store.rows(&[LedgerQuery::All, LedgerQuery::address("0xa")]);
        assert_eq!(rows.len(), 2);

        let rows = store.rows(&[LedgerQuery::address("0xb"), LedgerQuery::address("0xB")]);
        assert_eq!(rows.len(), 1);
        assert!(store.rows(&[]).is_empty());
    }

    #[test]
    fn test_concurrent_duplicates_count_once() {
        let store = LedgerStore::default();

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for day in 1..=20 {
                        store.report(&DayReport::new("0xa", day)).unwrap();
                    }
                });
            }
        });

        let r = store.get("0xa").unwrap();
        assert_eq!(r.all_time_count, 20);
        assert_eq!(r.current_streak, 20);
        assert_eq!(r.last_day, 20);
    }

    #[test]
    fn test_only_accepted_reports_are_pushed() {
        let store = LedgerStore::default();
        let handle = store.subscribe(LedgerQuery::address("0xa"));
        assert!(matches!(handle.try_recv(), Ok(FeedEvent::Snapshot { rows }) if rows.is_empty()));

        store.report(&DayReport::new("0xa", 1)).unwrap();
        store.report(&DayReport::new("0xa", 1)).unwrap();
        store.report(&DayReport::new("0xb", 1)).unwrap();

        let events = handle.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FeedEvent::Row { row } if row.last_day == 1));
    }

    #[test]
    fn test_leaderboard_ranks_profiled_rows() {
        let store = LedgerStore::default();
        let profiled = |fid| Profile {
            fid: Some(fid),
            ..Default::default()
        };

        for day in 1..=3 {
            store
                .report(&DayReport::new("0xa", day).with_profile(profiled(1)))
                .unwrap();
        }
        store
            .report(&DayReport::new("0xb", 1).with_profile(profiled(2)))
            .unwrap();
        for day in 1..=5 {
            store.report(&DayReport::new("0xanon", day)).unwrap();
        }

        let board = store.leaderboard(10);
        assert_eq!(board.len(), 2);
        assert_eq!((board[0].rank, board[0].address.as_str()), (1, "0xa"));
        assert_eq!((board[1].rank, board[1].address.as_str()), (2, "0xb"));
        assert_eq!(store.leaderboard(1).len(), 1);
    }
}
