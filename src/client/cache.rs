//! Client-side replica of subscribed ledger rows.

use crate::types::{normalize_address, AddressStats};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    rows: BTreeMap<String, AddressStats>,
    snapshot: Arc<Vec<AddressStats>>,
}

impl Inner {
    fn rebuild(&mut self) {
        self.snapshot = Arc::new(self.rows.values().cloned().collect());
    }
}

/// Rows keyed by address, with a shared ordered snapshot that is only
/// rebuilt when a row actually changes.
#[derive(Clone, Default)]
pub struct RowCache {
    inner: Arc<RwLock<Inner>>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh subscription snapshot.
    pub fn replace_all(&self, rows: Vec<AddressStats>) {
        let mut inner = self.inner.write();
        inner.rows = rows.into_iter().map(|r| (r.address.clone(), r)).collect();
        inner.rebuild();
    }

    /// Apply one pushed row. Rows older than the cached one (lower
    /// `last_day`) and exact repeats are ignored. Returns true on change.
    pub fn upsert(&self, row: AddressStats) -> bool {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.rows.get(&row.address) {
            if existing.last_day > row.last_day || *existing == row {
                return false;
            }
        }
        inner.rows.insert(row.address.clone(), row);
        inner.rebuild();
        true
    }

    /// Ordered by address; reference-equal across calls until a change.
    pub fn snapshot(&self) -> Arc<Vec<AddressStats>> {
        Arc::clone(&self.inner.read().snapshot)
    }

    pub fn get(&self, address: &str) -> Option<AddressStats> {
        self.inner.read().rows.get(&normalize_address(address)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(address: &str, day: i64) -> AddressStats {
        AddressStats {
            last_day: day,
            all_time_count: day as u64,
            ..AddressStats::zero(address)
        }
    }

    #[test]
    fn test_upsert_ignores_older_rows() {
        let cache = RowCache::new();
        assert!(cache.upsert(row("0xa", 3)));
        assert!(!cache.upsert(row("0xa", 2)));
        assert!(!cache.upsert(row("0xa", 3)));
        assert_eq!(cache.get("0xA").unwrap().last_day, 3);
    }

    #[test]
    fn test_snapshot_identity_changes_only_on_change() {
        let cache = RowCache::new();
        cache.upsert(row("0xa", 1));
        let a = cache.snapshot();
        assert!(Arc::ptr_eq(&a, &cache.snapshot()));

        cache.upsert(row("0xa", 1));
        assert!(Arc::ptr_eq(&a, &cache.snapshot()));

        cache.upsert(row("0xb", 1));
        assert!(!Arc::ptr_eq(&a, &cache.snapshot()));
        assert_eq!(cache.snapshot().len(), 2);
    }

    #[test]
    fn test_replace_all() {
        let cache = RowCache::new();
        cache.upsert(row("0xa", 1));
        cache.replace_all(vec![row("0xc", 1), row("0xb", 2)]);

        let addresses: Vec<String> = cache.snapshot().iter().map(|r| r.address.clone()).collect();
        assert_eq!(addresses, vec!["0xb", "0xc"]);
    }
}
