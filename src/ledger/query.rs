//! Declarative reads over the ledger.

use crate::types::{normalize_address, AddressStats};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A standing read query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum LedgerQuery {
    /// Every row.
    All,
    /// The row for one address.
    Address(String),
}

impl LedgerQuery {
    /// Query for a single address (normalized).
    pub fn address(address: &str) -> Self {
        LedgerQuery::Address(normalize_address(address))
    }

    /// Check if a row is selected by this query.
    pub fn matches(&self, row: &AddressStats) -> bool {
        match self {
            LedgerQuery::All => true,
            LedgerQuery::Address(address) => row.address == normalize_address(address),
        }
    }
}

impl fmt::Display for LedgerQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerQuery::All => write!(f, "SELECT * FROM address_stats"),
            LedgerQuery::Address(address) => {
                write!(f, "SELECT * FROM address_stats WHERE address = '{}'", address)
            }
        }
    }
}

/// True if any query in the set selects `row`.
pub fn any_matches(queries: &[LedgerQuery], row: &AddressStats) -> bool {
    queries.iter().any(|q| q.matches(row))
}
