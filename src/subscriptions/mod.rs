//! Server-side push feeds for live ledger updates.
//!
//! Every accepted report is pushed to each subscriber whose query selects
//! the changed row. Feeds support:
//! - Filtering by [`LedgerQuery`](crate::ledger::LedgerQuery)
//! - An initial snapshot of matching rows
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(LedgerQuery::All);
//!
//! loop {
//!     match handle.recv() {
//!         Ok(FeedEvent::Snapshot { rows }) => println!("{} rows", rows.len()),
//!         Ok(FeedEvent::Row { row }) => println!("updated: {}", row.address),
//!         Ok(FeedEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::FeedManager;
pub use types::{DropReason, FeedConfig, FeedEvent, FeedHandle, FeedId};
