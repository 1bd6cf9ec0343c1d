//! # Streakline
//!
//! A daily check-in streak ledger and a client that keeps a live local copy
//! of it across an unreliable connection.
//!
//! ## Core Concepts
//!
//! - **Ledger**: One record per address; day reports extend, reset, or are
//!   ignored as duplicates, atomically per address
//! - **Feeds**: Accepted changes are pushed to every matching subscriber
//! - **Client**: Single-flight connect, exponential-backoff reconnect, and
//!   automatic resubscription
//! - **Bridges**: Reference-stable snapshots with change notification
//!
//! ## Example
//!
//! ```ignore
//! use streakline::{DayReport, LedgerStore};
//!
//! let store = LedgerStore::default();
//! store.report(&DayReport::new("0xAbC", 100))?;
//! let applied = store.report(&DayReport::new("0xabc", 101))?;
//! assert_eq!(applied.record.current_streak, 2);
//! ```

pub mod boundary;
pub mod client;
pub mod error;
pub mod ledger;
pub mod service;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use boundary::{
    authorize_claim, check_fail_open, ClaimAuthority, ClaimDecision, DenyReason,
    FixedWindowLimiter, RateDecision, RateLimitConfig, RateLimiter, SignedClaim,
};
pub use client::{
    ClientConfig, ConnectionManager, ConnectionState, ConnectionStatus, ConnectionStatusBridge,
    CredentialStore, EventBus, LedgerRowsBridge, LifecycleEvent, Observable, Transport,
};
pub use error::{LedgerError, Result};
pub use ledger::{
    apply_report, validate_report, Applied, LeaderboardEntry, LedgerConfig, LedgerQuery,
    LedgerStore, Transition,
};
pub use service::{ReportReceipt, ReportService};
pub use subscriptions::{DropReason, FeedConfig, FeedEvent, FeedHandle, FeedId, FeedManager};
pub use types::*;
