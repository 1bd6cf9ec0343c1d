//! Server-side streak ledger.
//!
//! A report is validated, applied to the current record for its address
//! under that address's write slot, and, if it changed anything, pushed to
//! every feed whose query selects the row.

mod query;
mod reducer;
mod store;

pub use query::{any_matches, LedgerQuery};
pub use reducer::{apply_report, validate_report, Applied, Transition};
pub use store::{LeaderboardEntry, LedgerConfig, LedgerStore};
