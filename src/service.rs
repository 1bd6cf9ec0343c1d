//! Report ingress.
//!
//! Sits in front of [`LedgerStore`]: validates, consults the rate limiter,
//! applies, and keeps the daily counter up to date.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::boundary::{check_fail_open, RateLimitConfig, RateLimiter};
use crate::error::{LedgerError, Result};
use crate::ledger::{validate_report, LeaderboardEntry, LedgerStore, Transition};
use crate::types::{AddressStats, DayReport};

/// Outcome of a submitted report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportReceipt {
    pub record: AddressStats,
    pub transition: Transition,
}

impl ReportReceipt {
    pub fn accepted(&self) -> bool {
        self.transition.is_accepted()
    }
}

pub struct ReportService {
    store: Arc<LedgerStore>,
    limiter: Arc<dyn RateLimiter>,
    rate: RateLimitConfig,
}

impl ReportService {
    pub fn new(store: Arc<LedgerStore>, limiter: Arc<dyn RateLimiter>, rate: RateLimitConfig) -> Self {
        Self {
            store,
            limiter,
            rate,
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Submit one day report.
    ///
    /// Malformed reports are rejected before the limiter is asked. A limiter
    /// that cannot be reached lets the report through.
    pub fn submit(&self, report: &DayReport) -> Result<ReportReceipt> {
        let address = validate_report(report)?;

        let key = format!("report:{}", address);
        let decision = check_fail_open(self.limiter.as_ref(), &key, &self.rate);
        if !decision.allowed {
            debug!(address = %address, "report rate limited");
            return Err(LedgerError::RateLimited {
                key,
                remaining: decision.remaining,
            });
        }

        let applied = self.store.report(report)?;
        if applied.transition.is_accepted() {
            if let Err(e) = self.limiter.record_report(report.day) {
                warn!(day = report.day, error = %e, "failed to count accepted report");
            }
            if applied.transition == Transition::Created {
                info!(address = %address, "first report for address");
            }
        }

        Ok(ReportReceipt {
            record: applied.record,
            transition: applied.transition,
        })
    }

    /// Stats for an address; unknown addresses read as all zeros.
    pub fn stats(&self, address: &str) -> AddressStats {
        self.store.stats_or_zero(address)
    }

    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        self.store.leaderboard(limit)
    }

    /// Accepted reports for `day`, or `None` when the counter is unavailable.
    pub fn daily_total(&self, day: i64) -> Option<u64> {
        match self.limiter.daily_total(day) {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(day, error = %e, "daily counter unavailable");
                None
            }
        }
    }
}
