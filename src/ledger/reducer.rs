//! Day-report application.

use crate::error::{LedgerError, Result};
use crate::types::{normalize_address, AddressStats, DayReport, Timestamp};
use serde::{Deserialize, Serialize};

/// What a report did to the record it was applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// First accepted report for the address.
    Created,
    /// Reported the day after `last_day`; streak extended.
    Extended,
    /// Reported after a gap; streak restarted at 1.
    Reset,
    /// `day <= last_day`; nothing changed.
    Duplicate,
}

impl Transition {
    /// Whether the record was mutated (and must be pushed to subscribers).
    pub fn is_accepted(self) -> bool {
        !matches!(self, Transition::Duplicate)
    }
}

/// Result of applying one report.
#[derive(Clone, Debug)]
pub struct Applied {
    pub record: AddressStats,
    pub transition: Transition,
}

impl Applied {
    pub fn is_duplicate(&self) -> bool {
        self.transition == Transition::Duplicate
    }
}

/// Check a report before anything is read or written.
///
/// Returns the normalized address.
pub fn validate_report(report: &DayReport) -> Result<String> {
    let address = normalize_address(&report.address);
    if address.is_empty() {
        return Err(LedgerError::InvalidInput("address is required".into()));
    }
    if report.day <= 0 {
        return Err(LedgerError::InvalidInput(format!(
            "day must be a positive integer (got {})",
            report.day
        )));
    }
    Ok(address)
}

/// Apply a day report to the current record for its address.
///
/// Pure: the caller owns persistence and must hold the address's write
/// slot for the duration of the call.
pub fn apply_report(
    existing: Option<&AddressStats>,
    report: &DayReport,
    now: Timestamp,
) -> Result<Applied> {
    let address = validate_report(report)?;

    let Some(current) = existing else {
        return Ok(Applied {
            record: AddressStats {
                address,
                current_streak: 1,
                highest_streak: 1,
                all_time_count: 1,
                last_day: report.day,
                last_tx_hash: report.tx_hash.clone(),
                profile: report.profile.clone(),
                updated_at: now,
            },
            transition: Transition::Created,
        });
    };

    if report.day <= current.last_day {
        return Ok(Applied {
            record: current.clone(),
            transition: Transition::Duplicate,
        });
    }

    let mut record = current.clone();
    let transition = if report.day == current.last_day + 1 {
        record.current_streak = record.current_streak.saturating_add(1);
        Transition::Extended
    } else {
        record.current_streak = 1;
        Transition::Reset
    };

    record.highest_streak = record.highest_streak.max(record.current_streak);
    record.all_time_count = record.all_time_count.saturating_add(1);
    record.last_day = report.day;
    record.last_tx_hash = report.tx_hash.clone().or(record.last_tx_hash);
    record.profile = record.profile.merged_with(&report.profile);
    record.updated_at = now;

    Ok(Applied { record, transition })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Profile;

    fn report(day: i64) -> DayReport {
        DayReport::new("0xA", day)
    }

    fn apply(existing: Option<&AddressStats>, day: i64) -> Applied {
        apply_report(existing, &report(day), Timestamp(day)).unwrap()
    }

    #[test]
    fn test_first_report_creates_record() {
        let applied = apply(None, 1);
        assert_eq!(applied.transition, Transition::Created);

        let r = applied.record;
        assert_eq!(r.address, "0xa");
        assert_eq!((r.current_streak, r.highest_streak, r.all_time_count), (1, 1, 1));
        assert_eq!(r.last_day, 1);
    }

    #[test]
    fn test_streak_scenario() {
        let day1 = apply(None, 1).record;

        let day2 = apply(Some(&day1), 2);
        assert_eq!(day2.transition, Transition::Extended);
        let r = &day2.record;
        assert_eq!((r.current_streak, r.highest_streak, r.all_time_count, r.last_day), (2, 2, 2, 2));

        let dup = apply(Some(&day2.record), 2);
        assert_eq!(dup.transition, Transition::Duplicate);
        assert_eq!(dup.record, day2.record);

        let gap = apply(Some(&dup.record), 5);
        assert_eq!(gap.transition, Transition::Reset);
        let r = &gap.record;
        assert_eq!((r.current_streak, r.highest_streak, r.all_time_count, r.last_day), (1, 2, 3, 5));
    }

    #[test]
    fn test_out_of_order_report_is_noop() {
        let day1 = apply(None, 3).record;
        let older = apply(Some(&day1), 1);
        assert_eq!(older.transition, Transition::Duplicate);
        assert_eq!(older.record.updated_at, day1.updated_at);
    }

    #[test]
    fn test_rejects_empty_address() {
        let result = apply_report(None, &DayReport::new("   ", 1), Timestamp::now());
        assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_non_positive_day() {
        for day in [0, -1, i64::MIN] {
            let result = apply_report(None, &report(day), Timestamp::now());
            assert!(matches!(result, Err(LedgerError::InvalidInput(_))), "day {}", day);
        }
    }

    #[test]
    fn test_validation_runs_before_duplicate_check() {
        let existing = apply(None, 4).record;
        let result = apply_report(Some(&existing), &report(0), Timestamp::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_metadata_merged_on_accept_only() {
        let first = apply_report(
            None,
            &report(1).with_profile(Profile {
                fid: Some(42),
                ..Default::default()
            }),
            Timestamp(1),
        )
        .unwrap()
        .record;

        let dup = apply_report(
            Some(&first),
            &report(1).with_tx_hash("0xdead").with_profile(Profile {
                username: Some("ignored".into()),
                ..Default::default()
            }),
            Timestamp(2),
        )
        .unwrap();
        assert_eq!(dup.record, first);

        let next = apply_report(
            Some(&first),
            &report(2).with_tx_hash("0xbeef").with_profile(Profile {
                username: Some("gm".into()),
                ..Default::default()
            }),
            Timestamp(3),
        )
        .unwrap()
        .record;
        assert_eq!(next.profile.fid, Some(42));
        assert_eq!(next.profile.username.as_deref(), Some("gm"));
        assert_eq!(next.last_tx_hash.as_deref(), Some("0xbeef"));
    }
}
