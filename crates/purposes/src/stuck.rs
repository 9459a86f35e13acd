//! Stuck-purpose detection.
//!
//! A live, unflagged purpose is stuck when it has not progressed for more
//! than `threshold_days` whole days. Flagging is one-way here; users clear the
//! flag through a normal update.

use chrono::{DateTime, Utc};
use serde::Serialize;

use calculaud_core::PurposeId;

use crate::filter::PurposeFilter;
use crate::record::PurposeRecord;

pub const DEFAULT_THRESHOLD_DAYS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckPolicy {
    pub threshold_days: i64,
}

impl Default for StuckPolicy {
    fn default() -> Self {
        Self {
            threshold_days: DEFAULT_THRESHOLD_DAYS,
        }
    }
}

impl StuckPolicy {
    pub fn new(threshold_days: i64) -> Self {
        Self { threshold_days }
    }

    /// Store-side pre-filter: live purposes that are not flagged yet.
    pub fn candidate_filter() -> PurposeFilter {
        PurposeFilter {
            is_flagged: Some(false),
            live_only: true,
            ..Default::default()
        }
    }

    pub fn is_candidate(&self, record: &PurposeRecord) -> bool {
        record.purpose.status.is_live() && !record.purpose.is_flagged
    }

    pub fn is_stuck(&self, record: &PurposeRecord, now: DateTime<Utc>) -> bool {
        self.is_candidate(record) && record.days_since_last_progress(now) > self.threshold_days
    }

    /// Ids of stuck purposes among `records`, ascending.
    pub fn find_stuck<'a>(
        &self,
        records: impl IntoIterator<Item = &'a PurposeRecord>,
        now: DateTime<Utc>,
    ) -> Vec<PurposeId> {
        let mut ids: Vec<_> = records
            .into_iter()
            .filter(|r| self.is_stuck(r, now))
            .map(|r| r.purpose.id)
            .collect();
        ids.sort();
        ids
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StuckReport {
    pub checked: usize,
    pub flagged: usize,
    pub flagged_ids: Vec<PurposeId>,
    pub threshold_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::*;
    use crate::status::PurposeStatus;

    #[test]
    fn threshold_is_exclusive() {
        let policy = StuckPolicy::new(10);
        let r = record(1, at(2025, 1, 1));
        assert!(!policy.is_stuck(&r, at(2025, 1, 11)));
        assert!(policy.is_stuck(&r, at(2025, 1, 12)));
    }

    #[test]
    fn completed_and_flagged_are_skipped() {
        let policy = StuckPolicy::default();
        let mut done = record(1, at(2024, 1, 1));
        done.purpose.status = PurposeStatus::Completed;
        let mut flagged = record(2, at(2024, 1, 1));
        flagged.purpose.is_flagged = true;
        let stale = record(3, at(2024, 1, 1));
        let fresh = record(4, at(2025, 1, 30));

        let ids = policy.find_stuck(&[done, flagged, stale, fresh], at(2025, 2, 1));
        assert_eq!(ids, vec![PurposeId::new(3)]);
    }

    #[test]
    fn recent_emf_milestone_keeps_purpose_alive() {
        let policy = StuckPolicy::default();
        let mut r = record(1, at(2025, 1, 1));
        let mut e = emf(1, 1, "E", at(2025, 1, 1), &[]);
        e.demand_creation_date = Some(date(2025, 1, 28));
        r.emfs.push(e);
        assert!(!policy.is_stuck(&r, at(2025, 2, 1)));
    }

    #[test]
    fn candidate_filter_matches_policy() {
        let filter = StuckPolicy::candidate_filter();
        let mut flagged = record(1, at(2025, 1, 1));
        flagged.purpose.is_flagged = true;
        assert!(!filter.matches(&flagged, &[]));
        assert!(filter.matches(&record(2, at(2025, 1, 1)), &[]));
    }
}
