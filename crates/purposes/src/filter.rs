//! Purpose filtering, search and sorting.
//!
//! `PurposeFilter` is shared by the purpose list, the CSV export and every
//! analytics endpoint. The Postgres store translates the same rules to SQL;
//! the in-memory store evaluates them with the functions below.

use core::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use calculaud_core::{HierarchyId, ServiceId, ServiceTypeId, SortOrder, SupplierId};
use calculaud_hierarchy::is_within;

use crate::record::PurposeRecord;
use crate::status::PurposeStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurposeFilter {
    /// Inclusive lower bound on the creation date.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the creation date.
    pub end_date: Option<NaiveDate>,
    /// Purposes anywhere in the subtree of any of these nodes.
    pub hierarchy_ids: Vec<HierarchyId>,
    pub statuses: Vec<PurposeStatus>,
    pub supplier_ids: Vec<SupplierId>,
    pub service_type_ids: Vec<ServiceTypeId>,
    /// Purposes containing any of these services.
    pub service_ids: Vec<ServiceId>,
    pub is_flagged: Option<bool>,
    /// Drop COMPLETED purposes (live dashboards, stuck scan).
    pub live_only: bool,
}

impl PurposeFilter {
    /// Same filter without the creation-date window.
    pub fn without_dates(&self) -> Self {
        Self {
            start_date: None,
            end_date: None,
            ..self.clone()
        }
    }

    pub fn live(&self) -> Self {
        Self {
            live_only: true,
            ..self.clone()
        }
    }

    /// Evaluate the filter.
    ///
    /// `scope_paths` are the cached paths of `hierarchy_ids` (resolved by the
    /// caller); unknown ids simply contribute no path.
    pub fn matches(&self, record: &PurposeRecord, scope_paths: &[String]) -> bool {
        let purpose = &record.purpose;
        let created = purpose.creation_time.date_naive();

        if self.start_date.is_some_and(|d| created < d) {
            return false;
        }
        if self.end_date.is_some_and(|d| created > d) {
            return false;
        }
        if self.live_only && !purpose.status.is_live() {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&purpose.status) {
            return false;
        }
        if !self.supplier_ids.is_empty()
            && !purpose.supplier_id.is_some_and(|s| self.supplier_ids.contains(&s))
        {
            return false;
        }
        if !self.service_type_ids.is_empty()
            && !purpose
                .service_type_id
                .is_some_and(|s| self.service_type_ids.contains(&s))
        {
            return false;
        }
        if !self.service_ids.is_empty()
            && !record
                .contents
                .iter()
                .any(|c| self.service_ids.contains(&c.service_id))
        {
            return false;
        }
        if self.is_flagged.is_some_and(|f| f != purpose.is_flagged) {
            return false;
        }
        if !self.hierarchy_ids.is_empty() {
            let Some(hierarchy) = &record.hierarchy else {
                return false;
            };
            if !scope_paths.iter().any(|p| is_within(&hierarchy.path, p)) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurposeSort {
    #[default]
    CreationTime,
    LastModified,
    ExpectedDelivery,
    DaysSinceLastProgress,
}

/// Filter plus free-text search and ordering for the list and export views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurposeQuery {
    pub filter: PurposeFilter,
    pub search: Option<String>,
    pub sort_by: PurposeSort,
    pub sort_order: SortOrder,
}

impl PurposeQuery {
    /// Normalized search term (trimmed, lower-cased), `None` when blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Case-insensitive match on description, service names and EMF ids.
    /// A numeric term also matches the purpose id.
    pub fn matches_search(&self, record: &PurposeRecord) -> bool {
        let Some(term) = self.search_term() else {
            return true;
        };
        if term.parse::<i64>().is_ok_and(|id| id == record.purpose.id.get()) {
            return true;
        }
        let contains = |s: &str| s.to_lowercase().contains(&term);
        record.purpose.description.as_deref().is_some_and(contains)
            || record.contents.iter().any(|c| contains(&c.service_name))
            || record.emfs.iter().any(|e| contains(&e.emf_id))
    }

    pub fn matches(&self, record: &PurposeRecord, scope_paths: &[String]) -> bool {
        self.filter.matches(record, scope_paths) && self.matches_search(record)
    }

    /// Order records for display. Ties fall back to newest id first; purposes
    /// without an expected delivery date sort last in either direction.
    pub fn compare(&self, a: &PurposeRecord, b: &PurposeRecord, now: DateTime<Utc>) -> Ordering {
        let (pa, pb) = (&a.purpose, &b.purpose);
        let primary = match self.sort_by {
            PurposeSort::CreationTime => self.sort_order.apply(pa.creation_time.cmp(&pb.creation_time)),
            PurposeSort::LastModified => self.sort_order.apply(pa.last_modified.cmp(&pb.last_modified)),
            PurposeSort::ExpectedDelivery => match (pa.expected_delivery, pb.expected_delivery) {
                (Some(x), Some(y)) => self.sort_order.apply(x.cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            PurposeSort::DaysSinceLastProgress => self.sort_order.apply(
                a.days_since_last_progress(now)
                    .cmp(&b.days_since_last_progress(now)),
            ),
        };
        primary.then_with(|| pb.id.cmp(&pa.id))
    }

    /// Filter, search and sort in one pass (in-memory evaluation).
    pub fn apply(
        &self,
        records: impl IntoIterator<Item = PurposeRecord>,
        scope_paths: &[String],
        now: DateTime<Utc>,
    ) -> Vec<PurposeRecord> {
        let mut out: Vec<_> = records
            .into_iter()
            .filter(|r| self.matches(r, scope_paths))
            .collect();
        out.sort_by(|a, b| self.compare(a, b, now));
        out
    }
}
