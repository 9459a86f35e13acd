//! Fully loaded purpose: the row plus resolved names and all children.
//!
//! Stores return this shape for detail views, listings, exports, analytics
//! and the stuck scan, so every read path sees the same data.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use calculaud_core::{ServiceId, ServiceTypeId};
use calculaud_hierarchy::Hierarchy;

use crate::currency::CurrencyAmounts;
use crate::emf::Emf;
use crate::purpose::Purpose;
use crate::status::{PurposeStatus, StatusChange};

/// A content line with the service resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurposeContent {
    pub service_id: ServiceId,
    pub quantity: i32,
    pub service_name: String,
    pub service_type_id: ServiceTypeId,
    /// Name of the service's type.
    pub service_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurposeRecord {
    #[serde(flatten)]
    pub purpose: Purpose,
    /// Supplier name.
    pub supplier: Option<String>,
    /// Service type name.
    pub service_type: Option<String>,
    /// Budget source name.
    pub budget_source: Option<String>,
    pub hierarchy: Option<Hierarchy>,
    pub contents: Vec<PurposeContent>,
    pub emfs: Vec<Emf>,
    /// Oldest first.
    pub status_history: Vec<StatusChange>,
}

impl PurposeRecord {
    /// Latest moment the purpose visibly moved forward.
    ///
    /// Progress is a status change, a new EMF, or an EMF milestone date
    /// (taken at midnight UTC). Creation counts as the first progress.
    pub fn last_progress(&self) -> DateTime<Utc> {
        let history = self.status_history.iter().map(|h| h.changed_at);
        let emf_created = self.emfs.iter().map(|e| e.creation_time);
        let milestones = self
            .emfs
            .iter()
            .flat_map(|e| e.milestone_dates())
            .map(|d| d.and_time(NaiveTime::MIN).and_utc());

        history
            .chain(emf_created)
            .chain(milestones)
            .fold(self.purpose.creation_time, Ord::max)
    }

    /// Whole days since [`Self::last_progress`]; never negative.
    pub fn days_since_last_progress(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_progress()).num_days().max(0)
    }

    /// Sum of all EMF costs per currency.
    pub fn cost_amounts(&self) -> CurrencyAmounts {
        let mut amounts = CurrencyAmounts::default();
        for cost in self.emfs.iter().flat_map(|e| e.costs.iter()) {
            amounts.add(cost.currency, cost.amount);
        }
        amounts
    }

    /// Latest change *to* `target` whose date falls in `[start, end]`.
    ///
    /// Later changes away from `target` do not hide it.
    pub fn latest_change_to(
        &self,
        target: PurposeStatus,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Option<&StatusChange> {
        self.status_history
            .iter()
            .filter(|h| h.new_status == target)
            .filter(|h| {
                let day = h.changed_at.date_naive();
                start.map_or(true, |s| day >= s) && end.map_or(true, |e| day <= e)
            })
            .max_by_key(|h| h.changed_at)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use calculaud_core::{CostId, EmfId, HierarchyId, PurposeId};
    use chrono::{NaiveDate, TimeZone};

    use crate::cost::Cost;
    use crate::currency::Currency;
    use crate::status::PurposeStatus;

    pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    pub fn record(id: i64, created: DateTime<Utc>) -> PurposeRecord {
        PurposeRecord {
            purpose: Purpose {
                id: PurposeId::new(id),
                hierarchy_id: None,
                expected_delivery: None,
                comments: None,
                description: None,
                status: PurposeStatus::InProgress,
                supplier_id: None,
                service_type_id: None,
                budget_source_id: None,
                is_flagged: false,
                creation_time: created,
                last_modified: created,
            },
            supplier: None,
            service_type: None,
            budget_source: None,
            hierarchy: None,
            contents: Vec::new(),
            emfs: Vec::new(),
            status_history: vec![StatusChange {
                previous_status: None,
                new_status: PurposeStatus::InProgress,
                changed_at: created,
                changed_by: None,
            }],
        }
    }

    pub fn with_hierarchy(mut r: PurposeRecord, id: i64, path: &str) -> PurposeRecord {
        let name = path.rsplit(" / ").next().unwrap_or(path).to_string();
        r.purpose.hierarchy_id = Some(HierarchyId::new(id));
        r.hierarchy = Some(calculaud_hierarchy::Hierarchy {
            id: HierarchyId::new(id),
            kind: calculaud_hierarchy::HierarchyType::Unit,
            name,
            parent_id: None,
            path: path.to_string(),
        });
        r
    }

    pub fn emf(
        id: i64,
        purpose: i64,
        emf_id: &str,
        created: DateTime<Utc>,
        costs: &[(Currency, f64)],
    ) -> Emf {
        Emf {
            id: EmfId::new(id),
            emf_id: emf_id.to_string(),
            purpose_id: PurposeId::new(purpose),
            creation_time: created,
            order_id: None,
            order_creation_date: None,
            demand_id: None,
            demand_creation_date: None,
            bikushit_id: None,
            bikushit_creation_date: None,
            costs: costs
                .iter()
                .enumerate()
                .map(|(i, (currency, amount))| Cost {
                    id: CostId::new(id * 100 + i as i64),
                    emf_id: EmfId::new(id),
                    currency: *currency,
                    amount: *amount,
                })
                .collect(),
        }
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::currency::Currency;

    #[test]
    fn creation_is_the_baseline_progress() {
        let r = record(1, at(2025, 1, 1));
        assert_eq!(r.last_progress(), at(2025, 1, 1));
        assert_eq!(r.days_since_last_progress(at(2025, 1, 12)), 11);
    }

    #[test]
    fn status_changes_and_emf_milestones_count_as_progress() {
        let mut r = record(1, at(2025, 1, 1));
        r.status_history.push(StatusChange {
            previous_status: Some(PurposeStatus::InProgress),
            new_status: PurposeStatus::Signed,
            changed_at: at(2025, 1, 5),
            changed_by: None,
        });
        assert_eq!(r.last_progress(), at(2025, 1, 5));

        let mut e = emf(1, 1, "E-1", at(2025, 1, 3), &[]);
        e.bikushit_creation_date = Some(date(2025, 1, 20));
        r.emfs.push(e);
        assert_eq!(
            r.last_progress(),
            date(2025, 1, 20).and_time(NaiveTime::MIN).and_utc()
        );
    }

    #[test]
    fn days_never_negative() {
        let r = record(1, at(2025, 1, 10));
        assert_eq!(r.days_since_last_progress(at(2025, 1, 1)), 0);
    }

    #[test]
    fn cost_amounts_sum_every_emf() {
        let mut r = record(1, at(2025, 1, 1));
        r.emfs.push(emf(1, 1, "E-1", at(2025, 1, 1), &[(Currency::Ils, 10.0), (Currency::SupportUsd, 5.0)]));
        r.emfs.push(emf(2, 1, "E-2", at(2025, 1, 1), &[(Currency::Ils, 2.5)]));
        let sums = r.cost_amounts();
        assert_eq!(sums.ils, 12.5);
        assert_eq!(sums.support_usd, 5.0);
        assert_eq!(sums.available_usd, 0.0);
    }
}
