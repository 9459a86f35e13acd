//! `calculaud-analytics`: read-only dashboard aggregations.
//!
//! Every function takes purpose records that the store already narrowed with
//! the request's `PurposeFilter` and folds them into chart-ready responses.
//! No IO happens here, which keeps the numbers identical across the Postgres
//! and in-memory stores.

pub mod financial;
pub mod hierarchy;
pub mod live;
pub mod services;

pub use financial::{
    BudgetSourceCostItem, ExpenditureTimeline, ServiceTypeCostItem, TimeGrouping, TimelineDataset,
    cost_by_budget_source, cost_by_service_type, expenditure_timeline,
};
pub use hierarchy::{HierarchyDistribution, HierarchyItem, hierarchy_distribution};
pub use live::{ServiceTypeCount, StatusCount, service_types_distribution, statuses_distribution};
pub use services::{
    ServiceBreakdownItem, ServiceTypeBreakdownItem, ServiceTypeQuantities, StatusTransitionDistribution,
    service_type_status_distribution, services_quantities,
};

use serde::Serialize;

/// `{ "data": [...] }` wrapper used by most chart endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for Distribution<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use calculaud_core::{CostId, EmfId, PurposeId, ServiceId, ServiceTypeId};
    use calculaud_purposes::{
        Cost, Currency, Emf, Purpose, PurposeContent, PurposeRecord, PurposeStatus, StatusChange,
    };
    use chrono::{DateTime, TimeZone, Utc};

    pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    pub fn record(id: i64, created: DateTime<Utc>, status: PurposeStatus) -> PurposeRecord {
        PurposeRecord {
            purpose: Purpose {
                id: PurposeId::new(id),
                hierarchy_id: None,
                expected_delivery: None,
                comments: None,
                description: None,
                status,
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
                new_status: status,
                changed_at: created,
                changed_by: None,
            }],
        }
    }

    pub fn typed(mut r: PurposeRecord, type_id: i64, name: &str) -> PurposeRecord {
        r.purpose.service_type_id = Some(ServiceTypeId::new(type_id));
        r.service_type = Some(name.to_string());
        r
    }

    pub fn content(service: i64, name: &str, quantity: i32, type_id: i64, type_name: &str) -> PurposeContent {
        PurposeContent {
            service_id: ServiceId::new(service),
            quantity,
            service_name: name.to_string(),
            service_type_id: ServiceTypeId::new(type_id),
            service_type: type_name.to_string(),
        }
    }

    pub fn with_costs(mut r: PurposeRecord, costs: &[(Currency, f64)]) -> PurposeRecord {
        let emf_id = EmfId::new(r.purpose.id.get() * 10 + r.emfs.len() as i64);
        r.emfs.push(Emf {
            id: emf_id,
            emf_id: format!("EMF-{}", emf_id),
            purpose_id: r.purpose.id,
            creation_time: r.purpose.creation_time,
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
                    id: CostId::new(emf_id.get() * 10 + i as i64),
                    emf_id,
                    currency: *currency,
                    amount: *amount,
                })
                .collect(),
        });
        r
    }
}
