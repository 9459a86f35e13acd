//! Distributions over live purposes (everything not yet COMPLETED).
//!
//! Callers load records with `PurposeFilter::live()`; the functions still
//! skip completed purposes so a plain filter gives the same answer.

use std::collections::BTreeMap;

use calculaud_core::ServiceTypeId;
use calculaud_purposes::{PurposeRecord, PurposeStatus};
use serde::Serialize;

use crate::Distribution;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTypeCount {
    pub id: ServiceTypeId,
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: PurposeStatus,
    pub count: u64,
}

/// Live purposes per service type, by name. Types without purposes and
/// purposes without a type are left out.
pub fn service_types_distribution(records: &[PurposeRecord]) -> Distribution<ServiceTypeCount> {
    let mut counts: BTreeMap<ServiceTypeId, ServiceTypeCount> = BTreeMap::new();
    for record in records.iter().filter(|r| r.purpose.status.is_live()) {
        let (Some(id), Some(name)) = (record.purpose.service_type_id, record.service_type.as_ref()) else {
            continue;
        };
        counts
            .entry(id)
            .or_insert_with(|| ServiceTypeCount { id, name: name.clone(), count: 0 })
            .count += 1;
    }

    let mut data: Vec<_> = counts.into_values().collect();
    data.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    data.into()
}

pub fn statuses_distribution(records: &[PurposeRecord]) -> Distribution<StatusCount> {
    PurposeStatus::ALL
        .iter()
        .filter(|status| status.is_live())
        .filter_map(|&status| {
            let count = records.iter().filter(|r| r.purpose.status == status).count() as u64;
            (count > 0).then_some(StatusCount { status, count })
        })
        .collect::<Vec<_>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, record, typed};

    #[test]
    fn service_types_are_sorted_by_name_and_skip_completed() {
        let records = vec![
            typed(record(1, at(2024, 1, 1), PurposeStatus::InProgress), 2, "Software"),
            typed(record(2, at(2024, 1, 2), PurposeStatus::Signed), 2, "Software"),
            typed(record(3, at(2024, 1, 3), PurposeStatus::InProgress), 1, "Hardware"),
            typed(record(4, at(2024, 1, 4), PurposeStatus::Completed), 3, "Consulting"),
            record(5, at(2024, 1, 5), PurposeStatus::InProgress),
        ];

        let dist = service_types_distribution(&records);
        let names: Vec<_> = dist.data.iter().map(|d| (d.name.as_str(), d.count)).collect();
        assert_eq!(names, vec![("Hardware", 1), ("Software", 2)]);
    }

    #[test]
    fn statuses_follow_declaration_order_without_zeros() {
        let records = vec![
            record(1, at(2024, 1, 1), PurposeStatus::Signed),
            record(2, at(2024, 1, 1), PurposeStatus::InProgress),
            record(3, at(2024, 1, 1), PurposeStatus::Signed),
            record(4, at(2024, 1, 1), PurposeStatus::Completed),
        ];

        let dist = statuses_distribution(&records);
        assert_eq!(
            dist.data,
            vec![
                StatusCount { status: PurposeStatus::InProgress, count: 1 },
                StatusCount { status: PurposeStatus::Signed, count: 2 },
            ]
        );
    }

    #[test]
    fn empty_input_serializes_to_empty_data() {
        let json = serde_json::to_value(statuses_distribution(&[])).unwrap();
        assert_eq!(json, serde_json::json!({ "data": [] }));
    }
}
