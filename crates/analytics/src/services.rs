//! Service-level breakdowns: ordered quantities and status transitions.

use std::collections::BTreeMap;

use calculaud_core::{PurposeId, ServiceId, ServiceTypeId};
use calculaud_purposes::{PurposeFilter, PurposeRecord, PurposeStatus};
use serde::Serialize;

use crate::Distribution;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBreakdownItem {
    pub service_id: ServiceId,
    pub service_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTypeQuantities {
    pub service_type_id: ServiceTypeId,
    pub service_type_name: String,
    pub total_quantity: i64,
    pub services: Vec<ServiceBreakdownItem>,
}

/// Sums content quantities per service, grouped under the service's type.
pub fn services_quantities(records: &[PurposeRecord]) -> Distribution<ServiceTypeQuantities> {
    let mut groups: BTreeMap<ServiceTypeId, (String, BTreeMap<ServiceId, ServiceBreakdownItem>)> =
        BTreeMap::new();

    for content in records.iter().flat_map(|r| r.contents.iter()) {
        let (_, services) = groups
            .entry(content.service_type_id)
            .or_insert_with(|| (content.service_type.clone(), BTreeMap::new()));
        services
            .entry(content.service_id)
            .or_insert_with(|| ServiceBreakdownItem {
                service_id: content.service_id,
                service_name: content.service_name.clone(),
                quantity: 0,
            })
            .quantity += i64::from(content.quantity);
    }

    groups
        .into_iter()
        .map(|(service_type_id, (service_type_name, services))| {
            let mut services: Vec<_> = services.into_values().collect();
            services.sort_by(|a, b| {
                b.quantity
                    .cmp(&a.quantity)
                    .then_with(|| a.service_name.cmp(&b.service_name))
            });
            ServiceTypeQuantities {
                service_type_id,
                service_type_name,
                total_quantity: services.iter().map(|s| s.quantity).sum(),
                services,
            }
        })
        .collect::<Vec<_>>()
        .into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTypeBreakdownItem {
    pub service_type_id: ServiceTypeId,
    pub service_type_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransitionDistribution {
    pub data: Vec<ServiceTypeBreakdownItem>,
    pub total_count: u64,
    pub target_status: PurposeStatus,
}

/// Counts purposes per service type that changed to `target` inside the
/// filter's date window.
///
/// A purpose counts once, by its latest matching change, even when it has
/// moved on to another status since. `filter` supplies the window; the
/// records themselves must be loaded without the date bounds, because the
/// window applies to the change time rather than to purpose creation.
pub fn service_type_status_distribution(
    records: &[PurposeRecord],
    target: PurposeStatus,
    filter: &PurposeFilter,
) -> StatusTransitionDistribution {
    let mut counted: BTreeMap<ServiceTypeId, (String, Vec<PurposeId>)> = BTreeMap::new();

    for record in records {
        if record
            .latest_change_to(target, filter.start_date, filter.end_date)
            .is_none()
        {
            continue;
        }
        let (Some(type_id), Some(type_name)) =
            (record.purpose.service_type_id, record.service_type.as_ref())
        else {
            continue;
        };
        counted
            .entry(type_id)
            .or_insert_with(|| (type_name.clone(), Vec::new()))
            .1
            .push(record.purpose.id);
    }

    let mut data: Vec<_> = counted
        .into_iter()
        .map(|(service_type_id, (service_type_name, ids))| ServiceTypeBreakdownItem {
            service_type_id,
            service_type_name,
            count: ids.len() as u64,
        })
        .collect();
    data.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.service_type_name.cmp(&b.service_type_name))
    });

    StatusTransitionDistribution {
        total_count: data.iter().map(|d| d.count).sum(),
        data,
        target_status: target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, content, record, typed};
    use calculaud_purposes::StatusChange;
    use chrono::NaiveDate;

    fn completed_on(mut r: PurposeRecord, day: u32) -> PurposeRecord {
        r.status_history.push(StatusChange {
            previous_status: Some(r.purpose.status),
            new_status: PurposeStatus::Completed,
            changed_at: at(2024, 3, day),
            changed_by: Some("u1".into()),
        });
        r.purpose.status = PurposeStatus::Completed;
        r
    }

    #[test]
    fn quantities_group_by_type_and_rank_services() {
        let mut a = record(1, at(2024, 1, 1), PurposeStatus::InProgress);
        a.contents = vec![
            content(10, "Laptop", 2, 1, "Hardware"),
            content(11, "Monitor", 5, 1, "Hardware"),
        ];
        let mut b = record(2, at(2024, 1, 2), PurposeStatus::InProgress);
        b.contents = vec![
            content(10, "Laptop", 4, 1, "Hardware"),
            content(20, "License", 1, 2, "Software"),
        ];

        let dist = services_quantities(&[a, b]);
        assert_eq!(dist.data.len(), 2);

        let hardware = &dist.data[0];
        assert_eq!(hardware.service_type_name, "Hardware");
        assert_eq!(hardware.total_quantity, 11);
        let ranked: Vec<_> = hardware
            .services
            .iter()
            .map(|s| (s.service_name.as_str(), s.quantity))
            .collect();
        assert_eq!(ranked, vec![("Laptop", 6), ("Monitor", 5)]);

        assert_eq!(dist.data[1].total_quantity, 1);
    }

    #[test]
    fn status_distribution_counts_changes_in_window() {
        let records = vec![
            completed_on(typed(record(1, at(2024, 1, 1), PurposeStatus::Signed), 1, "Hardware"), 5),
            completed_on(typed(record(2, at(2024, 1, 1), PurposeStatus::Signed), 1, "Hardware"), 6),
            completed_on(typed(record(3, at(2024, 1, 1), PurposeStatus::Signed), 2, "Software"), 7),
            // outside the window
            completed_on(typed(record(4, at(2024, 1, 1), PurposeStatus::Signed), 2, "Software"), 25),
            // no service type
            completed_on(record(5, at(2024, 1, 1), PurposeStatus::Signed), 5),
            // never completed
            typed(record(6, at(2024, 1, 1), PurposeStatus::Signed), 2, "Software"),
        ];
        let filter = PurposeFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 20),
            ..PurposeFilter::default()
        };

        let dist = service_type_status_distribution(&records, PurposeStatus::Completed, &filter);
        assert_eq!(dist.total_count, 3);
        assert_eq!(dist.target_status, PurposeStatus::Completed);
        let counts: Vec<_> = dist
            .data
            .iter()
            .map(|d| (d.service_type_name.as_str(), d.count))
            .collect();
        assert_eq!(counts, vec![("Hardware", 2), ("Software", 1)]);
    }

    #[test]
    fn status_distribution_counts_changes_later_superseded() {
        // IN_PROGRESS on Jan 1, SIGNED on Mar 5, COMPLETED on Mar 10.
        let mut moved_on = typed(record(1, at(2024, 1, 1), PurposeStatus::InProgress), 1, "Hardware");
        moved_on.status_history.push(StatusChange {
            previous_status: Some(PurposeStatus::InProgress),
            new_status: PurposeStatus::Signed,
            changed_at: at(2024, 3, 5),
            changed_by: None,
        });
        moved_on.purpose.status = PurposeStatus::Signed;
        let moved_on = completed_on(moved_on, 10);

        let window = |start: u32, end: u32| PurposeFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, start),
            end_date: NaiveDate::from_ymd_opt(2024, 3, end),
            ..PurposeFilter::default()
        };
        let records = [moved_on];

        let march = service_type_status_distribution(&records, PurposeStatus::Signed, &window(1, 31));
        assert_eq!(march.total_count, 1);
        let first_week = service_type_status_distribution(&records, PurposeStatus::Signed, &window(1, 7));
        assert_eq!(first_week.total_count, 1);
        assert_eq!(first_week.data[0].service_type_name, "Hardware");

        // The window applies to the matching change, not to the latest one.
        let late = service_type_status_distribution(&records, PurposeStatus::Signed, &window(8, 31));
        assert_eq!(late.total_count, 0);
        let completed = service_type_status_distribution(&records, PurposeStatus::Completed, &window(1, 7));
        assert_eq!(completed.total_count, 0);
    }

    #[test]
    fn repeated_changes_to_target_count_once() {
        let mut flip = completed_on(typed(record(1, at(2024, 1, 1), PurposeStatus::Signed), 1, "Hardware"), 5);
        flip.status_history.push(StatusChange {
            previous_status: Some(PurposeStatus::Completed),
            new_status: PurposeStatus::InProgress,
            changed_at: at(2024, 3, 9),
            changed_by: None,
        });
        let flip = completed_on(flip, 12);

        let dist = service_type_status_distribution(&[flip], PurposeStatus::Completed, &PurposeFilter::default());
        assert_eq!(dist.total_count, 1);
    }
}
