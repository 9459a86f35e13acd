//! CSV rendering of the purpose list.

use chrono::{DateTime, Utc};

use calculaud_purposes::{Emf, ExchangeRate, PurposeRecord};

const HEADERS: [&str; 21] = [
    "ID",
    "Description",
    "Status",
    "Creation Time",
    "Last Modified",
    "Expected Delivery",
    "Comments",
    "Hierarchy",
    "Supplier",
    "Service Type",
    "Services",
    "EMF IDs",
    "Order IDs",
    "Demand IDs",
    "Bikushit IDs",
    "ILS",
    "Support USD",
    "Available USD",
    "Total USD",
    "Total ILS",
    "Flagged",
];

/// `purposes_<YYYYMMDD_HHMMSS>.csv`
pub fn file_name(now: DateTime<Utc>) -> String {
    format!("purposes_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

pub fn purposes_csv(records: &[PurposeRecord], rate: ExchangeRate) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;

    for record in records {
        let purpose = &record.purpose;
        let totals = record.cost_amounts().totals(rate);
        let services = record
            .contents
            .iter()
            .map(|c| format!("{} x {}", c.service_name, c.quantity))
            .collect::<Vec<_>>()
            .join("; ");

        writer.write_record([
            purpose.id.to_string(),
            purpose.description.clone().unwrap_or_default(),
            purpose.status.to_string(),
            purpose.creation_time.to_rfc3339(),
            purpose.last_modified.to_rfc3339(),
            purpose.expected_delivery.map(|d| d.to_string()).unwrap_or_default(),
            purpose.comments.clone().unwrap_or_default(),
            record.hierarchy.as_ref().map(|h| h.path.clone()).unwrap_or_default(),
            record.supplier.clone().unwrap_or_default(),
            record.service_type.clone().unwrap_or_default(),
            services,
            emf_column(&record.emfs, |e| Some(e.emf_id.as_str())),
            emf_column(&record.emfs, |e| e.order_id.as_deref()),
            emf_column(&record.emfs, |e| e.demand_id.as_deref()),
            emf_column(&record.emfs, |e| e.bikushit_id.as_deref()),
            format!("{:.2}", totals.ils),
            format!("{:.2}", totals.support_usd),
            format!("{:.2}", totals.available_usd),
            format!("{:.2}", totals.total_usd),
            format!("{:.2}", totals.total_ils),
            if purpose.is_flagged { "Yes" } else { "No" }.to_string(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// One line per EMF that has the field set.
fn emf_column(emfs: &[Emf], field: impl Fn(&Emf) -> Option<&str>) -> String {
    emfs.iter().filter_map(field).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use calculaud_core::{CostId, EmfId, PurposeId, ServiceId, ServiceTypeId};
    use calculaud_purposes::{Cost, Currency, Purpose, PurposeContent, PurposeStatus};
    use chrono::TimeZone;

    fn record() -> PurposeRecord {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        PurposeRecord {
            purpose: Purpose {
                id: PurposeId::new(7),
                hierarchy_id: None,
                expected_delivery: None,
                comments: None,
                description: Some("Laptops, \"urgent\"".into()),
                status: PurposeStatus::Signed,
                supplier_id: None,
                service_type_id: None,
                budget_source_id: None,
                is_flagged: true,
                creation_time: created,
                last_modified: created,
            },
            supplier: Some("Dell".into()),
            service_type: None,
            budget_source: None,
            hierarchy: None,
            contents: vec![PurposeContent {
                service_id: ServiceId::new(1),
                quantity: 3,
                service_name: "Latitude".into(),
                service_type_id: ServiceTypeId::new(1),
                service_type: "Laptops".into(),
            }],
            emfs: vec![Emf {
                id: EmfId::new(1),
                emf_id: "EMF-1".into(),
                purpose_id: PurposeId::new(7),
                creation_time: created,
                order_id: Some("ORD-9".into()),
                order_creation_date: None,
                demand_id: None,
                demand_creation_date: None,
                bikushit_id: None,
                bikushit_creation_date: None,
                costs: vec![Cost {
                    id: CostId::new(1),
                    emf_id: EmfId::new(1),
                    currency: Currency::SupportUsd,
                    amount: 100.0,
                }],
            }],
            status_history: Vec::new(),
        }
    }

    #[test]
    fn rows_carry_contents_emfs_and_totals() {
        let rate = ExchangeRate::new(4.0).unwrap();
        let bytes = purposes_csv(&[record()], rate).unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), HEADERS.len());

        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[0], "7");
        assert_eq!(&row[1], "Laptops, \"urgent\"");
        assert_eq!(&row[2], "SIGNED");
        assert_eq!(&row[8], "Dell");
        assert_eq!(&row[10], "Latitude x 3");
        assert_eq!(&row[11], "EMF-1");
        assert_eq!(&row[12], "ORD-9");
        assert_eq!(&row[16], "100.00");
        assert_eq!(&row[19], "400.00");
        assert_eq!(&row[20], "Yes");
    }

    #[test]
    fn file_name_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(file_name(now), "purposes_20250102_030405.csv");
    }
}
