//! Cost aggregations: per service type, per budget source and over time.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use calculaud_core::{BudgetSourceId, DomainError, ServiceTypeId};
use calculaud_purposes::{Currency, CurrencyAmounts, ExchangeRate, MultiCurrencyAmount, PurposeRecord};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::Distribution;

/// Label for costs whose purpose has no service type or budget source.
pub const UNKNOWN_GROUP: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTypeCostItem {
    pub service_type_id: Option<ServiceTypeId>,
    pub service_type_name: String,
    pub amounts: MultiCurrencyAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSourceCostItem {
    pub budget_source_id: Option<BudgetSourceId>,
    pub budget_source_name: String,
    pub amounts: MultiCurrencyAmount,
}

/// Sums EMF costs per service type. Purposes without a type are collected
/// under "Unknown", which always sorts last.
pub fn cost_by_service_type(
    records: &[PurposeRecord],
    rate: ExchangeRate,
) -> Distribution<ServiceTypeCostItem> {
    group_costs(records, |r| r.purpose.service_type_id.zip(r.service_type.clone()))
        .into_iter()
        .map(|(service_type_id, service_type_name, amounts)| ServiceTypeCostItem {
            service_type_id,
            service_type_name,
            amounts: amounts.totals(rate),
        })
        .collect::<Vec<_>>()
        .into()
}

/// Sums EMF costs per budget source, with the same "Unknown" rule as
/// [`cost_by_service_type`].
pub fn cost_by_budget_source(
    records: &[PurposeRecord],
    rate: ExchangeRate,
) -> Distribution<BudgetSourceCostItem> {
    group_costs(records, |r| r.purpose.budget_source_id.zip(r.budget_source.clone()))
        .into_iter()
        .map(|(budget_source_id, budget_source_name, amounts)| BudgetSourceCostItem {
            budget_source_id,
            budget_source_name,
            amounts: amounts.totals(rate),
        })
        .collect::<Vec<_>>()
        .into()
}

/// Groups purposes with costs by `key`; the unknown group sorts last, the
/// rest by name.
fn group_costs<K, F>(records: &[PurposeRecord], key: F) -> Vec<(Option<K>, String, CurrencyAmounts)>
where
    K: Ord + Copy,
    F: Fn(&PurposeRecord) -> Option<(K, String)>,
{
    let mut groups: BTreeMap<Option<K>, (String, CurrencyAmounts)> = BTreeMap::new();

    for record in records {
        let has_costs = record.emfs.iter().any(|e| !e.costs.is_empty());
        if !has_costs {
            continue;
        }
        let (id, name) = match key(record) {
            Some((id, name)) => (Some(id), name),
            None => (None, UNKNOWN_GROUP.to_string()),
        };
        groups
            .entry(id)
            .or_insert_with(|| (name, CurrencyAmounts::default()))
            .1
            .merge(&record.cost_amounts());
    }

    let mut grouped: Vec<_> = groups
        .into_iter()
        .map(|(id, (name, amounts))| (id, name, amounts))
        .collect();
    grouped.sort_by(|a, b| a.0.is_none().cmp(&b.0.is_none()).then_with(|| a.1.cmp(&b.1)));
    grouped
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrouping {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl TimeGrouping {
    /// Bucket label for a timestamp. Labels of one grouping sort
    /// chronologically as plain strings.
    pub fn label(self, at: DateTime<Utc>) -> String {
        match self {
            TimeGrouping::Day => at.format("%Y-%m-%d").to_string(),
            TimeGrouping::Week => {
                let week = at.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            TimeGrouping::Month => at.format("%Y-%m").to_string(),
            TimeGrouping::Year => at.format("%Y").to_string(),
        }
    }
}

impl fmt::Display for TimeGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeGrouping::Day => "day",
            TimeGrouping::Week => "week",
            TimeGrouping::Month => "month",
            TimeGrouping::Year => "year",
        };
        f.write_str(s)
    }
}

impl FromStr for TimeGrouping {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(TimeGrouping::Day),
            "week" => Ok(TimeGrouping::Week),
            "month" => Ok(TimeGrouping::Month),
            "year" => Ok(TimeGrouping::Year),
            other => Err(DomainError::validation(format!(
                "group_by must be one of day, week, month, year (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineDataset {
    pub label: String,
    pub data: Vec<f64>,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenditureTimeline {
    pub labels: Vec<String>,
    pub datasets: Vec<TimelineDataset>,
}

/// Spend per period of purpose creation, converted into `currency`.
pub fn expenditure_timeline(
    records: &[PurposeRecord],
    grouping: TimeGrouping,
    currency: Currency,
    rate: ExchangeRate,
) -> ExpenditureTimeline {
    let mut buckets: BTreeMap<String, f64> = BTreeMap::new();

    for record in records {
        let mut costs = record.emfs.iter().flat_map(|e| e.costs.iter()).peekable();
        if costs.peek().is_none() {
            continue;
        }
        let total: f64 = costs
            .map(|c| rate.convert(c.amount, c.currency, currency))
            .sum();
        *buckets.entry(grouping.label(record.purpose.creation_time)).or_default() += total;
    }

    let (labels, data): (Vec<_>, Vec<_>) = buckets.into_iter().unzip();
    ExpenditureTimeline {
        labels,
        datasets: vec![TimelineDataset {
            label: format!("Expenditure ({})", currency.as_str()),
            data,
            currency,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, record, typed, with_costs};
    use calculaud_purposes::PurposeStatus;

    fn rate() -> ExchangeRate {
        ExchangeRate::new(4.0).unwrap()
    }

    #[test]
    fn costs_group_by_type_with_unknown_last() {
        let records = vec![
            with_costs(
                typed(record(1, at(2024, 1, 1), PurposeStatus::InProgress), 2, "Software"),
                &[(Currency::Ils, 400.0)],
            ),
            with_costs(
                typed(record(2, at(2024, 1, 2), PurposeStatus::InProgress), 1, "Hardware"),
                &[(Currency::SupportUsd, 10.0), (Currency::AvailableUsd, 5.0)],
            ),
            with_costs(record(3, at(2024, 1, 3), PurposeStatus::InProgress), &[(Currency::Ils, 8.0)]),
            // no costs at all
            typed(record(4, at(2024, 1, 4), PurposeStatus::InProgress), 3, "Consulting"),
        ];

        let dist = cost_by_service_type(&records, rate());
        let names: Vec<_> = dist.data.iter().map(|d| d.service_type_name.as_str()).collect();
        assert_eq!(names, vec!["Hardware", "Software", "Unknown"]);

        let hardware = dist.data[0].amounts;
        assert_eq!(hardware.support_usd, 10.0);
        assert_eq!(hardware.available_usd, 5.0);
        assert_eq!(hardware.total_usd, 15.0);
        assert_eq!(hardware.total_ils, 60.0);

        let software = dist.data[1].amounts;
        assert_eq!(software.total_usd, 100.0);
        assert!(dist.data[2].service_type_id.is_none());
    }

    #[test]
    fn costs_group_by_budget_source() {
        let funded = |id: i64, source: i64, name: &str, cost: f64| {
            let mut r = with_costs(record(id, at(2024, 1, 1), PurposeStatus::InProgress), &[(Currency::Ils, cost)]);
            r.purpose.budget_source_id = Some(BudgetSourceId::new(source));
            r.budget_source = Some(name.to_string());
            r
        };
        let records = vec![
            funded(1, 2, "Operations", 40.0),
            funded(2, 1, "Capital", 8.0),
            funded(3, 2, "Operations", 4.0),
            with_costs(record(4, at(2024, 1, 1), PurposeStatus::InProgress), &[(Currency::SupportUsd, 1.0)]),
        ];

        let dist = cost_by_budget_source(&records, rate());
        let rows: Vec<_> = dist
            .data
            .iter()
            .map(|d| (d.budget_source_name.as_str(), d.amounts.ils))
            .collect();
        assert_eq!(rows, vec![("Capital", 8.0), ("Operations", 44.0), ("Unknown", 0.0)]);
        assert_eq!(dist.data[2].amounts.total_ils, 4.0);
        assert!(dist.data[2].budget_source_id.is_none());
    }

    #[test]
    fn timeline_buckets_by_month_in_target_currency() {
        let records = vec![
            with_costs(record(1, at(2024, 2, 3), PurposeStatus::InProgress), &[(Currency::SupportUsd, 10.0)]),
            with_costs(record(2, at(2024, 1, 20), PurposeStatus::InProgress), &[(Currency::Ils, 8.0)]),
            with_costs(record(3, at(2024, 2, 28), PurposeStatus::Signed), &[(Currency::Ils, 4.0)]),
            record(4, at(2024, 3, 1), PurposeStatus::Signed),
        ];

        let timeline = expenditure_timeline(&records, TimeGrouping::Month, Currency::Ils, rate());
        assert_eq!(timeline.labels, vec!["2024-01", "2024-02"]);
        assert_eq!(timeline.datasets.len(), 1);
        assert_eq!(timeline.datasets[0].label, "Expenditure (ILS)");
        assert_eq!(timeline.datasets[0].data, vec![8.0, 44.0]);
    }

    #[test]
    fn grouping_labels() {
        let t = at(2024, 12, 30);
        assert_eq!(TimeGrouping::Day.label(t), "2024-12-30");
        assert_eq!(TimeGrouping::Week.label(t), "2025-W01");
        assert_eq!(TimeGrouping::Month.label(t), "2024-12");
        assert_eq!(TimeGrouping::Year.label(t), "2024");
    }

    #[test]
    fn grouping_parses_case_insensitively() {
        assert_eq!("Week".parse::<TimeGrouping>().unwrap(), TimeGrouping::Week);
        assert!("quarter".parse::<TimeGrouping>().is_err());
    }
}
