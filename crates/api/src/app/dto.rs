use core::fmt::Display;
use core::str::FromStr;

use chrono::NaiveDate;
use serde::de::{DeserializeOwned, IntoDeserializer, value::Error as ValueError};
use serde::{Deserialize, Serialize};

use calculaud_analytics::TimeGrouping;
use calculaud_core::{DomainError, DomainResult, HierarchyId, PageRequest, SortOrder};
use calculaud_hierarchy::{HierarchyPatch, HierarchyQuery, HierarchyType};
use calculaud_purposes::{Currency, PurposeFilter, PurposeQuery, PurposeRecord};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UpdateHierarchyRequest {
    #[serde(default, rename = "type")]
    pub kind: Option<HierarchyType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "calculaud_core::patch::nullable")]
    pub parent_id: Option<Option<HierarchyId>>,
}

impl From<UpdateHierarchyRequest> for HierarchyPatch {
    fn from(req: UpdateHierarchyRequest) -> Self {
        HierarchyPatch {
            kind: req.kind,
            name: req.name,
            parent_id: req.parent_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Purpose detail as returned by the API: the hydrated record plus the
/// computed staleness.
#[derive(Debug, Serialize)]
pub struct PurposeView {
    #[serde(flatten)]
    pub record: PurposeRecord,
    pub days_since_last_progress: i64,
}

impl PurposeView {
    pub fn new(record: PurposeRecord, now: chrono::DateTime<chrono::Utc>) -> Self {
        let days_since_last_progress = record.days_since_last_progress(now);
        Self {
            record,
            days_since_last_progress,
        }
    }
}

// -------------------------
// Query strings
// -------------------------

/// Raw query pairs in request order.
///
/// Filters such as `hierarchy_id` may repeat (`?hierarchy_id=1&hierarchy_id=4`)
/// or carry a comma separated list, so handlers take the pairs and parse them
/// here. Empty values count as absent.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.trim())
    }

    fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn parse<T>(&self, key: &str) -> DomainResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.first(key)
            .map(|raw| parse_value(key, raw))
            .transpose()
    }

    pub fn parse_all<T>(&self, key: &str) -> DomainResult<Vec<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.all(key).map(|raw| parse_value(key, raw)).collect()
    }

    /// Parse a value named by its serde representation (`sort_by=path`).
    pub fn parse_named<T: DeserializeOwned>(&self, key: &str) -> DomainResult<Option<T>> {
        self.first(key)
            .map(|raw| {
                T::deserialize(raw.into_deserializer()).map_err(|e: ValueError| {
                    DomainError::validation(format!("invalid value for {key}: {e}"))
                })
            })
            .transpose()
    }

    pub fn search(&self) -> Option<String> {
        self.first("search").map(str::to_string)
    }

    pub fn page_request(&self, default_limit: u32, max_limit: u32) -> DomainResult<PageRequest> {
        PageRequest::new(self.parse("page")?, self.parse("limit")?, default_limit, max_limit)
    }

    /// Filter shared by the purpose list, the CSV export and analytics.
    pub fn purpose_filter(&self) -> DomainResult<PurposeFilter> {
        let filter = PurposeFilter {
            start_date: self.parse::<NaiveDate>("start_date")?,
            end_date: self.parse::<NaiveDate>("end_date")?,
            hierarchy_ids: self.parse_all("hierarchy_id")?,
            statuses: self.parse_all("status")?,
            supplier_ids: self.parse_all("supplier_id")?,
            service_type_ids: self.parse_all("service_type_id")?,
            service_ids: self.parse_all("service_id")?,
            is_flagged: self.parse("is_flagged")?,
            live_only: false,
        };
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(DomainError::validation("start_date must not be after end_date"));
            }
        }
        Ok(filter)
    }

    pub fn purpose_query(&self) -> DomainResult<PurposeQuery> {
        Ok(PurposeQuery {
            filter: self.purpose_filter()?,
            search: self.search(),
            sort_by: self.parse_named("sort_by")?.unwrap_or_default(),
            sort_order: self.parse_named("sort_order")?.unwrap_or(SortOrder::Desc),
        })
    }

    pub fn hierarchy_query(&self) -> DomainResult<HierarchyQuery> {
        let defaults = HierarchyQuery::default();
        Ok(HierarchyQuery {
            kind: self.parse("type")?,
            parent_id: self.parse("parent_id")?,
            search: self.search(),
            sort_by: self.parse_named("sort_by")?.unwrap_or(defaults.sort_by),
            sort_order: self.parse_named("sort_order")?.unwrap_or(defaults.sort_order),
        })
    }

    pub fn time_grouping(&self) -> DomainResult<TimeGrouping> {
        Ok(self.parse("group_by")?.unwrap_or_default())
    }

    /// Timeline currency; ILS when not given.
    pub fn currency(&self) -> DomainResult<Currency> {
        Ok(self.parse("currency")?.unwrap_or(Currency::Ils))
    }
}

fn parse_value<T>(key: &str, raw: &str) -> DomainResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| DomainError::validation(format!("invalid value for {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calculaud_core::{ServiceId, SupplierId};
    use calculaud_hierarchy::HierarchySort;
    use calculaud_purposes::{PurposeSort, PurposeStatus};

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn repeated_and_comma_separated_ids_are_collected() {
        let filter = params(&[
            ("hierarchy_id", "1"),
            ("hierarchy_id", "4,7"),
            ("service_id", "3"),
            ("supplier_id", ""),
            ("status", "signed"),
        ])
        .purpose_filter()
        .unwrap();
        assert_eq!(
            filter.hierarchy_ids,
            vec![HierarchyId::new(1), HierarchyId::new(4), HierarchyId::new(7)]
        );
        assert_eq!(filter.service_ids, vec![ServiceId::new(3)]);
        assert_eq!(filter.supplier_ids, Vec::<SupplierId>::new());
        assert_eq!(filter.statuses, vec![PurposeStatus::Signed]);
    }

    #[test]
    fn purpose_query_defaults_to_newest_first() {
        let query = params(&[]).purpose_query().unwrap();
        assert_eq!(query.sort_by, PurposeSort::CreationTime);
        assert_eq!(query.sort_order, SortOrder::Desc);

        let query = params(&[("sort_by", "expected_delivery"), ("sort_order", "asc")])
            .purpose_query()
            .unwrap();
        assert_eq!(query.sort_by, PurposeSort::ExpectedDelivery);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }

    #[test]
    fn hierarchy_query_defaults_to_path_ascending() {
        let query = params(&[("type", "unit")]).hierarchy_query().unwrap();
        assert_eq!(query.kind, Some(HierarchyType::Unit));
        assert_eq!(query.sort_by, HierarchySort::Path);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }

    #[test]
    fn malformed_values_are_validation_errors() {
        assert!(matches!(
            params(&[("start_date", "yesterday")]).purpose_filter(),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            params(&[("sort_by", "price")]).purpose_query(),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            params(&[("start_date", "2025-02-01"), ("end_date", "2025-01-01")]).purpose_filter(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn pagination_is_bounded() {
        let page = params(&[("page", "2"), ("limit", "10")]).page_request(100, 200).unwrap();
        assert_eq!(page.offset(), 10);
        assert!(params(&[("limit", "500")]).page_request(100, 200).is_err());
    }

    #[test]
    fn hierarchy_patch_distinguishes_null_parent() {
        let req: UpdateHierarchyRequest = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(HierarchyPatch::from(req).parent_id, Some(None));
        let req: UpdateHierarchyRequest = serde_json::from_str(r#"{"name": "Ops"}"#).unwrap();
        let patch = HierarchyPatch::from(req);
        assert_eq!(patch.parent_id, None);
        assert_eq!(patch.name.as_deref(), Some("Ops"));
    }
}
