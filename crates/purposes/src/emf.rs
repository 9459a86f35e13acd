//! EMF: the financial/order document attached to a purpose.
//!
//! An EMF tracks three milestones, each with an external identifier and the
//! date it was issued: the order, the demand, and the bikushit (inspection).
//! Those dates count as progress for the stuck scan.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use calculaud_core::error::{check_length, check_optional_length};
use calculaud_core::patch::{merge, nullable};
use calculaud_core::{DomainResult, EmfId, Entity, PurposeId};

use crate::cost::Cost;

pub const ID_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emf {
    pub id: EmfId,
    /// Business identifier, unique across all purposes.
    pub emf_id: String,
    pub purpose_id: PurposeId,
    pub creation_time: DateTime<Utc>,
    pub order_id: Option<String>,
    pub order_creation_date: Option<NaiveDate>,
    pub demand_id: Option<String>,
    pub demand_creation_date: Option<NaiveDate>,
    pub bikushit_id: Option<String>,
    pub bikushit_creation_date: Option<NaiveDate>,
    #[serde(default)]
    pub costs: Vec<Cost>,
}

impl Entity for Emf {
    type Id = EmfId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Emf {
    /// Milestone dates that are set, in order/demand/bikushit order.
    pub fn milestone_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        [
            self.order_creation_date,
            self.demand_creation_date,
            self.bikushit_creation_date,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewEmf {
    pub emf_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_creation_date: Option<NaiveDate>,
    #[serde(default)]
    pub demand_id: Option<String>,
    #[serde(default)]
    pub demand_creation_date: Option<NaiveDate>,
    #[serde(default)]
    pub bikushit_id: Option<String>,
    #[serde(default)]
    pub bikushit_creation_date: Option<NaiveDate>,
}

impl NewEmf {
    pub fn validated(mut self) -> DomainResult<Self> {
        self.emf_id = self.emf_id.trim().to_string();
        check_length("emf_id", &self.emf_id, 1, ID_MAX_LEN)?;
        check_optional_length("order_id", self.order_id.as_deref(), ID_MAX_LEN)?;
        check_optional_length("demand_id", self.demand_id.as_deref(), ID_MAX_LEN)?;
        check_optional_length("bikushit_id", self.bikushit_id.as_deref(), ID_MAX_LEN)?;
        Ok(self)
    }

    pub fn into_emf(self, id: EmfId, purpose_id: PurposeId, now: DateTime<Utc>) -> Emf {
        Emf {
            id,
            emf_id: self.emf_id,
            purpose_id,
            creation_time: now,
            order_id: self.order_id,
            order_creation_date: self.order_creation_date,
            demand_id: self.demand_id,
            demand_creation_date: self.demand_creation_date,
            bikushit_id: self.bikushit_id,
            bikushit_creation_date: self.bikushit_creation_date,
            costs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EmfPatch {
    #[serde(default)]
    pub emf_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub order_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub order_creation_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub demand_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub demand_creation_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub bikushit_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub bikushit_creation_date: Option<Option<NaiveDate>>,
}

impl EmfPatch {
    pub fn apply(&self, current: &Emf) -> DomainResult<Emf> {
        let emf_id = match &self.emf_id {
            Some(v) => {
                let v = v.trim().to_string();
                check_length("emf_id", &v, 1, ID_MAX_LEN)?;
                v
            }
            None => current.emf_id.clone(),
        };
        let updated = Emf {
            emf_id,
            order_id: merge(&self.order_id, &current.order_id),
            order_creation_date: merge(&self.order_creation_date, &current.order_creation_date),
            demand_id: merge(&self.demand_id, &current.demand_id),
            demand_creation_date: merge(&self.demand_creation_date, &current.demand_creation_date),
            bikushit_id: merge(&self.bikushit_id, &current.bikushit_id),
            bikushit_creation_date: merge(
                &self.bikushit_creation_date,
                &current.bikushit_creation_date,
            ),
            ..current.clone()
        };
        check_optional_length("order_id", updated.order_id.as_deref(), ID_MAX_LEN)?;
        check_optional_length("demand_id", updated.demand_id.as_deref(), ID_MAX_LEN)?;
        check_optional_length("bikushit_id", updated.bikushit_id.as_deref(), ID_MAX_LEN)?;
        Ok(updated)
    }
}

/// `"EMF with ID 'X' already exists"`.
pub fn duplicate_emf_id(emf_id: &str) -> calculaud_core::DomainError {
    calculaud_core::DomainError::conflict(format!("EMF with ID '{emf_id}' already exists"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn emf() -> Emf {
        NewEmf {
            emf_id: "EMF-1".into(),
            order_id: Some("ORD-1".into()),
            order_creation_date: NaiveDate::from_ymd_opt(2025, 1, 2),
            ..Default::default()
        }
        .into_emf(
            EmfId::new(1),
            PurposeId::new(1),
            Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn emf_id_is_required() {
        let err = NewEmf { emf_id: "  ".into(), ..Default::default() }.validated().unwrap_err();
        assert_eq!(err.to_string(), "emf_id must not be empty");
    }

    #[test]
    fn patch_can_clear_optional_fields() {
        let patch: EmfPatch = serde_json::from_str(r#"{"order_id": null, "demand_id": "D-9"}"#).unwrap();
        let updated = patch.apply(&emf()).unwrap();
        assert_eq!(updated.order_id, None);
        assert_eq!(updated.order_creation_date, NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(updated.demand_id.as_deref(), Some("D-9"));
        assert_eq!(updated.emf_id, "EMF-1");
    }

    #[test]
    fn milestone_dates_skip_missing() {
        let dates: Vec<_> = emf().milestone_dates().collect();
        assert_eq!(dates, vec![NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()]);
    }
}
