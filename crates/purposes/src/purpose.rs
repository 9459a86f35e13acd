use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use calculaud_core::error::check_optional_length;
use calculaud_core::patch::{merge, nullable};
use calculaud_core::{
    BudgetSourceId, DomainError, DomainResult, Entity, HierarchyId, PurposeId, ServiceId, ServiceTypeId,
    SupplierId,
};

use crate::status::{PurposeStatus, StatusChange};

pub const DESCRIPTION_MAX_LEN: usize = 2000;
pub const COMMENTS_MAX_LEN: usize = 1000;

/// A procurement request (the purpose row itself, without children).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purpose {
    pub id: PurposeId,
    pub hierarchy_id: Option<HierarchyId>,
    pub expected_delivery: Option<NaiveDate>,
    pub comments: Option<String>,
    pub description: Option<String>,
    pub status: PurposeStatus,
    pub supplier_id: Option<SupplierId>,
    pub service_type_id: Option<ServiceTypeId>,
    pub budget_source_id: Option<BudgetSourceId>,
    /// Set by the stuck scan; cleared explicitly by a user.
    pub is_flagged: bool,
    pub creation_time: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Entity for Purpose {
    type Id = PurposeId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Requested quantity of one catalog service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLine {
    pub service_id: ServiceId,
    pub quantity: i32,
}

/// Quantities must be positive and each service may appear only once.
pub fn validate_contents(contents: &[ContentLine]) -> DomainResult<()> {
    let mut seen = HashSet::new();
    for line in contents {
        if line.quantity < 1 {
            return Err(DomainError::validation(format!(
                "quantity for service {} must be at least 1",
                line.service_id
            )));
        }
        if !seen.insert(line.service_id) {
            return Err(DomainError::validation(format!(
                "Service with ID {} appears more than once in purpose contents",
                line.service_id
            )));
        }
    }
    Ok(())
}

/// `"Service with ID X does not exist"`.
pub fn unknown_service(service_id: ServiceId) -> DomainError {
    DomainError::validation(format!("Service with ID {service_id} does not exist"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewPurpose {
    #[serde(default)]
    pub hierarchy_id: Option<HierarchyId>,
    #[serde(default)]
    pub expected_delivery: Option<NaiveDate>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: PurposeStatus,
    #[serde(default)]
    pub supplier_id: Option<SupplierId>,
    #[serde(default)]
    pub service_type_id: Option<ServiceTypeId>,
    #[serde(default)]
    pub budget_source_id: Option<BudgetSourceId>,
    #[serde(default)]
    pub contents: Vec<ContentLine>,
}

impl NewPurpose {
    pub fn validate(&self) -> DomainResult<()> {
        check_optional_length("description", self.description.as_deref(), DESCRIPTION_MAX_LEN)?;
        check_optional_length("comments", self.comments.as_deref(), COMMENTS_MAX_LEN)?;
        validate_contents(&self.contents)
    }

    /// Build the row and its initial history entry.
    pub fn into_purpose(
        &self,
        id: PurposeId,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> (Purpose, StatusChange) {
        let purpose = Purpose {
            id,
            hierarchy_id: self.hierarchy_id,
            expected_delivery: self.expected_delivery,
            comments: self.comments.clone(),
            description: self.description.clone(),
            status: self.status,
            supplier_id: self.supplier_id,
            service_type_id: self.service_type_id,
            budget_source_id: self.budget_source_id,
            is_flagged: false,
            creation_time: now,
            last_modified: now,
        };
        let initial = StatusChange {
            previous_status: None,
            new_status: self.status,
            changed_at: now,
            changed_by: changed_by.map(str::to_string),
        };
        (purpose, initial)
    }
}

/// Partial update; nullable fields accept `null` to clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PurposePatch {
    #[serde(default, deserialize_with = "nullable")]
    pub hierarchy_id: Option<Option<HierarchyId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expected_delivery: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub comments: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<PurposeStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub supplier_id: Option<Option<SupplierId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub service_type_id: Option<Option<ServiceTypeId>>,
    #[serde(default, deserialize_with = "nullable")]
    pub budget_source_id: Option<Option<BudgetSourceId>>,
    #[serde(default)]
    pub is_flagged: Option<bool>,
    /// When present, replaces all contents.
    #[serde(default)]
    pub contents: Option<Vec<ContentLine>>,
}

/// Outcome of applying a [`PurposePatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurposeChange {
    pub purpose: Purpose,
    /// History row to append when the status actually changed.
    pub status_change: Option<StatusChange>,
    pub contents: Option<Vec<ContentLine>>,
}

impl PurposePatch {
    pub fn apply(
        &self,
        current: &Purpose,
        now: DateTime<Utc>,
        changed_by: Option<&str>,
    ) -> DomainResult<PurposeChange> {
        let purpose = Purpose {
            id: current.id,
            hierarchy_id: merge(&self.hierarchy_id, &current.hierarchy_id),
            expected_delivery: merge(&self.expected_delivery, &current.expected_delivery),
            comments: merge(&self.comments, &current.comments),
            description: merge(&self.description, &current.description),
            status: self.status.unwrap_or(current.status),
            supplier_id: merge(&self.supplier_id, &current.supplier_id),
            service_type_id: merge(&self.service_type_id, &current.service_type_id),
            budget_source_id: merge(&self.budget_source_id, &current.budget_source_id),
            is_flagged: self.is_flagged.unwrap_or(current.is_flagged),
            creation_time: current.creation_time,
            last_modified: now,
        };
        check_optional_length("description", purpose.description.as_deref(), DESCRIPTION_MAX_LEN)?;
        check_optional_length("comments", purpose.comments.as_deref(), COMMENTS_MAX_LEN)?;
        if let Some(contents) = &self.contents {
            validate_contents(contents)?;
        }

        let status_change = (purpose.status != current.status).then(|| StatusChange {
            previous_status: Some(current.status),
            new_status: purpose.status,
            changed_at: now,
            changed_by: changed_by.map(str::to_string),
        });

        Ok(PurposeChange {
            purpose,
            status_change,
            contents: self.contents.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    fn line(service: i64, quantity: i32) -> ContentLine {
        ContentLine {
            service_id: ServiceId::new(service),
            quantity,
        }
    }

    fn created() -> Purpose {
        NewPurpose {
            description: Some("Laptops".into()),
            supplier_id: Some(SupplierId::new(3)),
            ..Default::default()
        }
        .into_purpose(PurposeId::new(1), t(1), Some("alice"))
        .0
    }

    #[test]
    fn create_records_initial_status() {
        let (purpose, history) = NewPurpose::default().into_purpose(PurposeId::new(7), t(1), Some("bob"));
        assert_eq!(purpose.status, PurposeStatus::InProgress);
        assert_eq!(purpose.creation_time, purpose.last_modified);
        assert_eq!(history.previous_status, None);
        assert_eq!(history.new_status, PurposeStatus::InProgress);
        assert_eq!(history.changed_by.as_deref(), Some("bob"));
    }

    #[test]
    fn contents_reject_duplicates_and_zero_quantity() {
        assert!(validate_contents(&[line(1, 2), line(2, 1)]).is_ok());
        assert!(validate_contents(&[line(1, 0)]).is_err());
        let err = validate_contents(&[line(1, 1), line(1, 3)]).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn description_is_bounded() {
        let purpose = NewPurpose {
            description: Some("x".repeat(DESCRIPTION_MAX_LEN + 1)),
            ..Default::default()
        };
        assert!(purpose.validate().is_err());
    }

    #[test]
    fn status_change_is_recorded_only_when_different() {
        let current = created();
        let same = PurposePatch {
            status: Some(PurposeStatus::InProgress),
            ..Default::default()
        }
        .apply(&current, t(2), None)
        .unwrap();
        assert!(same.status_change.is_none());
        assert_eq!(same.purpose.last_modified, t(2));

        let signed = PurposePatch {
            status: Some(PurposeStatus::Signed),
            ..Default::default()
        }
        .apply(&current, t(3), Some("carol"))
        .unwrap();
        let change = signed.status_change.unwrap();
        assert_eq!(change.previous_status, Some(PurposeStatus::InProgress));
        assert_eq!(change.new_status, PurposeStatus::Signed);
        assert_eq!(change.changed_at, t(3));
    }

    #[test]
    fn null_clears_and_absent_keeps() {
        let patch: PurposePatch =
            serde_json::from_str(r#"{"supplier_id": null, "comments": "urgent"}"#).unwrap();
        let change = patch.apply(&created(), t(2), None).unwrap();
        assert_eq!(change.purpose.supplier_id, None);
        assert_eq!(change.purpose.comments.as_deref(), Some("urgent"));
        assert_eq!(change.purpose.description.as_deref(), Some("Laptops"));
        assert!(change.contents.is_none());
    }
}
