use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use calculaud_core::{DomainResult, Entity, ResponsibleAuthorityId};

pub const NAME_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibleAuthority {
    pub id: ResponsibleAuthorityId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for ResponsibleAuthority {
    type Id = ResponsibleAuthorityId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewResponsibleAuthority {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewResponsibleAuthority {
    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            name: crate::normalize_name(&self.name, NAME_MAX_LEN)?,
            description: normalize_description(self.description),
        })
    }
}

/// Partial update. `description: null` clears the description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponsibleAuthorityPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "calculaud_core::patch::nullable")]
    pub description: Option<Option<String>>,
}

impl ResponsibleAuthorityPatch {
    pub fn apply(&self, current: &ResponsibleAuthority) -> DomainResult<ResponsibleAuthority> {
        let name = match &self.name {
            Some(name) => crate::normalize_name(name, NAME_MAX_LEN)?,
            None => current.name.clone(),
        };
        let description = match &self.description {
            Some(description) => normalize_description(description.clone()),
            None => current.description.clone(),
        };
        Ok(ResponsibleAuthority {
            id: current.id,
            name,
            description,
            created_at: current.created_at,
        })
    }
}

fn normalize_description(value: Option<String>) -> Option<String> {
    value
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn current() -> ResponsibleAuthority {
        ResponsibleAuthority {
            id: ResponsibleAuthorityId::new(1),
            name: "Legal".into(),
            description: Some("Contracts review".into()),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn blank_description_is_dropped() {
        let new = NewResponsibleAuthority { name: " Finance ".into(), description: Some("  ".into()) }
            .validated()
            .unwrap();
        assert_eq!(new.name, "Finance");
        assert_eq!(new.description, None);
    }

    #[test]
    fn patch_clears_description_on_null() {
        let patch: ResponsibleAuthorityPatch = serde_json::from_str(r#"{"description": null}"#).unwrap();
        let updated = patch.apply(&current()).unwrap();
        assert_eq!(updated.description, None);
        assert_eq!(updated.name, "Legal");

        let patch: ResponsibleAuthorityPatch = serde_json::from_str(r#"{"name": "Procurement"}"#).unwrap();
        let updated = patch.apply(&current()).unwrap();
        assert_eq!(updated.description.as_deref(), Some("Contracts review"));
        assert_eq!(updated.created_at, current().created_at);
    }
}
