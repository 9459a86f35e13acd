use serde::{Deserialize, Serialize};

use calculaud_core::{DomainResult, Entity, ServiceTypeId};

pub const NAME_MAX_LEN: usize = 100;

/// Category of services ("IT Equipment", "Software").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: ServiceTypeId,
    pub name: String,
}

impl Entity for ServiceType {
    type Id = ServiceTypeId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewServiceType {
    pub name: String,
}

impl NewServiceType {
    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            name: crate::normalize_name(&self.name, NAME_MAX_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceTypePatch {
    #[serde(default)]
    pub name: Option<String>,
}

impl ServiceTypePatch {
    pub fn apply(&self, current: &ServiceType) -> DomainResult<ServiceType> {
        let name = match &self.name {
            Some(name) => crate::normalize_name(name, NAME_MAX_LEN)?,
            None => current.name.clone(),
        };
        Ok(ServiceType { id: current.id, name })
    }
}
