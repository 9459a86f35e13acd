use serde::{Deserialize, Serialize};

use calculaud_core::{DomainResult, Entity, ServiceId, ServiceTypeId};

pub const NAME_MAX_LEN: usize = 255;

/// A catalog item ("Dell Latitude 7440") belonging to one service type.
///
/// Names are unique per service type, not globally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub service_type_id: ServiceTypeId,
}

impl Entity for Service {
    type Id = ServiceId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewService {
    pub name: String,
    pub service_type_id: ServiceTypeId,
}

impl NewService {
    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            name: crate::normalize_name(&self.name, NAME_MAX_LEN)?,
            service_type_id: self.service_type_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServicePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service_type_id: Option<ServiceTypeId>,
}

impl ServicePatch {
    pub fn apply(&self, current: &Service) -> DomainResult<Service> {
        let name = match &self.name {
            Some(name) => crate::normalize_name(name, NAME_MAX_LEN)?,
            None => current.name.clone(),
        };
        Ok(Service {
            id: current.id,
            name,
            service_type_id: self.service_type_id.unwrap_or(current.service_type_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_can_move_service_to_another_type() {
        let current = Service {
            id: ServiceId::new(5),
            name: "Laptop".into(),
            service_type_id: ServiceTypeId::new(1),
        };
        let patched = ServicePatch {
            service_type_id: Some(ServiceTypeId::new(2)),
            ..Default::default()
        }
        .apply(&current)
        .unwrap();
        assert_eq!(patched.name, "Laptop");
        assert_eq!(patched.service_type_id, ServiceTypeId::new(2));
    }
}
