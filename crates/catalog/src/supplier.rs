use serde::{Deserialize, Serialize};

use calculaud_core::{DomainResult, Entity, SupplierId};

pub const NAME_MAX_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
}

impl Entity for Supplier {
    type Id = SupplierId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSupplier {
    pub name: String,
}

impl NewSupplier {
    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            name: crate::normalize_name(&self.name, NAME_MAX_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SupplierPatch {
    #[serde(default)]
    pub name: Option<String>,
}

impl SupplierPatch {
    pub fn apply(&self, current: &Supplier) -> DomainResult<Supplier> {
        let name = match &self.name {
            Some(name) => crate::normalize_name(name, NAME_MAX_LEN)?,
            None => current.name.clone(),
        };
        Ok(Supplier { id: current.id, name })
    }
}
