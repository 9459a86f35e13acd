use serde::{Deserialize, Serialize};

use calculaud_core::{BudgetSourceId, DomainResult, Entity};

pub const NAME_MAX_LEN: usize = 255;

/// Where the money for a purpose comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSource {
    pub id: BudgetSourceId,
    pub name: String,
}

impl Entity for BudgetSource {
    type Id = BudgetSourceId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewBudgetSource {
    pub name: String,
}

impl NewBudgetSource {
    pub fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            name: crate::normalize_name(&self.name, NAME_MAX_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BudgetSourcePatch {
    #[serde(default)]
    pub name: Option<String>,
}

impl BudgetSourcePatch {
    pub fn apply(&self, current: &BudgetSource) -> DomainResult<BudgetSource> {
        let name = match &self.name {
            Some(name) => crate::normalize_name(name, NAME_MAX_LEN)?,
            None => current.name.clone(),
        };
        Ok(BudgetSource { id: current.id, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_names_are_allowed_up_to_the_column_size() {
        assert!(NewBudgetSource { name: "x".repeat(255) }.validated().is_ok());
        assert!(NewBudgetSource { name: "x".repeat(256) }.validated().is_err());
        assert!(NewBudgetSource { name: "   ".into() }.validated().is_err());
    }
}
