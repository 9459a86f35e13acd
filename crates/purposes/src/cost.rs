use serde::{Deserialize, Serialize};

use calculaud_core::{CostId, DomainError, DomainResult, EmfId, Entity};

use crate::currency::Currency;

/// A currency-tagged amount attached to an EMF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub id: CostId,
    pub emf_id: EmfId,
    pub currency: Currency,
    pub amount: f64,
}

impl Entity for Cost {
    type Id = CostId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCost {
    pub currency: Currency,
    pub amount: f64,
}

impl NewCost {
    pub fn validate(&self) -> DomainResult<()> {
        validate_amount(self.amount)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CostPatch {
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl CostPatch {
    pub fn apply(&self, current: &Cost) -> DomainResult<Cost> {
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        Ok(Cost {
            currency: self.currency.unwrap_or(current.currency),
            amount: self.amount.unwrap_or(current.amount),
            ..current.clone()
        })
    }
}

fn validate_amount(amount: f64) -> DomainResult<()> {
    if !amount.is_finite() {
        return Err(DomainError::validation("amount must be a finite number"));
    }
    if amount < 0.0 {
        return Err(DomainError::validation("amount must be greater than or equal to 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_and_infinite_amounts_are_rejected() {
        assert!(NewCost { currency: Currency::Ils, amount: -0.01 }.validate().is_err());
        assert!(NewCost { currency: Currency::Ils, amount: f64::INFINITY }.validate().is_err());
        assert!(NewCost { currency: Currency::Ils, amount: 0.0 }.validate().is_ok());
    }

    #[test]
    fn patch_updates_only_given_fields() {
        let current = Cost {
            id: CostId::new(1),
            emf_id: EmfId::new(2),
            currency: Currency::SupportUsd,
            amount: 10.0,
        };
        let patched = CostPatch { amount: Some(12.5), ..Default::default() }
            .apply(&current)
            .unwrap();
        assert_eq!(patched.currency, Currency::SupportUsd);
        assert_eq!(patched.amount, 12.5);
    }
}
