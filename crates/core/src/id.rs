//! Strongly-typed identifiers used across the domain.
//!
//! Every table uses a database-assigned `BIGINT` surrogate key. Wrapping them
//! keeps a `PurposeId` from being passed where a `HierarchyId` is expected.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a hierarchy node (organizational unit).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HierarchyId(i64);

/// Identifier of a purpose (procurement request).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurposeId(i64);

/// Surrogate key of an EMF row (not the business `emf_id` string).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmfId(i64);

/// Identifier of a cost line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostId(i64);

/// Identifier of a supplier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(i64);

/// Identifier of a service type (service category).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTypeId(i64);

/// Identifier of a service (catalog item).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(i64);

/// Identifier of a budget source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BudgetSourceId(i64);

/// Identifier of a responsible authority.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponsibleAuthorityId(i64);

macro_rules! impl_int_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = i64::from_str(s.trim())
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

impl_int_newtype!(HierarchyId, "HierarchyId");
impl_int_newtype!(PurposeId, "PurposeId");
impl_int_newtype!(EmfId, "EmfId");
impl_int_newtype!(CostId, "CostId");
impl_int_newtype!(SupplierId, "SupplierId");
impl_int_newtype!(ServiceTypeId, "ServiceTypeId");
impl_int_newtype!(ServiceId, "ServiceId");
impl_int_newtype!(BudgetSourceId, "BudgetSourceId");
impl_int_newtype!(ResponsibleAuthorityId, "ResponsibleAuthorityId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let id: PurposeId = " 17 ".parse().unwrap();
        assert_eq!(id, PurposeId::new(17));
        assert_eq!(id.to_string(), "17");
    }

    #[test]
    fn parse_failure_names_the_type() {
        let err = "abc".parse::<HierarchyId>().unwrap_err();
        match err {
            DomainError::InvalidId(msg) => assert!(msg.starts_with("HierarchyId")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&SupplierId::new(3)).unwrap();
        assert_eq!(json, "3");
        let back: SupplierId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 3);
    }
}
