//! Catalog lookups: suppliers, service types, the services (catalog items)
//! that belong to a service type, budget sources and responsible authorities.
//!
//! Pure validation and uniqueness rules; persistence lives in `calculaud-infra`.

pub mod budget_source;
pub mod responsible_authority;
pub mod service;
pub mod service_type;
pub mod supplier;

pub use budget_source::{BudgetSource, BudgetSourcePatch, NewBudgetSource};
pub use responsible_authority::{NewResponsibleAuthority, ResponsibleAuthority, ResponsibleAuthorityPatch};
pub use service::{NewService, Service, ServicePatch};
pub use service_type::{NewServiceType, ServiceType, ServiceTypePatch};
pub use supplier::{NewSupplier, Supplier, SupplierPatch};

use calculaud_core::{DomainError, DomainResult, error::check_length};

/// Trim and length-check a lookup name.
pub(crate) fn normalize_name(value: &str, max: usize) -> DomainResult<String> {
    let value = value.trim();
    check_length("name", value, 1, max)?;
    Ok(value.to_string())
}

/// Reject `name` when another record (other than `exclude`) already uses it.
///
/// Comparison is exact after trimming; the database unique index uses the
/// same rule.
pub fn ensure_unique_name<'a, I, Id>(
    entity: &str,
    existing: I,
    name: &str,
    exclude: Option<Id>,
) -> DomainResult<()>
where
    I: IntoIterator<Item = (Id, &'a str)>,
    Id: PartialEq + Copy,
{
    let taken = existing
        .into_iter()
        .any(|(id, other)| Some(id) != exclude && other == name);
    if taken {
        return Err(DomainError::conflict(format!(
            "{entity} with name '{name}' already exists"
        )));
    }
    Ok(())
}

/// Case-insensitive name search shared by the catalog list endpoints.
pub fn name_matches(name: &str, search: Option<&str>) -> bool {
    match search.map(str::trim) {
        Some(term) if !term.is_empty() => name.to_lowercase().contains(&term.to_lowercase()),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniqueness_ignores_the_record_being_updated() {
        let existing = [(1, "Dell"), (2, "HP")];
        assert!(ensure_unique_name("Supplier", existing, "Dell", Some(1)).is_ok());
        let err = ensure_unique_name("Supplier", existing, "Dell", Some(2)).unwrap_err();
        assert_eq!(err.to_string(), "Supplier with name 'Dell' already exists");
    }

    #[test]
    fn search_is_case_insensitive() {
        assert!(name_matches("Microsoft", Some("soft")));
        assert!(name_matches("Microsoft", Some("  ")));
        assert!(!name_matches("Microsoft", Some("apple")));
    }
}
