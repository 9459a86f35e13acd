//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
///
/// Messages are user facing: the API returns them verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("{0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. a cycle in the hierarchy, or
    /// deleting a node that still owns purposes).
    #[error("{0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness rule was violated (duplicate name, duplicate EMF id).
    #[error("{0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// `"<Entity> with ID <id> not found"`, the wording used for every missing row.
    pub fn missing(entity: &str, id: impl core::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} with ID {id} not found"))
    }
}

/// Check that a trimmed text field has between `min` and `max` characters.
///
/// Lengths are counted in `char`s, not bytes, so Hebrew names are measured the
/// way users type them.
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> DomainResult<()> {
    let len = value.chars().count();
    if len < min {
        if min == 1 {
            return Err(DomainError::validation(format!("{field} must not be empty")));
        }
        return Err(DomainError::validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Same as [`check_length`] for optional fields: `None` always passes.
pub fn check_optional_length(field: &str, value: Option<&str>, max: usize) -> DomainResult<()> {
    match value {
        Some(v) => check_length(field, v, 0, max),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_uses_entity_wording() {
        let err = DomainError::missing("Purpose", 42);
        assert_eq!(err.to_string(), "Purpose with ID 42 not found");
    }

    #[test]
    fn length_is_counted_in_chars() {
        // 5 Hebrew letters are 10 bytes.
        assert!(check_length("name", "שלום!", 1, 5).is_ok());
        assert!(check_length("name", "", 1, 5).is_err());
        assert!(check_length("name", "abcdef", 1, 5).is_err());
    }

    #[test]
    fn optional_length_accepts_none() {
        assert!(check_optional_length("comments", None, 3).is_ok());
        assert!(check_optional_length("comments", Some("abcd"), 3).is_err());
    }
}
