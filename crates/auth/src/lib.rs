//! `calculaud-auth`: bearer-token authentication and role based authorization.
//!
//! This crate is decoupled from HTTP and storage: the API layer extracts the
//! token, this crate verifies it and answers permission checks.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use roles::{Role, RolePolicy};
