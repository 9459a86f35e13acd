//! API-side authorization guard.
//!
//! Handlers call [`require`] before touching the store, which keeps the
//! domain crates and infra auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use calculaud_auth::{Permission, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// `Err` carries a ready 403 response.
pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), Response> {
    authorize(principal.principal(), permission).map_err(|e| {
        tracing::debug!(subject = principal.subject(), %permission, "permission denied");
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calculaud_auth::permissions::{ANALYTICS_READ, PROCUREMENT_WRITE};
    use calculaud_auth::{Principal, Role, RolePolicy};

    fn ctx(role: &'static str) -> PrincipalContext {
        let principal = Principal::from_roles("u-1", vec![Role::new(role)], &RolePolicy::default());
        PrincipalContext::new(principal, "token")
    }

    #[test]
    fn user_reads_but_cannot_write() {
        assert!(require(&ctx("user"), &ANALYTICS_READ).is_ok());
        let denied = require(&ctx("user"), &PROCUREMENT_WRITE).unwrap_err();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn admin_is_allowed_everything() {
        assert!(require(&ctx("admin"), &PROCUREMENT_WRITE).is_ok());
    }
}
