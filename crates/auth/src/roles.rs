use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;
use crate::permissions::{AI_ASK, ANALYTICS_READ, PROCUREMENT_READ, WILDCARD};

/// Role identifier used for RBAC, as carried in the token's `roles` claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps role names to permissions.
///
/// The admin role grants everything; the user role may read procurement data,
/// read analytics and ask the assistant. Unknown roles grant nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    pub admin_role: String,
    pub user_role: String,
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self {
            admin_role: "admin".to_string(),
            user_role: "user".to_string(),
        }
    }
}

impl RolePolicy {
    pub fn new(admin_role: impl Into<String>, user_role: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
            user_role: user_role.into(),
        }
    }

    pub fn permissions_for(&self, roles: &[Role]) -> Vec<Permission> {
        if roles.iter().any(|r| r.as_str() == self.admin_role) {
            return vec![WILDCARD];
        }
        if roles.iter().any(|r| r.as_str() == self.user_role) {
            return vec![PROCUREMENT_READ, ANALYTICS_READ, AI_ASK];
        }
        Vec::new()
    }
}
