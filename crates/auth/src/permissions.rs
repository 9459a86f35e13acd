use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "procurement.read").
/// The wildcard `"*"` allows everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));
pub const PROCUREMENT_READ: Permission = Permission(Cow::Borrowed("procurement.read"));
pub const PROCUREMENT_WRITE: Permission = Permission(Cow::Borrowed("procurement.write"));
pub const ANALYTICS_READ: Permission = Permission(Cow::Borrowed("analytics.read"));
pub const AI_ASK: Permission = Permission(Cow::Borrowed("ai.ask"));

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
