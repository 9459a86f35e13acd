use calculaud_auth::{Permission, Principal, Role};

/// Principal context for a request (authenticated identity + roles).
///
/// The raw bearer token is kept so the assistant can forward it to the tool
/// server, which re-authenticates the caller itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
    bearer_token: String,
}

impl PrincipalContext {
    pub fn new(principal: Principal, bearer_token: impl Into<String>) -> Self {
        Self {
            principal,
            bearer_token: bearer_token.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.principal.subject
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.principal.permissions
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn bearer_token(&self) -> &str {
        &self.bearer_token
    }
}
