use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

/// JWT claims model (transport-agnostic).
///
/// Timestamps are seconds since the Unix epoch, as on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the user identifier recorded on status changes.
    pub sub: String,

    #[serde(default)]
    pub roles: Vec<Role>,

    pub iat: i64,

    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl JwtClaims {
    pub fn new(sub: impl Into<String>, roles: Vec<Role>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: sub.into(),
            roles,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: None,
            aud: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token subject is empty")]
    MissingSubject,

    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Deterministically validate the time window and subject of decoded claims.
///
/// Signature, issuer and audience checks happen in [`crate::jwt`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.sub.trim().is_empty() {
        return Err(TokenValidationError::MissingSubject);
    }
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims::new("u-1", vec![Role::new("user")], now, now + Duration::minutes(5))
    }

    #[test]
    fn accepts_token_inside_window() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims(now), now), Ok(()));
    }

    #[test]
    fn rejects_expired_and_future_tokens() {
        let now = Utc::now();
        let c = claims(now);
        assert_eq!(
            validate_claims(&c, now + Duration::minutes(6)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&c, now - Duration::minutes(1)),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn rejects_blank_subject() {
        let now = Utc::now();
        let mut c = claims(now);
        c.sub = "  ".into();
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::MissingSubject));
    }

    #[test]
    fn optional_claims_are_omitted_on_the_wire() {
        let now = Utc::now();
        let json = serde_json::to_value(claims(now)).unwrap();
        assert!(json.get("iss").is_none());
        assert_eq!(json["roles"], serde_json::json!(["user"]));
    }
}
