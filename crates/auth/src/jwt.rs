//! HS256 token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// Shared-secret validator. Issuer and audience are only enforced when set.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    issuer: Option<String>,
    audience: Option<String>,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            issuer: None,
            audience: None,
        }
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks run against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        // A configured issuer or audience must also be present in the token.
        validation.required_spec_claims.clear();
        validation.validate_aud = self.audience.is_some();
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
            validation.required_spec_claims.insert("iss".to_string());
        }
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
            validation.required_spec_claims.insert("aud".to_string());
        }
        validation
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation())
            .map_err(|e| TokenValidationError::Invalid(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn mint(secret: &str, claims: &JwtClaims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims() -> JwtClaims {
        let now = Utc::now();
        JwtClaims::new("alice", vec![Role::new("admin")], now, now + Duration::minutes(10))
    }

    #[test]
    fn round_trips_a_signed_token() {
        let token = mint("s3cret", &claims());
        let decoded = Hs256JwtValidator::new("s3cret").validate(&token, Utc::now()).unwrap();
        assert_eq!(decoded.sub, "alice");
        assert_eq!(decoded.roles, vec![Role::new("admin")]);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint("s3cret", &claims());
        let err = Hs256JwtValidator::new("other").validate(&token, Utc::now()).unwrap_err();
        assert!(matches!(err, TokenValidationError::Invalid(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = mint("s3cret", &claims());
        let later = Utc::now() + Duration::hours(1);
        let err = Hs256JwtValidator::new("s3cret").validate(&token, later).unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }

    #[test]
    fn issuer_and_audience_are_enforced_when_configured() {
        let mut c = claims();
        c.iss = Some("calculaud".into());
        c.aud = Some("api".into());
        let token = mint("s3cret", &c);

        let strict = Hs256JwtValidator::new("s3cret")
            .with_issuer(Some("calculaud".into()))
            .with_audience(Some("api".into()));
        assert!(strict.validate(&token, Utc::now()).is_ok());

        let wrong = Hs256JwtValidator::new("s3cret").with_audience(Some("web".into()));
        assert!(wrong.validate(&token, Utc::now()).is_err());

        let plain = mint("s3cret", &claims());
        assert!(strict.validate(&plain, Utc::now()).is_err());
    }

    #[test]
    fn configured_claims_must_be_present() {
        let mut only_aud = claims();
        only_aud.aud = Some("api".into());
        let token = mint("s3cret", &only_aud);

        let issuer_only = Hs256JwtValidator::new("s3cret").with_issuer(Some("calculaud".into()));
        assert!(matches!(
            issuer_only.validate(&token, Utc::now()),
            Err(TokenValidationError::Invalid(_))
        ));

        let mut only_iss = claims();
        only_iss.iss = Some("calculaud".into());
        let token = mint("s3cret", &only_iss);
        assert!(issuer_only.validate(&token, Utc::now()).is_ok());

        let audience_only = Hs256JwtValidator::new("s3cret").with_audience(Some("api".into()));
        assert!(audience_only.validate(&token, Utc::now()).is_err());

        // Nothing configured: neither claim is needed.
        assert!(Hs256JwtValidator::new("s3cret").validate(&mint("s3cret", &claims()), Utc::now()).is_ok());
    }
}
