//! Submitter identity
//!
//! The raw bearer token is kept only so a policy engine can forward it;
//! caches and logs use the [`TokenFingerprint`].

use crate::clock::add_duration;
use crate::error::{AuthzError, AuthzResult};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use mdsub_model::TokenFingerprint;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

/// Authenticated caller of a submission
#[derive(Clone)]
pub struct Identity {
    subject: String,
    token: String,
    fingerprint: TokenFingerprint,
    expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Create identity from an already-validated token
    #[must_use]
    pub fn new(subject: impl Into<String>, token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            subject: subject.into(),
            fingerprint: TokenFingerprint::compute(&token),
            token,
            expires_at: None,
        }
    }

    /// Set declared token expiry
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Read `sub` and `exp` from a JWT
    ///
    /// The signature is not verified here; that is the credential service's
    /// job. A token that is not a decodable JWT is an authentication failure.
    pub fn from_bearer(token: &str) -> AuthzResult<Self> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| AuthzError::InvalidToken(format!("Didn't receive JWT correctly: {e}")))?;

        let mut identity = Self::new(data.claims.sub.unwrap_or_default(), token);
        if let Some(exp) = data.claims.exp {
            identity.expires_at = DateTime::from_timestamp(exp, 0);
        }
        Ok(identity)
    }

    /// Parse an `Authorization: Bearer <jwt>` header value
    pub fn from_authorization_header(header: &str) -> AuthzResult<Self> {
        let mut parts = header.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
                Self::from_bearer(token)
            }
            _ => Err(AuthzError::InvalidToken("Didn't receive JWT correctly".into())),
        }
    }

    #[inline]
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Raw token, for forwarding to the policy engine only
    #[inline]
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> TokenFingerprint {
        self.fingerprint
    }

    #[inline]
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True when the token expires before `now + window`
    ///
    /// A token without a declared expiry is always near expiry.
    #[must_use]
    pub fn is_near_expiry(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.expires_at {
            Some(exp) => exp < add_duration(now, window),
            None => true,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.subject)
            .field("fingerprint", &self.fingerprint.short())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn jwt(claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"issuer-secret")).unwrap()
    }

    #[test]
    fn decodes_sub_and_exp_without_key() {
        let token = jwt(json!({"sub": "alice", "exp": 2_000_000_000}));
        let identity = Identity::from_bearer(&token).unwrap();
        assert_eq!(identity.subject(), "alice");
        assert_eq!(identity.expires_at().map(|t| t.timestamp()), Some(2_000_000_000));
        assert_eq!(identity.fingerprint(), TokenFingerprint::compute(&token));
    }

    #[test]
    fn expired_tokens_still_decode() {
        let token = jwt(json!({"sub": "bob", "exp": 1}));
        let identity = Identity::from_bearer(&token).unwrap();
        assert!(identity.is_near_expiry(Utc::now(), Duration::from_secs(1)));
    }

    #[test]
    fn garbage_is_invalid_token() {
        assert!(matches!(
            Identity::from_bearer("not-a-jwt"),
            Err(AuthzError::InvalidToken(_))
        ));
    }

    #[test]
    fn header_parsing() {
        let token = jwt(json!({"sub": "carol", "exp": 2_000_000_000}));
        let identity = Identity::from_authorization_header(&format!("Bearer {token}")).unwrap();
        assert_eq!(identity.subject(), "carol");
        assert!(Identity::from_authorization_header(&token).is_err());
        assert!(Identity::from_authorization_header("Basic abc").is_err());
    }

    #[test]
    fn near_expiry_window() {
        let now = Utc::now();
        let identity = Identity::new("dave", "t").with_expiry(add_duration(now, Duration::from_millis(500)));
        assert!(identity.is_near_expiry(now, Duration::from_secs(1)));
        assert!(!identity.is_near_expiry(now, Duration::from_millis(100)));
        assert!(Identity::new("eve", "t").is_near_expiry(now, Duration::from_secs(1)));
    }

    #[test]
    fn debug_hides_token() {
        let identity = Identity::new("frank", "super-secret-token");
        assert!(!format!("{identity:?}").contains("super-secret-token"));
    }
}
