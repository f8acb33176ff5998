//! Queue-pass credentials.
//!
//! A pass is an HS256 JWT with claims `{user_id, event_id,
//! purpose="queue_pass", iat, nbf, exp, jti}`. Validation checks the
//! signature, the expiry and the purpose; when store cross-checking is
//! on, the presented token must also equal the value mirrored in Redis,
//! so deleting the mirror revokes a pass before its natural expiry.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rushgate_core::{EventId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Rejection reasons; display strings are part of the HTTP contract and
/// must round-trip unchanged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PassError {
    /// No pass was presented.
    #[error("missing queue pass")]
    Missing,
    /// Signature, claims or purpose were wrong, or the mirror entry
    /// disagreed.
    #[error("invalid queue pass")]
    Invalid,
    /// The pass was genuine but past its expiry.
    #[error("expired queue pass")]
    Expired,
}

/// Claims carried by a queue pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePassClaims {
    /// Released user.
    pub user_id: UserId,
    /// Event the pass admits the user to.
    pub event_id: EventId,
    /// Always `queue_pass`; anything else is rejected.
    pub purpose: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Not-before, seconds since epoch.
    pub nbf: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
}

/// The only accepted purpose value.
pub const PURPOSE_QUEUE_PASS: &str = "queue_pass";

/// Signs queue passes.
pub struct QueuePassIssuer {
    key: EncodingKey,
    ttl: ChronoDuration,
}

impl QueuePassIssuer {
    /// Build an issuer over a shared secret.
    #[must_use]
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            ttl: ChronoDuration::seconds(i64::try_from(ttl_secs).unwrap_or(300)),
        }
    }

    /// Issue a pass for `(user, event)` valid from now for the configured
    /// TTL. Returns the compact token and its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::Invalid`] only if encoding fails, which with
    /// an HMAC key means a serialization bug.
    pub fn issue(
        &self,
        user_id: UserId,
        event_id: &EventId,
    ) -> Result<(String, DateTime<Utc>), PassError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let claims = QueuePassClaims {
            user_id,
            event_id: event_id.clone(),
            purpose: PURPOSE_QUEUE_PASS.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|_| PassError::Invalid)?;
        Ok((token, expires_at))
    }

    /// Pass lifetime as configured.
    #[must_use]
    pub fn ttl(&self) -> std::time::Duration {
        self.ttl.to_std().unwrap_or(std::time::Duration::from_secs(300))
    }
}

/// Verifies queue passes.
pub struct QueuePassValidator {
    key: DecodingKey,
    validation: Validation,
}

impl QueuePassValidator {
    /// Build a validator over the issuer's secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate a compact token and return its claims.
    ///
    /// # Errors
    ///
    /// [`PassError::Missing`] for an empty token, [`PassError::Expired`]
    /// past `exp`, [`PassError::Invalid`] for every other defect
    /// including a wrong purpose.
    pub fn validate(&self, token: &str) -> Result<QueuePassClaims, PassError> {
        if token.is_empty() {
            return Err(PassError::Missing);
        }
        let data = decode::<QueuePassClaims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => PassError::Expired,
                _ => PassError::Invalid,
            }
        })?;
        if data.claims.purpose != PURPOSE_QUEUE_PASS {
            return Err(PassError::Invalid);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn issuer() -> QueuePassIssuer {
        QueuePassIssuer::new(SECRET, 300)
    }

    #[test]
    fn issued_pass_validates() {
        let user = UserId(Uuid::new_v4());
        let event = EventId::from("ev-1");
        let (token, expires_at) = issuer().issue(user, &event).unwrap();

        let claims = QueuePassValidator::new(SECRET).validate(&token).unwrap();
        assert_eq!(claims.user_id, user);
        assert_eq!(claims.event_id, event);
        assert_eq!(claims.purpose, PURPOSE_QUEUE_PASS);
        assert_eq!(claims.exp, expires_at.timestamp());
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let (token, _) = issuer().issue(UserId(Uuid::new_v4()), &EventId::from("ev-1")).unwrap();
        let validator = QueuePassValidator::new("different-secret");
        assert_eq!(validator.validate(&token), Err(PassError::Invalid));
    }

    #[test]
    fn expired_pass_is_reported_as_expired() {
        let issuer = QueuePassIssuer {
            key: EncodingKey::from_secret(SECRET.as_bytes()),
            ttl: ChronoDuration::seconds(-60),
        };
        let (token, _) = issuer.issue(UserId(Uuid::new_v4()), &EventId::from("ev-1")).unwrap();
        let validator = QueuePassValidator::new(SECRET);
        assert_eq!(validator.validate(&token), Err(PassError::Expired));
    }

    #[test]
    fn wrong_purpose_is_invalid() {
        let now = Utc::now();
        let claims = QueuePassClaims {
            user_id: UserId(Uuid::new_v4()),
            event_id: EventId::from("ev-1"),
            purpose: "session".into(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ChronoDuration::seconds(300)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(
            QueuePassValidator::new(SECRET).validate(&token),
            Err(PassError::Invalid)
        );
    }

    #[test]
    fn empty_token_is_missing() {
        assert_eq!(
            QueuePassValidator::new(SECRET).validate(""),
            Err(PassError::Missing)
        );
    }

    #[test]
    fn rejection_strings_round_trip() {
        assert_eq!(PassError::Missing.to_string(), "missing queue pass");
        assert_eq!(PassError::Invalid.to_string(), "invalid queue pass");
        assert_eq!(PassError::Expired.to_string(), "expired queue pass");
    }
}
