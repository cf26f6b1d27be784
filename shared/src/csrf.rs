//! CSRF tokens for admin write forms.
//!
//! Tokens are short-lived HS256 JWTs bound to the administrator's subject.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::AdminUser;
use crate::{Error, Result};

const PURPOSE: &str = "csrf";

#[derive(Debug, Serialize, Deserialize)]
struct CsrfClaims {
    sub: String,
    purpose: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct CsrfKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl CsrfKeys {
    pub fn from_secret(secret: &[u8], ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Config("CSRF signing secret is empty".to_string()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        })
    }

    /// Issue a token for `admin`, valid from `now` for the configured ttl.
    pub fn issue(&self, admin: &AdminUser, now: DateTime<Utc>) -> Result<String> {
        let claims = CsrfClaims {
            sub: admin.user_id().to_string(),
            purpose: PURPOSE.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("Failed to sign CSRF token: {}", e)))
    }

    /// Check that `token` was issued to `admin` and has not expired at `now`.
    pub fn verify(&self, token: &str, admin: &AdminUser, now: DateTime<Utc>) -> Result<()> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        let claims = decode::<CsrfClaims>(token, &self.decoding, &validation)
            .map_err(|_| Error::Forbidden("invalid CSRF token".to_string()))?
            .claims;

        if claims.purpose != PURPOSE || claims.sub != admin.user_id() {
            return Err(Error::Forbidden("invalid CSRF token".to_string()));
        }
        if claims.exp <= now.timestamp() {
            return Err(Error::Forbidden("expired CSRF token".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::admin_from_claims;
    use chrono::TimeZone;
    use serde_json::json;

    fn admin(sub: &str) -> AdminUser {
        admin_from_claims(&json!({"sub": sub, "cognito:groups": ["rsvp-admins"]}), "rsvp-admins")
            .unwrap()
    }

    #[test]
    fn test_token_verifies_for_issuing_admin_only() {
        let keys = CsrfKeys::from_secret(b"test-secret", Duration::from_secs(600)).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let token = keys.issue(&admin("a-1"), now).unwrap();

        keys.verify(&token, &admin("a-1"), now).unwrap();
        assert!(matches!(
            keys.verify(&token, &admin("a-2"), now),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_token_expires() {
        let keys = CsrfKeys::from_secret(b"test-secret", Duration::from_secs(600)).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let token = keys.issue(&admin("a-1"), now).unwrap();

        let later = now + chrono::Duration::seconds(601);
        assert!(matches!(
            keys.verify(&token, &admin("a-1"), later),
            Err(Error::Forbidden(msg)) if msg.contains("expired")
        ));
    }

    #[test]
    fn test_token_from_other_key_rejected() {
        let keys = CsrfKeys::from_secret(b"test-secret", Duration::from_secs(600)).unwrap();
        let other = CsrfKeys::from_secret(b"other-secret", Duration::from_secs(600)).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let token = other.issue(&admin("a-1"), now).unwrap();
        assert!(keys.verify(&token, &admin("a-1"), now).is_err());
        assert!(keys.verify("not-a-token", &admin("a-1"), now).is_err());
    }
}
