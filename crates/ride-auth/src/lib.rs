//! Driver bearer-token issuance and validation.
//!
//! The signing algorithm is fixed to symmetric HMAC-SHA256; `jsonwebtoken`'s [`Validation`]
//! pins the accepted algorithm set to exactly `[HS256]`, so a token whose header claims any other
//! algorithm (including `none`) is rejected even if some signature happens to verify under the
//! configured key — this is what keeps the implementation safe from the classic JWT
//! algorithm-confusion attack. The source passed the demo key to the signer as a plain `String`;
//! here the key is carried as opaque bytes end to end and never printed or logged.

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::hours(72);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    Missing,
    #[error("invalid token")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverIdentity {
    pub driver_id: i64,
    pub issued_at: OffsetDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    driver_id: i64,
    iat: i64,
    exp: i64,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    fn issue(&self, driver_id: i64) -> Result<String, AuthError>;

    fn validate(&self, token: &str) -> Result<DriverIdentity, AuthError>;
}

pub struct HmacAuthenticator {
    secret: SecretBox<Vec<u8>>,
    validity: Duration,
}

impl HmacAuthenticator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self::with_validity(secret, DEFAULT_TOKEN_VALIDITY)
    }

    pub fn with_validity(secret: Vec<u8>, validity: Duration) -> Self {
        Self {
            secret: SecretBox::new(Box::new(secret)),
            validity,
        }
    }
}

impl Authenticator for HmacAuthenticator {
    fn issue(&self, driver_id: i64) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            driver_id,
            iat: now.unix_timestamp(),
            exp: (now + self.validity).unix_timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret()),
        )
        .map_err(AuthError::Invalid)
    }

    fn validate(&self, token: &str) -> Result<DriverIdentity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret()),
            &validation,
        )
        .map_err(|error| match error.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(error),
        })?;

        let issued_at = OffsetDateTime::from_unix_timestamp(data.claims.iat)
            .map_err(|_| AuthError::Invalid(jsonwebtoken::errors::ErrorKind::InvalidToken.into()))?;

        Ok(DriverIdentity {
            driver_id: data.claims.driver_id,
            issued_at,
        })
    }
}

/// Extracts the bearer token from the raw value of an `Authorization` header, e.g.
/// `"Bearer abc.def.ghi"`. Returns [`AuthError::Missing`] for an empty or malformed header.
pub fn bearer_token(header_value: Option<&str>) -> Result<&str, AuthError> {
    let value = header_value.ok_or(AuthError::Missing)?;
    value.strip_prefix("Bearer ").ok_or(AuthError::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_validates_a_round_trip_token() {
        let auth = HmacAuthenticator::new(b"test-secret-key-material".to_vec());
        let token = auth.issue(7).expect("issue succeeds");
        let identity = auth.validate(&token).expect("validate succeeds");
        assert_eq!(identity.driver_id, 7);
    }

    #[test]
    fn rejects_none_algorithm_even_with_matching_payload() {
        // Build a token with `alg: none` by hand; `decode` must reject it outright because
        // `Validation::algorithms` is pinned to `[HS256]`.
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(br#"{"driver_id":7,"iat":0,"exp":9999999999}"#);
        let forged = format!("{header}.{claims}.");

        let auth = HmacAuthenticator::new(b"test-secret-key-material".to_vec());
        assert!(auth.validate(&forged).is_err());
    }
}
