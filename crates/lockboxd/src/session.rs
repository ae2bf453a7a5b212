//! Session tokens: HS256-signed JWTs carrying the caller's user id
//!
//! Stateless: nothing is persisted, validation needs only the shared
//! secret. Expiry is checked against an explicit clock so it can be
//! tested without sleeping.

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lockbox_core::types::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum HMAC secret length in bytes
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token secret must be at least 32 bytes")]
    WeakSecret,

    #[error("token lifetime must be positive")]
    InvalidDuration,

    #[error("token signature invalid or token malformed")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("signing token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Issues and checks session tokens.
pub trait Authenticator: Send + Sync {
    fn create_token(&self, user_id: UserId, ttl: TimeDelta) -> Result<String, TokenError>;

    fn validate_token(&self, token: &str) -> Result<Claims, TokenError>;
}

pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub fn create_token_at(
        &self,
        user_id: UserId,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if ttl <= TimeDelta::zero() {
            return Err(TokenError::InvalidDuration);
        }
        let claims = Claims {
            user_id,
            exp: (now + ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is compared below against `now`, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::InvalidSignature)?;
        if data.claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}

impl Authenticator for JwtAuthenticator {
    fn create_token(&self, user_id: UserId, ttl: TimeDelta) -> Result<String, TokenError> {
        self.create_token_at(user_id, ttl, Utc::now())
    }

    fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_token_at(token, Utc::now())
    }
}
