//! Bearer token inspection
//!
//! Access tokens issued by the backend are JWTs. The client never verifies
//! the signature (it does not hold the key); it only reads the `exp` claim
//! from the payload segment to decide when to refresh. Anything that cannot
//! be decoded counts as expired.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Claims the client reads from the payload segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiration timestamp (Unix epoch seconds)
    pub exp: i64,
    /// Subject - usually the username or user id
    #[serde(default)]
    pub sub: Option<String>,
    /// Issued at timestamp (Unix epoch seconds)
    #[serde(default)]
    pub iat: Option<i64>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Expired once `now` reaches `exp`, compared in milliseconds
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.exp.saturating_mul(1000)
    }

    /// Lifetime left at `now`; zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let remaining_ms = self
            .exp
            .saturating_mul(1000)
            .saturating_sub(now.timestamp_millis());
        Duration::from_millis(u64::try_from(remaining_ms).unwrap_or(0))
    }
}

/// Token decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Invalid token format")]
    InvalidFormat,

    #[error("Token payload is not valid base64url")]
    InvalidEncoding,

    #[error("Token payload is not valid claims JSON: {0}")]
    InvalidClaims(String),
}

/// Decode the payload segment of a `header.payload.signature` token
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::InvalidFormat);
    };

    if payload.is_empty() {
        return Err(TokenError::InvalidFormat);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| TokenError::InvalidEncoding)?;

    serde_json::from_slice(&bytes).map_err(|e| TokenError::InvalidClaims(e.to_string()))
}

/// True if the token is expired at `now` or cannot be decoded
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.is_expired_at(now),
        Err(_) => true,
    }
}

/// True if the token is expired or cannot be decoded
pub fn is_token_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Lifetime left on the token, `None` if it cannot be decoded
pub fn time_until_expiry(token: &str) -> Option<Duration> {
    decode_claims(token)
        .ok()
        .map(|claims| claims.remaining_at(Utc::now()))
}
