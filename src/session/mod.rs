//! # Session Tokens
//!
//! HS256 bearer tokens handed back to the client after a successful login,
//! and minted for the gateway's own service identity when it calls the
//! REST-action service.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::errors::{Error, Result};

/// Lifetime used when the configured duration is zero
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(8 * 60 * 60);

/// Session token claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub username: String,
    pub groups: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies session tokens
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    duration: Duration,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer").field("duration", &self.duration).finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(secret: &[u8], duration: Duration) -> Self {
        let duration = if duration.is_zero() { DEFAULT_SESSION_DURATION } else { duration };
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::default(),
            duration,
        }
    }

    /// Build an issuer when a signing key is configured
    pub fn from_config(config: &SessionConfig) -> Option<Self> {
        config
            .jwt_sign_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| Self::new(key.as_bytes(), config.jwt_duration))
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Issue a token with the configured lifetime
    pub fn issue(&self, username: &str, groups: &[String]) -> Result<String> {
        self.issue_for(username, groups, self.duration)
    }

    /// Issue a token with an explicit lifetime
    pub fn issue_for(&self, username: &str, groups: &[String], lifetime: Duration) -> Result<String> {
        let now = Utc::now().timestamp();
        let lifetime = i64::try_from(lifetime.as_secs())
            .map_err(|_| Error::validation("session lifetime out of range"))?;

        let claims = SessionClaims {
            username: username.to_string(),
            groups: groups.to_vec(),
            iat: now,
            exp: now + lifetime,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal { message: "failed to sign session token".into(), source: Some(Box::new(e)) })
    }

    /// Validate a token and return its claims
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| Error::unauthorized(format!("invalid session token: {}", e)))
    }
}
