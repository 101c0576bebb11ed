//! Signing and verification of short-lived claim sets (access tokens, OAuth
//! state).
//!
//! Tokens are HS256 JWTs over a single process-wide secret. `iat`, `nbf` and
//! `exp` are stamped from the injected clock and expiry is checked against the
//! same clock, so a token valid at `T` is invalid at any instant `>= exp`.
//! Rotating the secret invalidates every outstanding token.

use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::clock::Clock;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signature mismatch")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("malformed token")]
    Malformed,
    #[error("failed to sign token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}

/// Claims carried by every access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
}

#[derive(Serialize)]
struct SignedClaims<'a, T> {
    #[serde(flatten)]
    claims: &'a T,
    iat: i64,
    nbf: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct VerifiedClaims<T> {
    #[serde(flatten)]
    claims: T,
    nbf: i64,
    exp: i64,
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// # Errors
    /// Returns an error if the secret is empty.
    pub fn new(secret: &SecretString, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let raw = secret.expose_secret().as_bytes();
        if raw.is_empty() {
            anyhow::bail!("token signing secret must not be empty");
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(raw),
            decoding: DecodingKey::from_secret(raw),
            clock,
        })
    }

    /// # Errors
    /// Returns `TokenError::Encoding` if the claims cannot be serialized.
    pub fn sign<T: Serialize>(&self, claims: &T, ttl: Duration) -> Result<String, TokenError> {
        let now = self.clock.now().timestamp();
        let signed = SignedClaims {
            claims,
            iat: now,
            nbf: now,
            exp: now + ttl.num_seconds(),
        };
        encode(&Header::new(Algorithm::HS256), &signed, &self.encoding)
            .map_err(TokenError::Encoding)
    }

    /// # Errors
    /// Returns the precise failure; callers facing untrusted clients collapse it.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks run against the injected clock below.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "nbf", "iat"]);

        let data = decode::<VerifiedClaims<T>>(token, &self.decoding, &validation).map_err(
            |err| match err.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            },
        )?;

        let now = self.clock.now().timestamp();
        if now >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        if now < data.claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        Ok(data.claims.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use anyhow::Result;
    use chrono::Utc;

    fn codec(secret: &str, clock: Arc<ManualClock>) -> Result<TokenCodec> {
        TokenCodec::new(&SecretString::from(secret.to_string()), clock)
    }

    fn claims() -> AccessClaims {
        AccessClaims {
            sub: "7".to_string(),
            email: "user@example.com".to_string(),
        }
    }

    #[test]
    fn sign_then_verify_returns_claims() -> Result<()> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let codec = codec("secret", clock)?;
        let token = codec.sign(&claims(), Duration::seconds(900))?;
        let verified: AccessClaims = codec.verify(&token)?;
        assert_eq!(verified, claims());
        Ok(())
    }

    #[test]
    fn verify_rejects_foreign_signature() -> Result<()> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ours = codec("secret", clock.clone())?;
        let theirs = codec("other-secret", clock)?;
        let token = theirs.sign(&claims(), Duration::seconds(900))?;
        assert!(matches!(
            ours.verify::<AccessClaims>(&token),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_at_and_after_expiry() -> Result<()> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let codec = codec("secret", clock.clone())?;
        let token = codec.sign(&claims(), Duration::seconds(900))?;

        clock.advance(Duration::seconds(899));
        assert!(codec.verify::<AccessClaims>(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(
            codec.verify::<AccessClaims>(&token),
            Err(TokenError::Expired)
        ));

        clock.advance(Duration::days(1));
        assert!(matches!(
            codec.verify::<AccessClaims>(&token),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_garbage() -> Result<()> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let codec = codec("secret", clock)?;
        assert!(matches!(
            codec.verify::<AccessClaims>("not.a.token"),
            Err(TokenError::Malformed)
        ));
        Ok(())
    }

    #[test]
    fn empty_secret_is_rejected() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        assert!(codec("", clock).is_err());
    }
}
