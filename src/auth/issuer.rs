//! Bearer token issuance: HMAC-SHA256 signed, time-boxed JWTs.
//!
//! Wire format: `base64url(header).base64url(payload).base64url(sig)` with no
//! padding, `header = {"alg":"HS256","typ":"JWT"}` and
//! `sig = HMAC-SHA256(secret, header || "." || payload)`.
//!
//! The input identity must come from a prior, independently verified web
//! login, never from a request body or query string. The issuing route
//! gates the identity through [`IdentityGate`](super::IdentityGate) before
//! calling [`TokenIssuer::issue`].

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::secret::SharedSecret;
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Fixed JWT header for every issued token
const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Token claims: issuer, audience, subject, issued-at, expiry (epoch seconds)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Issuer string from shared config
    pub iss: String,
    /// Audience string from shared config
    pub aud: String,
    /// The authenticated identity the token was minted for
    pub sub: String,
    /// Issued-at, epoch seconds
    pub iat: i64,
    /// Expiry, epoch seconds; always strictly greater than `iat`
    pub exp: i64,
}

/// Mints signed, short-lived bearer tokens for one verified identity at a time.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    secret: SharedSecret,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer bound to a shared secret and claim configuration.
    #[must_use]
    pub fn new(secret: SharedSecret, issuer: &str, audience: &str, ttl: Duration) -> Self {
        Self {
            secret,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            ttl,
        }
    }

    /// Issue a token for an already-authenticated identity, valid from now.
    pub fn issue(&self, identity: &str) -> Result<String> {
        self.issue_at(identity, Utc::now())
    }

    /// Issue a token with an explicit clock. Claims are deterministic given
    /// `identity` and `now`, which is what makes round-trip and expiry tests
    /// exact.
    pub fn issue_at(&self, identity: &str, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let ttl_secs = i64::try_from(self.ttl.as_secs())
            .map_err(|_| Error::Config("token TTL out of range".to_string()))?;
        let claims = Claims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: identity.to_string(),
            iat,
            exp: iat + ttl_secs,
        };

        let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header}.{payload}");

        let signature = sign(&self.secret, signing_input.as_bytes())?;
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Token lifetime, for the `expires_in` field of issuance responses
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Compute `HMAC-SHA256(secret, input)`.
pub(super) fn sign(secret: &SharedSecret, input: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| Error::Config("signing secret rejected by HMAC".to_string()))?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}
