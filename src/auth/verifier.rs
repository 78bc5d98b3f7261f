//! Bearer token verification.
//!
//! # Verification flow
//!
//! 1. Split into header/payload/signature; anything else is `MalformedToken`.
//! 2. Decode the header; only `HS256` is accepted (algorithm-confusion
//!    hardening); anything else is `InvalidClaims`.
//! 3. Recompute the HMAC over `header.payload` and compare against the
//!    presented signature in constant time; mismatch is `InvalidSignature`.
//! 4. Decode the payload; `iss` and `aud` must equal the configured values,
//!    mismatch is `InvalidClaims`.
//! 5. `exp` must be strictly greater than now, otherwise `Expired`.
//!
//! Verification is a pure function of token + shared secret: no network, no
//! disk, no side effects, safe to run on every request.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::issuer::{Claims, sign};
use super::secret::SharedSecret;
use crate::{Error, Result};

/// Decoded JWT header; only `alg` and `typ` matter here
#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    #[allow(dead_code)]
    typ: Option<String>,
}

/// Validates signature and claims of presented bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    secret: SharedSecret,
    issuer: String,
    audience: String,
}

impl TokenVerifier {
    /// Create a verifier bound to the shared secret and expected claims.
    #[must_use]
    pub fn new(secret: SharedSecret, issuer: &str, audience: &str) -> Self {
        Self {
            secret,
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    /// Verify a token against the current wall clock.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token against an explicit clock, short-circuiting on the
    /// first failing step.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::MalformedToken);
        };
        if header_b64.is_empty() || payload_b64.is_empty() || sig_b64.is_empty() {
            return Err(Error::MalformedToken);
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| Error::MalformedToken)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| Error::MalformedToken)?;
        if header.alg != "HS256" {
            return Err(Error::InvalidClaims(format!(
                "unsupported algorithm {}",
                header.alg
            )));
        }

        // Signature check before any claim inspection
        let presented = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| Error::InvalidSignature)?;
        let signing_input = format!("{header_b64}.{payload_b64}");
        let expected = sign(&self.secret, signing_input.as_bytes())?;
        // ct_eq returns false for differing lengths without early exit
        if expected.ct_eq(&presented).unwrap_u8() != 1 {
            return Err(Error::InvalidSignature);
        }

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::MalformedToken)?;
        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| Error::InvalidClaims(format!("undecodable payload: {e}")))?;

        if claims.iss != self.issuer {
            return Err(Error::InvalidClaims(format!(
                "issuer mismatch: {}",
                claims.iss
            )));
        }
        if claims.aud != self.audience {
            return Err(Error::InvalidClaims(format!(
                "audience mismatch: {}",
                claims.aud
            )));
        }

        if claims.exp <= now.timestamp() {
            return Err(Error::Expired);
        }

        Ok(claims)
    }
}
