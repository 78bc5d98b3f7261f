//! Single-identity enforcement.
//!
//! Exactly one identity may mint tokens or touch session data for the
//! lifetime of the process. The gate runs twice per request lifecycle: once
//! before a token is minted and again after a token is verified. The second
//! check is deliberate: a stolen or misrouted token for a different subject
//! must still be rejected even when minting was gated.

use crate::{Error, Result};

/// Compares identities against the one authorized identity.
///
/// The authorized value is injected at construction (immutable for the
/// process), so tests can instantiate gates with arbitrary identities.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    authorized: String,
}

impl IdentityGate {
    /// Create a gate for the given authorized identity.
    /// The identity is normalized once here; candidates are normalized per call.
    #[must_use]
    pub fn new(authorized_identity: &str) -> Self {
        Self {
            authorized: normalize(authorized_identity),
        }
    }

    /// Check a candidate identity. Comparison is case-insensitive and
    /// whitespace-trimmed on both sides.
    pub fn authorize(&self, identity: &str) -> Result<()> {
        if normalize(identity) == self.authorized {
            Ok(())
        } else {
            Err(Error::UnauthorizedUser(identity.to_string()))
        }
    }

    /// The normalized authorized identity (the canonical owner string used
    /// for session ownership records).
    #[must_use]
    pub fn authorized_identity(&self) -> &str {
        &self.authorized
    }
}

/// Trim and lower-case an identity for comparison and storage.
#[must_use]
pub fn normalize(identity: &str) -> String {
    identity.trim().to_lowercase()
}
