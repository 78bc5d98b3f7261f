//! Shared signing secret value object.
//!
//! One symmetric secret is shared out-of-band between the token-issuing and
//! token-verifying sides. It is loaded once at startup, never mutated, and
//! never logged; `Debug` is redacted.

use std::fmt;
use std::sync::Arc;

use crate::config::MIN_SECRET_BYTES;
use crate::{Error, Result};

/// Symmetric HMAC signing secret with a minimum-entropy requirement.
///
/// Cheap to clone; the key material is reference-counted.
#[derive(Clone)]
pub struct SharedSecret(Arc<[u8]>);

impl SharedSecret {
    /// Wrap a resolved secret string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the secret is shorter than
    /// [`MIN_SECRET_BYTES`]. There is no fallback value: a weak or missing
    /// secret must abort startup, never degrade to a default.
    pub fn new(raw: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = raw.as_ref();
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(Error::Config(format!(
                "signing secret must be at least {MIN_SECRET_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Arc::from(bytes)))
    }

    /// Raw key material for HMAC computation
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}
