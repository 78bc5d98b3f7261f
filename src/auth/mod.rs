//! Token issuance, verification and single-identity enforcement.
//!
//! The issuing side (web-login proxy) and the verifying side (session
//! backend) share one [`SharedSecret`]; both are constructed from the same
//! configuration so a mismatch is caught by the startup round-trip check in
//! the server, not discovered in production.

mod gate;
mod issuer;
mod secret;
mod verifier;

pub use gate::{IdentityGate, normalize};
pub use issuer::{Claims, TokenIssuer};
pub use secret::SharedSecret;
pub use verifier::TokenVerifier;
