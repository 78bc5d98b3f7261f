//! Bearer authentication middleware.
//!
//! Runs after CORS and rate limiting. A missing `Authorization` header is
//! 401; a present-but-invalid token is 403 with the precise failure kind in
//! the body. After signature and claims verification the identity gate
//! re-checks the subject even though minting already gated it; the check is
//! cheap and a second line against a gate/issuer mismatch.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::Error;
use crate::auth::{IdentityGate, TokenVerifier};

/// Verified subject identity, injected into request extensions for handlers.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity(pub String);

/// Shared state for the auth middleware.
pub struct AuthState {
    /// Token verifier (shared secret, expected issuer/audience)
    pub verifier: TokenVerifier,
    /// Single-identity gate
    pub gate: IdentityGate,
    /// Paths that bypass bearer auth, matched exactly
    pub public_paths: Vec<String>,
}

impl AuthState {
    // Exact match only: a prefix match would let any route nested under a
    // public path skip auth.
    fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }
}

/// Extract the bearer token from the `Authorization` header.
fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
}

/// Bearer auth middleware.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if auth.is_public_path(&path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let Some(token) = bearer_token(&request) else {
        warn!(path = %path, "Missing Authorization header");
        return Error::MissingCredential.into_response();
    };

    let claims = match auth.verifier.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(path = %path, error = %e, "Token rejected");
            return e.into_response();
        }
    };

    // Gate re-check after verification; minting gated the same identity
    if let Err(e) = auth.gate.authorize(&claims.sub) {
        warn!(path = %path, "Verified token for an unauthorized identity");
        return e.into_response();
    }

    debug!(path = %path, "Authenticated request");
    request
        .extensions_mut()
        .insert(VerifiedIdentity(claims.sub));
    next.run(request).await
}
