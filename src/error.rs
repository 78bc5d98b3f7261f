//! Error types for the session gateway.
//!
//! Every rejection carries a named kind so the router can pick the right
//! HTTP status without string-matching messages. Ownership mismatches are
//! deliberately rendered with the same body as "not found" so a caller can
//! never probe whether a session exists under someone else's identity.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (startup-time, fatal)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No `Authorization: Bearer` header on a protected route
    #[error("Missing bearer credential")]
    MissingCredential,

    /// Token does not have the three-part signed structure
    #[error("Malformed token")]
    MalformedToken,

    /// Token signature does not match the shared secret
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Token is well-formed and signed but carries wrong claims
    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),

    /// Token expiry is in the past
    #[error("Token expired")]
    Expired,

    /// Valid token, but the subject is not the one authorized identity
    #[error("Identity not authorized: {0}")]
    UnauthorizedUser(String),

    /// Request origin is not in the CORS allow-list
    #[error("Origin not allowed: {0}")]
    OriginNotAllowed(String),

    /// Per-client rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited {
        /// Hint for the Retry-After header, in seconds
        retry_after_secs: u64,
    },

    /// Session does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but belongs to a different identity.
    /// Rendered identically to [`Error::SessionNotFound`] on the wire.
    #[error("Session ownership mismatch: {0}")]
    OwnershipMismatch(String),

    /// Backing store call exceeded its timeout (retryable)
    #[error("Store timeout: {0}")]
    StoreTimeout(String),

    /// Backing store unreachable or returned a server error (retryable)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Completion provider call failed after session work succeeded
    #[error("Completion provider failure: {0}")]
    Provider(String),

    /// Malformed request payload
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code for this error kind
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredential => StatusCode::UNAUTHORIZED,
            Self::MalformedToken
            | Self::InvalidSignature
            | Self::InvalidClaims(_)
            | Self::Expired
            | Self::UnauthorizedUser(_)
            | Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            // OwnershipMismatch maps to 404 on purpose: existence must not leak
            Self::SessionNotFound(_) | Self::OwnershipMismatch(_) => StatusCode::NOT_FOUND,
            Self::StoreUnavailable(_) | Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::StoreTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::InvalidRequest(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether a failed operation may be retried locally.
    ///
    /// Auth and authorization failures are deterministic and never retried;
    /// only store-side transport failures qualify.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreTimeout(_) | Self::StoreUnavailable(_))
    }

    /// Wire-facing error label. Ownership mismatches share the not-found
    /// label so the response body is byte-identical for both kinds.
    #[must_use]
    pub fn public_kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration_error",
            Self::MissingCredential => "missing_credential",
            Self::MalformedToken => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidClaims(_) => "invalid_claims",
            Self::Expired => "token_expired",
            Self::UnauthorizedUser(_) => "unauthorized_user",
            Self::OriginNotAllowed(_) => "origin_not_allowed",
            Self::RateLimited { .. } => "rate_limited",
            Self::SessionNotFound(_) | Self::OwnershipMismatch(_) => "session_not_found",
            Self::StoreTimeout(_) => "store_timeout",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Provider(_) => "provider_failure",
            Self::InvalidRequest(_) | Self::Json(_) => "invalid_request",
            Self::Io(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Wire-facing message. Internal detail (session ids, store addresses)
    /// stays in logs; the body carries only the generic phrasing.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::MissingCredential => {
                "Missing Authorization header. Use: Authorization: Bearer <token>".to_string()
            }
            Self::SessionNotFound(_) | Self::OwnershipMismatch(_) => {
                "Session not found".to_string()
            }
            Self::RateLimited { retry_after_secs } => {
                format!("Rate limit exceeded. Retry after {retry_after_secs}s")
            }
            Self::OriginNotAllowed(_) => "Origin not allowed".to_string(),
            Self::Io(_) | Self::Internal(_) | Self::Config(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.public_kind(),
            "message": self.public_message(),
        }));

        match self {
            Self::MissingCredential => {
                (status, [("WWW-Authenticate", "Bearer")], body).into_response()
            }
            Self::RateLimited { retry_after_secs } => (
                status,
                [("Retry-After", retry_after_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}
