//! CORS origin enforcement.
//!
//! Origins are matched exactly against a static allow-list resolved at
//! startup. This runs before rate limiting and auth: a disallowed origin is
//! rejected with 403 and the response carries no CORS headers, so the
//! browser cannot read it either. Requests without an `Origin` header
//! (curl, server-to-server) pass through untouched.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::Error;
use crate::config::CorsConfig;

/// Resolved CORS policy (allow-list fixed for the process lifetime).
#[derive(Debug)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allow_wildcard: bool,
}

impl CorsPolicy {
    /// Build a policy from config. `Config::validate` has already rejected
    /// wildcard entries outside development mode.
    #[must_use]
    pub fn from_config(config: &CorsConfig) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            allow_wildcard: config.allow_wildcard,
        }
    }

    /// Exact-match check against the allow-list.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.allow_wildcard && self.allowed_origins.iter().any(|o| o == "*") {
            return true;
        }
        self.allowed_origins.iter().any(|o| o == origin)
    }
}

/// CORS middleware. Outermost request-path layer.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let Some(origin) = origin else {
        // Non-browser caller; CORS does not apply
        return next.run(request).await;
    };

    if !policy.is_allowed(&origin) {
        warn!(origin = %origin, path = %request.uri().path(), "Origin not allowed");
        // No Access-Control-* headers on the rejection
        return Error::OriginNotAllowed(origin).into_response();
    }

    // Preflight never reaches auth or handlers
    if request.method() == Method::OPTIONS {
        debug!(origin = %origin, "CORS preflight");
        return preflight_response(&origin);
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), &origin);
    response
}

fn preflight_response(origin: &str) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_cors_headers(response.headers_mut(), origin);
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, content-type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("600"),
    );
    response
}

fn apply_cors_headers(headers: &mut axum::http::HeaderMap, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}
