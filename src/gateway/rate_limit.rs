//! Per-client rate limiting.
//!
//! GCRA limiters from `governor`, one per client key, held in a `DashMap`
//! and created lazily on first sight of a key. Clients are keyed by the
//! first `X-Forwarded-For` hop when present, else the peer address.
//! Counters live in process memory: limits are approximate across replicas
//! and reset on restart. A rejected request performs no store or provider
//! work.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use tracing::warn;

use crate::Error;
use crate::config::RateLimitConfig;

type ClientRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter registry shared across requests.
pub struct ClientLimits {
    enabled: bool,
    quota: Quota,
    window: Duration,
    limiters: DashMap<String, Arc<ClientRateLimiter>>,
}

impl ClientLimits {
    /// Build the registry from config.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the limiter is enabled with a zero
    /// request budget (also caught by `Config::validate`).
    pub fn from_config(config: &RateLimitConfig) -> crate::Result<Self> {
        let max_requests = NonZeroU32::new(config.max_requests).ok_or_else(|| {
            Error::Config("rate_limit.max_requests must be greater than zero".to_string())
        })?;
        // Replenish one cell per window/max_requests with a full-window burst,
        // so a client gets max_requests per window
        let period = config
            .window
            .checked_div(config.max_requests)
            .unwrap_or(Duration::from_secs(1))
            .max(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .ok_or_else(|| Error::Config("rate_limit.window must be non-zero".to_string()))?
            .allow_burst(max_requests);
        Ok(Self {
            enabled: config.enabled,
            quota,
            window: config.window,
            limiters: DashMap::new(),
        })
    }

    /// Check the budget for a client key, creating its limiter on first use.
    #[must_use]
    pub fn check(&self, client_key: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let limiter = self
            .limiters
            .entry(client_key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();
        limiter.check().is_ok()
    }

    /// Retry-After hint, in whole seconds.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

/// Derive the client key from the request: first `X-Forwarded-For` hop,
/// else the peer address recorded by `into_make_service_with_connect_info`.
fn client_key(request: &Request<Body>) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

/// Rate limiting middleware. Runs after CORS and before auth.
pub async fn rate_limit_middleware(
    State(limits): State<Arc<ClientLimits>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);
    if !limits.check(&key) {
        warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
        return Error::RateLimited {
            retry_after_secs: limits.retry_after_secs(),
        }
        .into_response();
    }
    next.run(request).await
}
