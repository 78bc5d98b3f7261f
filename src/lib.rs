//! Chat Gateway Library
//!
//! Authenticated session gateway between a public web client and a backend
//! conversation store.
//!
//! # Features
//!
//! - **Bearer tokens**: short-lived HMAC-SHA256 JWTs minted from a verified
//!   web login, verifiable without shared session state
//! - **Single identity**: exactly one configured identity may mint tokens or
//!   touch session data; enforced at minting, after verification, and again
//!   at the store boundary
//! - **Temporal queries**: "yesterday", "last week" and friends resolve to
//!   concrete date ranges that filter stored sessions
//! - **Production plumbing**: CORS allow-list, per-client rate limiting,
//!   bounded store retries, graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod retry;
pub mod store;
pub mod temporal;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
