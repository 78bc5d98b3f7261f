//! HTTP gateway: middleware stack, routes, and the server loop.
//!
//! Request-path order is fixed and load-bearing: CORS rejection happens
//! before any auth work, rate limiting before token verification, and the
//! identity gate after verification. Rejected requests have no side effects.

pub mod auth;
pub mod chat;
pub mod cors;
pub mod rate_limit;
pub mod router;
pub mod server;

pub use router::{AppState, LOGIN_IDENTITY_HEADER, create_router};
pub use server::{Gateway, build_router};
