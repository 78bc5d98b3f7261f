//! Gateway server: startup checks, listener, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tracing::info;

use super::auth::AuthState;
use super::cors::CorsPolicy;
use super::rate_limit::ClientLimits;
use super::router::{AppState, create_router};
use crate::auth::{IdentityGate, SharedSecret, TokenIssuer, TokenVerifier};
use crate::config::Config;
use crate::provider::{CompletionProvider, HttpCompletionProvider};
use crate::store::SessionStore;
use crate::{Error, Result, store};

/// The gateway server.
pub struct Gateway {
    config: Config,
}

impl Gateway {
    /// Create a gateway from validated-or-not configuration; `run` and
    /// `check` validate before doing anything else.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Validate config and run the startup self-check without serving.
    /// Backs the `check` subcommand.
    pub fn check(&self) -> Result<()> {
        self.config.validate()?;
        let (issuer, verifier, gate) = auth_components(&self.config)?;
        startup_self_check(&issuer, &verifier, &gate)?;
        info!("Configuration and token round-trip OK");
        Ok(())
    }

    /// Run the server until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let store = store::from_config(&self.config)?;
        let provider: Arc<dyn CompletionProvider> =
            Arc::new(HttpCompletionProvider::from_config(&self.config.provider)?);
        let app = build_router(&self.config, store, provider)?;

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr = %addr, "Gateway listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

fn auth_components(config: &Config) -> Result<(TokenIssuer, TokenVerifier, IdentityGate)> {
    let secret = SharedSecret::new(config.auth.resolve_secret()?)?;
    let issuer = TokenIssuer::new(
        secret.clone(),
        &config.auth.issuer,
        &config.auth.audience,
        config.auth.token_ttl,
    );
    let verifier = TokenVerifier::new(secret, &config.auth.issuer, &config.auth.audience);
    let gate = IdentityGate::new(&config.auth.authorized_identity);
    Ok((issuer, verifier, gate))
}

/// Issue→verify round trip at startup. A secret or claim mismatch between
/// the issuing and verifying sides aborts startup instead of rejecting
/// every request at runtime.
fn startup_self_check(
    issuer: &TokenIssuer,
    verifier: &TokenVerifier,
    gate: &IdentityGate,
) -> Result<()> {
    let token = issuer.issue(gate.authorized_identity())?;
    let claims = verifier
        .verify(&token)
        .map_err(|e| Error::Config(format!("token self-check failed: {e}")))?;
    gate.authorize(&claims.sub)
        .map_err(|e| Error::Config(format!("token self-check failed: {e}")))?;
    Ok(())
}

/// Build the full router from config with injected store and provider.
/// Also the seam integration tests use to serve against in-memory stubs.
pub fn build_router(
    config: &Config,
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn CompletionProvider>,
) -> Result<Router> {
    let (issuer, verifier, gate) = auth_components(config)?;
    startup_self_check(&issuer, &verifier, &gate)?;

    let auth_state = Arc::new(AuthState {
        verifier,
        gate: gate.clone(),
        public_paths: config.auth.public_paths.clone(),
    });
    let cors = Arc::new(CorsPolicy::from_config(&config.cors));
    let limits = Arc::new(ClientLimits::from_config(&config.rate_limit)?);

    let state = AppState {
        store,
        provider,
        issuer,
        gate,
    };

    Ok(create_router(
        state,
        auth_state,
        cors,
        limits,
        &config.server,
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
