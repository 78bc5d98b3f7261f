//! HTTP routes and handlers.
//!
//! Middleware order on the request path is fixed: CORS, then rate limiting,
//! then bearer auth, then the handler. Layers are registered innermost-first
//! below, so the auth layer is added before the CORS layer.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use super::auth::{AuthState, VerifiedIdentity, auth_middleware};
use super::chat::{self, ChatRequest};
use super::cors::{CorsPolicy, cors_middleware};
use super::rate_limit::{ClientLimits, rate_limit_middleware};
use crate::config::ServerConfig;
use crate::provider::CompletionProvider;
use crate::store::{MessageRole, SessionFilter, SessionStore};
use crate::{Error, Result, auth};

/// Header the front login proxy uses to convey the authenticated identity.
/// The token route trusts this header and nothing in the body or query.
pub const LOGIN_IDENTITY_HEADER: &str = "x-login-identity";

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session store adapter
    pub store: Arc<dyn SessionStore>,
    /// Completion provider
    pub provider: Arc<dyn CompletionProvider>,
    /// Token issuer for `/auth/token`
    pub issuer: auth::TokenIssuer,
    /// Identity gate, applied at minting (the middleware re-applies it
    /// after verification)
    pub gate: auth::IdentityGate,
}

/// Build the router with the full middleware stack.
pub fn create_router(
    state: AppState,
    auth_state: Arc<AuthState>,
    cors: Arc<CorsPolicy>,
    limits: Arc<ClientLimits>,
    server: &ServerConfig,
) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/token", post(issue_token))
        .route("/sessions/create", post(create_session))
        .route("/sessions/list", get(list_sessions))
        .route("/sessions/messages", get(get_messages))
        .route("/sessions/save-message", post(save_message))
        .route("/sessions/delete", post(delete_session))
        .route("/chat", post(chat_handler))
        .with_state(state)
        // Innermost first: auth runs last on the request path
        .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
        .layer(middleware::from_fn_with_state(
            limits,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(cors, cors_middleware))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(server.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(server.max_body_size))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Exchange a verified web login for a bearer token.
///
/// The identity comes from [`LOGIN_IDENTITY_HEADER`], set by the trusted
/// front login proxy after its own authentication. The gate runs before
/// minting; an unauthorized identity never receives a token.
async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let identity = headers
        .get(LOGIN_IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or(Error::MissingCredential)?;

    state.gate.authorize(identity)?;
    let token = state.issuer.issue(&auth::normalize(identity))?;

    info!("Issued bearer token");
    // Field names follow the OAuth 2.0 token response shape
    Ok(Json(json!({
        "token": token,
        "token_type": "bearer",
        "expires_in": state.issuer.ttl().as_secs(),
    })))
}

// Request bodies and query strings use the same camelCase field names as the
// response types in `store::model`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    first_message: String,
}

async fn create_session(
    State(state): State<AppState>,
    Extension(VerifiedIdentity(identity)): Extension<VerifiedIdentity>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse> {
    if body.first_message.trim().is_empty() {
        return Err(Error::InvalidRequest(
            "firstMessage must not be empty".to_string(),
        ));
    }
    let session = state
        .store
        .create_session(&identity, &body.first_message)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Extension(VerifiedIdentity(identity)): Extension<VerifiedIdentity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>> {
    let filter = SessionFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        limit: query.limit,
        ..SessionFilter::default()
    };
    let sessions = state.store.list_sessions(&identity, &filter).await?;
    Ok(Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesQuery {
    session_id: String,
}

async fn get_messages(
    State(state): State<AppState>,
    Extension(VerifiedIdentity(identity)): Extension<VerifiedIdentity>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<serde_json::Value>> {
    let messages = state
        .store
        .get_messages(&identity, &query.session_id)
        .await?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveMessageRequest {
    session_id: String,
    role: MessageRole,
    content: String,
}

async fn save_message(
    State(state): State<AppState>,
    Extension(VerifiedIdentity(identity)): Extension<VerifiedIdentity>,
    Json(body): Json<SaveMessageRequest>,
) -> Result<impl IntoResponse> {
    let message = state
        .store
        .append_message(&identity, &body.session_id, body.role, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteSessionRequest {
    session_id: String,
}

async fn delete_session(
    State(state): State<AppState>,
    Extension(VerifiedIdentity(identity)): Extension<VerifiedIdentity>,
    Json(body): Json<DeleteSessionRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .store
        .delete_session(&identity, &body.session_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn chat_handler(
    State(state): State<AppState>,
    Extension(VerifiedIdentity(identity)): Extension<VerifiedIdentity>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<chat::ChatResponse>> {
    if body.message.trim().is_empty() {
        return Err(Error::InvalidRequest("message must not be empty".to_string()));
    }
    let response = chat::respond(
        &state.store,
        &state.provider,
        &identity,
        &body.message,
        Utc::now(),
    )
    .await?;
    Ok(Json(response))
}
