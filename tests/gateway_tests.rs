//! End-to-end router tests: auth, CORS, rate limiting, session CRUD and the
//! temporal chat flow, all against the in-memory store and a stub provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use chat_gateway::config::{AuthConfig, Config, CorsConfig, RateLimitConfig};
use chat_gateway::gateway::{LOGIN_IDENTITY_HEADER, build_router};
use chat_gateway::provider::CompletionProvider;
use chat_gateway::store::{MemoryStore, SessionStore};
use chat_gateway::{Error, Result};

const OWNER: &str = "owner@example.com";
const ORIGIN: &str = "https://app.example.com";

/// Provider stub that records every forwarded prompt and echoes a canned
/// reply.
struct StubProvider {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    reply: String,
}

impl StubProvider {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

fn test_config() -> Config {
    Config {
        auth: AuthConfig {
            secret: Some("0123456789abcdef0123456789abcdef".to_string()),
            authorized_identity: OWNER.to_string(),
            ..AuthConfig::default()
        },
        cors: CorsConfig {
            allowed_origins: vec![ORIGIN.to_string()],
            allow_wildcard: false,
        },
        rate_limit: RateLimitConfig {
            enabled: true,
            max_requests: 1000,
            window: std::time::Duration::from_secs(60),
        },
        ..Config::default()
    }
}

struct TestGateway {
    router: Router,
    store: Arc<MemoryStore>,
    provider: Arc<StubProvider>,
}

fn gateway_with(config: Config, reply: &str) -> TestGateway {
    let store = Arc::new(MemoryStore::new());
    let provider = StubProvider::new(reply);
    let router = build_router(
        &config,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        Arc::clone(&provider) as Arc<dyn CompletionProvider>,
    )
    .unwrap();
    TestGateway {
        router,
        store,
        provider,
    }
}

fn gateway() -> TestGateway {
    gateway_with(test_config(), "stub reply")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn mint_token(router: &Router) -> String {
    let response = router
        .clone()
        .oneshot(
            Request::post("/auth/token")
                .header(LOGIN_IDENTITY_HEADER, OWNER)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "bearer");
    body["token"].as_str().unwrap().to_string()
}

fn authed(token: &str, builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header(header::AUTHORIZATION, format!("Bearer {token}"))
}

#[tokio::test]
async fn health_is_public() {
    let gw = gateway();
    let response = gw
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_need_a_bearer_header() {
    let gw = gateway();
    let response = gw
        .router
        .oneshot(Request::get("/sessions/list").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("www-authenticate").unwrap(),
        "Bearer"
    );
}

#[tokio::test]
async fn garbage_tokens_are_forbidden_not_unauthorized() {
    let gw = gateway();
    let response = gw
        .router
        .oneshot(
            Request::get("/sessions/list")
                .header(header::AUTHORIZATION, "Bearer not.a.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn token_minting_requires_the_login_header() {
    let gw = gateway();
    let response = gw
        .router
        .clone()
        .oneshot(Request::post("/auth/token").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong identity in the header never gets a token
    let response = gw
        .router
        .oneshot(
            Request::post("/auth/token")
                .header(LOGIN_IDENTITY_HEADER, "intruder@example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn verified_token_for_another_subject_is_gated() {
    // Mint a structurally valid token for a different subject with the same
    // secret: signature verifies, the identity gate must still reject it.
    let gw = gateway();
    let secret = chat_gateway::auth::SharedSecret::new("0123456789abcdef0123456789abcdef").unwrap();
    let issuer = chat_gateway::auth::TokenIssuer::new(
        secret,
        "chat-gateway",
        "chat-backend",
        std::time::Duration::from_secs(600),
    );
    let foreign = issuer.issue("intruder@example.com").unwrap();

    let response = gw
        .router
        .oneshot(
            authed(&foreign, Request::get("/sessions/list"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_crud_round_trip() {
    let gw = gateway();
    let token = mint_token(&gw.router).await;

    // Create
    let response = gw
        .router
        .clone()
        .oneshot(
            authed(&token, Request::post("/sessions/create"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "firstMessage": "Plan my Lisbon trip" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session = body_json(response).await;
    let session_id = session["sessionId"].as_str().unwrap().to_string();
    assert_eq!(session["ownerIdentity"], OWNER);
    assert_eq!(session["messageCount"], 1);

    // Append
    let response = gw
        .router
        .clone()
        .oneshot(
            authed(&token, Request::post("/sessions/save-message"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "sessionId": session_id,
                        "role": "assistant",
                        "content": "Sounds fun!"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // List reflects the append
    let response = gw
        .router
        .clone()
        .oneshot(
            authed(&token, Request::get("/sessions/list"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["sessions"][0]["messageCount"], 2);
    assert_eq!(listed["sessions"][0]["lastMessage"], "Sounds fun!");

    // Messages in append order
    let response = gw
        .router
        .clone()
        .oneshot(
            authed(
                &token,
                Request::get(format!("/sessions/messages?sessionId={session_id}")),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    let messages = body_json(response).await;
    assert_eq!(messages["messages"].as_array().unwrap().len(), 2);
    assert_eq!(messages["messages"][0]["role"], "user");
    assert_eq!(messages["messages"][1]["role"], "assistant");

    // Delete, then reads are 404
    let response = gw
        .router
        .clone()
        .oneshot(
            authed(&token, Request::post("/sessions/delete"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "sessionId": session_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);

    let response = gw
        .router
        .oneshot(
            authed(
                &token,
                Request::get(format!("/sessions/messages?sessionId={session_id}")),
            )
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let gw = gateway();
    let token = mint_token(&gw.router).await;

    let response = gw
        .router
        .oneshot(
            authed(&token, Request::get("/sessions/messages?sessionId=nope"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "session_not_found");
}

#[tokio::test]
async fn temporal_chat_uses_yesterdays_history() {
    let gw = gateway_with(test_config(), "You planned a Lisbon trip.");
    let yesterday = Utc::now() - Duration::days(1);
    gw.store
        .create_session_at(OWNER, "Lisbon trip planning", yesterday);
    gw.store
        .create_session_at(OWNER, "Packing list for Lisbon", yesterday);
    // Out of range, must not reach the provider context
    gw.store
        .create_session_at(OWNER, "Quarterly budget review", Utc::now() - Duration::days(3));
    let token = mint_token(&gw.router).await;

    let response = gw
        .router
        .oneshot(
            authed(&token, Request::post("/chat"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "message": "What did we do yesterday?" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["reply"], "You planned a Lisbon trip.");
    assert_eq!(body["sessionsConsidered"], 2);
    assert_eq!(body["timeRange"]["description"], "yesterday");
    assert_eq!(gw.provider.calls(), 1);

    // The forwarded prompt names both of yesterday's session titles and
    // nothing from outside the range
    let prompts = gw.provider.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Lisbon trip planning"));
    assert!(prompts[0].contains("Packing list for Lisbon"));
    assert!(prompts[0].contains("yesterday"));
    assert!(!prompts[0].contains("Quarterly budget review"));
}

#[tokio::test]
async fn empty_history_short_circuits_without_the_provider() {
    let gw = gateway();
    let token = mint_token(&gw.router).await;

    let response = gw
        .router
        .oneshot(
            authed(&token, Request::post("/chat"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "message": "What did we do yesterday?" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["sessionsConsidered"], 0);
    assert!(
        body["reply"].as_str().unwrap().contains("yesterday"),
        "fixed no-history reply expected"
    );
    assert_eq!(gw.provider.calls(), 0, "provider must not be invoked");
}

#[tokio::test]
async fn non_temporal_chat_goes_straight_to_the_provider() {
    let gw = gateway_with(test_config(), "direct answer");
    let token = mint_token(&gw.router).await;

    let response = gw
        .router
        .oneshot(
            authed(&token, Request::post("/chat"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "message": "explain lifetimes" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["reply"], "direct answer");
    assert_eq!(body["sessionsConsidered"], 0);
    assert!(body.get("timeRange").is_none());
    assert_eq!(gw.provider.calls(), 1);
}

#[tokio::test]
async fn disallowed_origin_is_rejected_without_cors_headers() {
    let gw = gateway();
    let response = gw
        .router
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, "https://evil.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none(),
        "rejections must not carry CORS headers"
    );
}

#[tokio::test]
async fn allowed_origin_is_echoed_back() {
    let gw = gateway();
    let response = gw
        .router
        .oneshot(
            Request::get("/health")
                .header(header::ORIGIN, ORIGIN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        ORIGIN
    );
}

#[tokio::test]
async fn cors_rejection_happens_before_auth() {
    // A bad origin with no token yields 403 (origin), never 401 (auth)
    let gw = gateway();
    let response = gw
        .router
        .oneshot(
            Request::get("/sessions/list")
                .header(header::ORIGIN, "https://evil.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "origin_not_allowed");
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let gw = gateway_with(config, "unused");

    for _ in 0..2 {
        let response = gw
            .router
            .clone()
            .oneshot(
                Request::get("/health")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = gw
        .router
        .clone()
        .oneshot(
            Request::get("/health")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());

    // Another client is unaffected
    let response = gw
        .router
        .oneshot(
            Request::get("/health")
                .header("x-forwarded-for", "203.0.113.10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn startup_self_check_rejects_a_broken_secret_setup() {
    // resolve_secret fails when the referenced env var is unset; build_router
    // must refuse to start
    let mut config = test_config();
    config.auth.secret = Some("env:CHAT_GW_DEFINITELY_UNSET_VAR".to_string());

    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let provider: Arc<dyn CompletionProvider> = StubProvider::new("x");
    let result = build_router(&config, store, provider);
    assert!(matches!(result, Err(Error::Config(_))));
}
