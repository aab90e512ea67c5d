//! Integration tests for Shopgate.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopgate-integration-tests
//! ```
//!
//! The full router runs in-process against in-memory stores and a fake
//! workflow engine bound to a local port, so no database is needed.
//!
//! # Test Categories
//!
//! - `proxy` - App proxy signature and relay
//! - `webhooks` - Webhook HMAC over raw bodies, uninstall purge
//! - `credentials` - Registration, encryption at rest, purge
//! - `jobs` - Session token and shared secret relay, feature flag gate
//! - `surface` - Health, request ids, configuration errors, error log

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    routing::post,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use secrecy::SecretString;
use shopgate_server::auth::session_token::{Audience, SessionClaims};
use shopgate_server::auth::{SigningSecrets, Verifier, proxy, webhook};
use shopgate_server::error_log::{ErrorLog, ErrorLogEntry, MemoryErrorSink};
use shopgate_server::flags::{FeatureFlags, StaticFlagSource};
use shopgate_server::relay::{CORRELATION_ID_HEADER, SHOP_DOMAIN_HEADER, WorkflowClient};
use shopgate_server::shopify::AdminApiClient;
use shopgate_server::state::AppState;
use shopgate_server::vault::{CredentialVault, MemoryCredentialStore, VaultCipher, VaultKey};
use tower::ServiceExt;
use url::Url;

pub const PROXY_SECRET: &str = "it-proxy-secret-7f3a";
pub const WEBHOOK_SECRET: &str = "it-webhook-secret-91bc";
pub const SESSION_KEY: &str = "it-session-key-2d8e";
pub const API_KEY: &str = "it-api-key";
pub const BACKEND_SECRET: &str = "it-backend-secret-c4e1";

/// Every secret configured.
#[must_use]
pub fn full_secrets() -> SigningSecrets {
    SigningSecrets {
        proxy: vec![SecretString::from(PROXY_SECRET)],
        webhook: vec![SecretString::from(WEBHOOK_SECRET)],
        session_key: Some(SecretString::from(SESSION_KEY)),
        api_key: Some(API_KEY.to_string()),
        backend: Some(SecretString::from(BACKEND_SECRET)),
        session_token_leeway_secs: 0,
        allow_unsigned: false,
    }
}

// =============================================================================
// Fake workflow engine
// =============================================================================

/// A job as the workflow engine received it.
#[derive(Debug, Clone)]
pub struct RelayedJob {
    pub job: String,
    pub shop: Option<String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Records every job posted to it and answers `{"accepted":true}`.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    jobs: Arc<Mutex<Vec<RelayedJob>>>,
}

impl FakeEngine {
    /// Jobs received so far.
    #[must_use]
    pub fn jobs(&self) -> Vec<RelayedJob> {
        self.jobs.lock().clone()
    }

    async fn spawn(&self) -> Url {
        let router = Router::new()
            .route("/webhook/{job}", post(receive_job))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }
}

async fn receive_job(
    State(engine): State<FakeEngine>,
    Path(job): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, [(&'static str, &'static str); 1], &'static str) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    engine.jobs.lock().push(RelayedJob {
        job,
        shop: header(SHOP_DOMAIN_HEADER),
        correlation_id: header(CORRELATION_ID_HEADER),
        content_type: header("content-type"),
        body,
    });
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"accepted":true}"#,
    )
}

// =============================================================================
// Test application
// =============================================================================

/// The router plus handles on everything behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryCredentialStore,
    pub errors: MemoryErrorSink,
    pub engine: FakeEngine,
}

/// Builder for [`TestApp`].
pub struct TestAppBuilder {
    secrets: SigningSecrets,
    flags: Vec<(String, bool)>,
}

impl TestAppBuilder {
    /// Replace the signing secrets.
    #[must_use]
    pub fn secrets(mut self, secrets: SigningSecrets) -> Self {
        self.secrets = secrets;
        self
    }

    /// Set a feature flag.
    #[must_use]
    pub fn flag(mut self, key: &str, enabled: bool) -> Self {
        self.flags.push((key.to_string(), enabled));
        self
    }

    /// Start the fake engine and build the router.
    pub async fn spawn(self) -> TestApp {
        let engine = FakeEngine::default();
        let engine_url = engine.spawn().await;

        let store = MemoryCredentialStore::new();
        let errors = MemoryErrorSink::new();
        let timeout = Duration::from_secs(2);

        let cipher = VaultCipher::new(&VaultKey::generate().unwrap()).unwrap();
        let state = AppState::new(
            Verifier::new(self.secrets),
            CredentialVault::new(cipher, Arc::new(store.clone()), timeout),
            FeatureFlags::new(
                Arc::new(StaticFlagSource::new(self.flags)),
                Duration::from_secs(60),
                timeout,
            ),
            ErrorLog::new(Arc::new(errors.clone()), timeout),
            WorkflowClient::new(engine_url, timeout).unwrap(),
            AdminApiClient::new("2025-01", timeout).unwrap(),
        );

        TestApp {
            router: shopgate_server::routes::router(state.clone()),
            state,
            store,
            errors,
            engine,
        }
    }
}

/// A buffered response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// The body as JSON.
    #[must_use]
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// A response header as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    /// App with every secret configured.
    pub async fn spawn() -> Self {
        Self::builder().spawn().await
    }

    /// Start configuring an app.
    #[must_use]
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            secrets: full_secrets(),
            flags: Vec::new(),
        }
    }

    /// Drive one request through the router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Wait for the background error log writes to land.
    pub async fn error_entries(&self, expected: usize) -> Vec<ErrorLogEntry> {
        for _ in 0..100 {
            let entries = self.errors.entries();
            if entries.len() >= expected {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.errors.entries()
    }
}

// =============================================================================
// Signing helpers
// =============================================================================

/// `path` with `params` and a valid proxy `signature` appended.
#[must_use]
pub fn signed_proxy_uri(path: &str, params: &[(&str, &str)]) -> String {
    let signature = proxy::sign(
        PROXY_SECRET.as_bytes(),
        &proxy::proxy_message(params.iter().copied()),
    );
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .append_pair("signature", &signature)
        .finish();
    format!("{path}?{query}")
}

/// Webhook HMAC header value for `body`.
#[must_use]
pub fn webhook_signature(body: &[u8]) -> String {
    webhook::sign(WEBHOOK_SECRET.as_bytes(), body)
}

/// Session token claims for `shop` valid around `now`.
#[must_use]
pub fn session_claims(shop: &str, now: DateTime<Utc>) -> SessionClaims {
    SessionClaims {
        iss: Some(format!("https://{shop}/admin")),
        dest: format!("https://{shop}"),
        aud: Audience::One(API_KEY.to_string()),
        sub: Some("1".to_string()),
        exp: Some(now.timestamp() + 60),
        nbf: Some(now.timestamp() - 5),
        iat: Some(now.timestamp() - 5),
        jti: Some("it-jti".to_string()),
        sid: None,
    }
}

/// Sign `claims` with `key`.
#[must_use]
pub fn sign_claims(claims: &SessionClaims, key: &str) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )
    .unwrap()
}

/// A valid session token for `shop`.
#[must_use]
pub fn session_token(shop: &str) -> String {
    sign_claims(&session_claims(shop, Utc::now()), SESSION_KEY)
}
