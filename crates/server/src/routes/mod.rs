//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                    - Liveness
//! GET  /health/ready              - Readiness (pings the credential store)
//!
//! # Platform (webhook HMAC)
//! POST /webhooks                  - Webhook receiver, topic in X-Shopify-Topic
//!
//! # Storefront app proxy (proxy signature)
//! GET|POST /proxy, /proxy/{*path} - Relayed to the workflow engine
//!
//! # Backend (shared secret)
//! POST   /api/credentials         - Register or replace a tenant token
//! DELETE /api/credentials/{shop}  - Purge a tenant token
//!
//! # Embedded app (session token; jobs also accept the shared secret)
//! POST /api/jobs/{job}            - Relay a job to the workflow engine
//! GET  /api/shop                  - Shop record from the Admin API
//! ```
//!
//! Every route group is wrapped in its own verification layer; see
//! [`crate::auth::require`].

pub mod credentials;
pub mod health;
pub mod jobs;
pub mod proxy;
pub mod shop;
pub mod webhooks;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use shopgate_core::Protocol;

use crate::auth::{self, RouteGuard, RoutePolicy};
use crate::error_log;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(webhook_routes(&state))
        .merge(proxy_routes(&state))
        .merge(backend_routes(&state))
        .merge(app_routes(&state))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error_log::record_errors,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn guard(state: &AppState, policy: RoutePolicy) -> RouteGuard {
    RouteGuard::new(state.clone(), policy)
}

fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
}

fn webhook_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/webhooks", post(webhooks::receive))
        .route_layer(middleware::from_fn_with_state(
            guard(state, RoutePolicy::only(Protocol::WebhookHmac)),
            auth::require,
        ))
}

fn proxy_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/proxy", get(proxy::relay).post(proxy::relay))
        .route("/proxy/{*path}", get(proxy::relay).post(proxy::relay))
        .route_layer(middleware::from_fn_with_state(
            guard(state, RoutePolicy::only(Protocol::ProxySignature)),
            auth::require,
        ))
}

fn backend_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/credentials", post(credentials::register))
        .route("/api/credentials/{shop}", delete(credentials::purge))
        .route_layer(middleware::from_fn_with_state(
            guard(state, RoutePolicy::only(Protocol::SharedSecret)),
            auth::require,
        ))
}

fn app_routes(state: &AppState) -> Router<AppState> {
    let jobs = Router::new()
        .route("/api/jobs/{job}", post(jobs::relay))
        .route_layer(middleware::from_fn_with_state(
            guard(
                state,
                RoutePolicy::any_of(&[Protocol::SessionToken, Protocol::SharedSecret]),
            ),
            auth::require,
        ));

    let shop = Router::new()
        .route("/api/shop", get(shop::show))
        .route_layer(middleware::from_fn_with_state(
            guard(state, RoutePolicy::only(Protocol::SessionToken)),
            auth::require,
        ));

    jobs.merge(shop)
}
