//! axum integration for request verification.
//!
//! ```rust,ignore
//! let guard = RouteGuard::new(state.clone(), RoutePolicy::only(Protocol::SessionToken));
//! Router::new()
//!     .route("/api/shop", get(shop::show))
//!     .route_layer(middleware::from_fn_with_state(guard, auth::require))
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use shopgate_core::{ShopDomain, TenantIdentity};
use tracing::warn;

use super::{InboundRequest, RoutePolicy, VerifiedRequest};
use crate::error::AppError;
use crate::state::AppState;
use crate::tenant;

/// Largest request body buffered for verification.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// State for the verification middleware of one group of routes.
#[derive(Clone)]
pub struct RouteGuard {
    state: AppState,
    policy: Arc<RoutePolicy>,
}

impl RouteGuard {
    /// Guard routes with `policy`.
    #[must_use]
    pub fn new(state: AppState, policy: RoutePolicy) -> Self {
        Self {
            state,
            policy: Arc::new(policy),
        }
    }
}

/// Verify the request under the route's policy before running the handler.
///
/// The raw body is buffered once; the verifier and the handler see the same
/// bytes. On success the [`VerifiedRequest`] is placed in request extensions.
/// The response is tagged with the tenant (verified, or merely claimed when
/// verification failed) for the error log.
pub async fn require(State(guard): State<RouteGuard>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %parts.uri.path(), error = %e, "request body rejected");
            return AppError::PayloadTooLarge.into_response();
        }
    };

    let inbound = InboundRequest::from_parts(&parts, bytes.clone());
    let outcome = guard
        .state
        .verifier()
        .verify(&guard.policy, &inbound, Utc::now());

    let shop: Option<ShopDomain> = outcome
        .tenant
        .as_ref()
        .map(|t| t.shop.clone())
        .or_else(|| tenant::from_request(&inbound));

    let mut response = match outcome.into_result() {
        Ok(verified) => {
            let mut request = Request::from_parts(parts, Body::from(bytes));
            request.extensions_mut().insert(verified);
            next.run(request).await
        }
        Err(failure) => {
            warn!(
                path = %inbound.path,
                shop = shop.as_ref().map(ShopDomain::as_str),
                %failure,
                "request verification failed"
            );
            AppError::from(failure).into_response()
        }
    };

    if let Some(shop) = shop {
        response.extensions_mut().insert(shop);
    }
    response
}

/// Extractor for the verification result of a guarded route.
///
/// Fails with a 500 if the route was registered without a [`RouteGuard`].
#[derive(Debug, Clone)]
pub struct Verified(pub VerifiedRequest);

impl Verified {
    /// The verified tenant, or an error if the request did not identify one.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MalformedInput`] when no shop was identified.
    pub fn tenant(&self) -> Result<&TenantIdentity, AppError> {
        self.0
            .tenant
            .as_ref()
            .ok_or_else(|| AppError::MalformedInput("request does not identify a shop".to_string()))
    }
}

impl<S> FromRequestParts<S> for Verified
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedRequest>()
            .cloned()
            .map(Self)
            .ok_or_else(|| AppError::Internal("route has no verification layer".to_string()))
    }
}
