//! Inbound request verification.
//!
//! Every request reaching a protected route is verified under the trust
//! protocols its route declares:
//!
//! - [`Protocol::ProxySignature`] - app proxy requests signed over the query string
//! - [`Protocol::WebhookHmac`] - webhooks signed over the raw body
//! - [`Protocol::SessionToken`] - embedded-app session tokens (HS256 JWT)
//! - [`Protocol::SharedSecret`] - backend-to-backend shared secret header
//!
//! A route succeeds if any of its protocols passes. Missing secret material
//! fails closed with [`AuthFailure::Configuration`]; signature mismatches are
//! [`AuthFailure::Unauthorized`]. Neither panics nor short-circuits on the
//! first differing byte.
//!
//! # Flow
//!
//! 1. [`require`] buffers the raw body exactly once
//! 2. [`Verifier::verify`] runs the declared protocols against the bytes
//! 3. On success the handler receives the identical bytes plus a [`VerifiedRequest`]

pub mod compare;
pub mod layer;
pub mod proxy;
pub mod session_token;
pub mod shared_secret;
pub mod webhook;

use axum::http::{HeaderMap, Method, request::Parts};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use shopgate_core::{Protocol, TenantIdentity};
use thiserror::Error;
use tracing::{error, warn};

use crate::tenant;

pub use layer::{MAX_BODY_BYTES, RouteGuard, Verified, require};

/// Result of checking a single protocol: the tenant it vouches for, or a rejection reason.
type CheckResult = Result<Option<TenantIdentity>, String>;

// =============================================================================
// Secrets
// =============================================================================

/// Secret material for every trust protocol, loaded once at startup.
///
/// Several candidates may be configured per protocol (rotation, or
/// public/confidential secret pairs); success under any one is acceptance.
#[derive(Debug, Clone, Default)]
pub struct SigningSecrets {
    /// App proxy signing secrets.
    pub proxy: Vec<SecretString>,
    /// Webhook signing secrets.
    pub webhook: Vec<SecretString>,
    /// Session token HS256 key.
    pub session_key: Option<SecretString>,
    /// App public API key, the required session token audience.
    pub api_key: Option<String>,
    /// Backend shared secret.
    pub backend: Option<SecretString>,
    /// Clock skew tolerated on session token `exp`/`nbf`.
    pub session_token_leeway_secs: i64,
    /// Accept requests on routes whose secrets are all unset (local development only).
    pub allow_unsigned: bool,
}

impl SigningSecrets {
    /// Whether the secret material `protocol` needs is configured.
    #[must_use]
    pub fn has_material(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::ProxySignature => !self.proxy.is_empty(),
            Protocol::WebhookHmac => !self.webhook.is_empty(),
            Protocol::SessionToken => self.session_key.is_some() && self.api_key.is_some(),
            Protocol::SharedSecret => self.backend.is_some(),
        }
    }

    /// Whether any secret a protocol could use is set, even partially.
    fn has_any_material(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::SessionToken => self.session_key.is_some() || self.api_key.is_some(),
            other => self.has_material(other),
        }
    }
}

// =============================================================================
// Route policy
// =============================================================================

/// The set of protocols a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    protocols: Vec<Protocol>,
}

impl RoutePolicy {
    /// Accept exactly one protocol.
    #[must_use]
    pub fn only(protocol: Protocol) -> Self {
        Self {
            protocols: vec![protocol],
        }
    }

    /// Accept any of the given protocols, tried in the order given.
    #[must_use]
    pub fn any_of(protocols: &[Protocol]) -> Self {
        let mut deduped = Vec::with_capacity(protocols.len());
        for protocol in protocols {
            if !deduped.contains(protocol) {
                deduped.push(*protocol);
            }
        }
        Self { protocols: deduped }
    }

    /// Protocols accepted by the route.
    #[must_use]
    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }
}

// =============================================================================
// Request
// =============================================================================

/// The parts of an inbound request verification looks at.
///
/// `body` holds the exact bytes received on the wire. It is never a
/// re-serialization of a parsed body.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// Build from request parts and the buffered raw body.
    #[must_use]
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_owned(),
            query: parts.uri.query().map(str::to_owned),
            headers: parts.headers.clone(),
            body,
        }
    }

    /// Get a header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query parameters in their original order, duplicates included.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Why a request was refused.
///
/// The reason strings are for operator logs only; they never reach a response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// Every declared protocol's check failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A declared protocol has no secret material configured.
    #[error("verification misconfigured: {0}")]
    Configuration(String),
}

/// Verification facts handed to the route handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRequest {
    /// The protocol that passed; `None` only in insecure dev mode.
    pub protocol: Option<Protocol>,
    /// The tenant the request speaks for, if it identifies one.
    pub tenant: Option<TenantIdentity>,
    /// The request was let through without any signature check.
    pub insecure_dev_mode: bool,
}

/// The outcome of verifying one request. Scoped to that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub protocol: Option<Protocol>,
    pub tenant: Option<TenantIdentity>,
    pub failure: Option<AuthFailure>,
    pub insecure_dev_mode: bool,
}

impl VerificationOutcome {
    fn passed(protocol: Protocol, tenant: Option<TenantIdentity>) -> Self {
        Self {
            verified: true,
            protocol: Some(protocol),
            tenant,
            failure: None,
            insecure_dev_mode: false,
        }
    }

    fn insecure(tenant: Option<TenantIdentity>) -> Self {
        Self {
            verified: true,
            protocol: None,
            tenant,
            failure: None,
            insecure_dev_mode: true,
        }
    }

    fn failed(failure: AuthFailure) -> Self {
        Self {
            verified: false,
            protocol: None,
            tenant: None,
            failure: Some(failure),
            insecure_dev_mode: false,
        }
    }

    /// Convert into a `Result` for `?`-style handling.
    ///
    /// # Errors
    ///
    /// Returns the recorded [`AuthFailure`] when the request was not verified.
    pub fn into_result(self) -> Result<VerifiedRequest, AuthFailure> {
        if self.verified {
            Ok(VerifiedRequest {
                protocol: self.protocol,
                tenant: self.tenant,
                insecure_dev_mode: self.insecure_dev_mode,
            })
        } else {
            Err(self
                .failure
                .unwrap_or_else(|| AuthFailure::Unauthorized("not verified".to_string())))
        }
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// Verifies inbound requests against the configured signing secrets.
///
/// Verification is a pure function of the request bytes, the secrets and
/// the supplied clock.
#[derive(Debug, Clone)]
pub struct Verifier {
    secrets: SigningSecrets,
}

impl Verifier {
    /// Create a verifier over the given secrets.
    #[must_use]
    pub const fn new(secrets: SigningSecrets) -> Self {
        Self { secrets }
    }

    /// The secrets this verifier checks against.
    #[must_use]
    pub const fn secrets(&self) -> &SigningSecrets {
        &self.secrets
    }

    /// Verify `request` under the protocols `policy` declares.
    #[must_use]
    pub fn verify(
        &self,
        policy: &RoutePolicy,
        request: &InboundRequest,
        now: DateTime<Utc>,
    ) -> VerificationOutcome {
        if policy.protocols().is_empty() {
            error!(path = %request.path, "route declares no verification protocol");
            return VerificationOutcome::failed(AuthFailure::Configuration(
                "route declares no protocol".to_string(),
            ));
        }

        let all_unset = policy
            .protocols()
            .iter()
            .all(|p| !self.secrets.has_any_material(*p));

        if all_unset && self.secrets.allow_unsigned {
            warn!(
                mode = "insecure-dev",
                path = %request.path,
                "no signing secrets configured for route; accepting unsigned request"
            );
            return VerificationOutcome::insecure(
                tenant::from_request(request).map(TenantIdentity::new),
            );
        }

        let mut unauthorized = Vec::new();
        let mut misconfigured = Vec::new();

        for &protocol in policy.protocols() {
            if !self.secrets.has_material(protocol) {
                misconfigured.push(protocol.as_str());
                continue;
            }

            match self.check(protocol, request, now) {
                Ok(tenant) => return VerificationOutcome::passed(protocol, tenant),
                Err(reason) => unauthorized.push(format!("{protocol}: {reason}")),
            }
        }

        if misconfigured.is_empty() {
            VerificationOutcome::failed(AuthFailure::Unauthorized(unauthorized.join("; ")))
        } else {
            let reason = format!("no secret configured for {}", misconfigured.join(", "));
            error!(path = %request.path, %reason, "request verification misconfigured");
            VerificationOutcome::failed(AuthFailure::Configuration(reason))
        }
    }

    fn check(&self, protocol: Protocol, request: &InboundRequest, now: DateTime<Utc>) -> CheckResult {
        match protocol {
            Protocol::ProxySignature => proxy::verify(&self.secrets.proxy, request),
            Protocol::WebhookHmac => webhook::verify(&self.secrets.webhook, request),
            Protocol::SessionToken => match (&self.secrets.session_key, &self.secrets.api_key) {
                (Some(key), Some(audience)) => session_token::verify(
                    key,
                    audience,
                    self.secrets.session_token_leeway_secs,
                    request,
                    now,
                ),
                _ => Err("session token key or audience missing".to_string()),
            },
            Protocol::SharedSecret => match &self.secrets.backend {
                Some(secret) => shared_secret::verify(secret, request),
                None => Err("backend secret missing".to_string()),
            },
        }
    }
}
