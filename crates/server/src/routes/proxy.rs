//! App proxy requests forwarded by the storefront.
//!
//! The platform signs the query string; once verified, the request is
//! wrapped in a JSON envelope and relayed to the workflow engine as job
//! `proxy`. Whatever the engine answers is returned to the storefront.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use crate::auth::Verified;
use crate::auth::proxy::SIGNATURE_PARAM;
use crate::error::AppError;
use crate::error_log::correlation_id;
use crate::state::AppState;

/// Workflow engine job receiving proxy requests.
pub const PROXY_JOB: &str = "proxy";

#[derive(Serialize)]
struct ProxyEnvelope<'a> {
    method: &'a str,
    path: &'a str,
    shop: &'a str,
    query: Vec<(String, String)>,
    body: Value,
}

/// Build the envelope body. JSON request bodies are embedded as-is, anything
/// else as a UTF-8 string (or null when empty or not UTF-8).
fn envelope_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|_| {
        std::str::from_utf8(body)
            .map(|s| Value::String(s.to_owned()))
            .unwrap_or(Value::Null)
    })
}

/// GET|POST /proxy and /proxy/{*path}
#[instrument(skip_all, fields(path = %uri.path()))]
pub async fn relay(
    State(state): State<AppState>,
    verified: Verified,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let tenant = verified.tenant()?;

    let query = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .filter(|(k, _)| k != SIGNATURE_PARAM)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    let envelope = ProxyEnvelope {
        method: method.as_str(),
        path: uri.path(),
        shop: tenant.shop.as_str(),
        query,
        body: envelope_body(&body),
    };
    let payload = serde_json::to_vec(&envelope)
        .map_err(|e| AppError::Internal(format!("proxy envelope: {e}")))?;

    let relayed = state
        .workflow()
        .forward(
            PROXY_JOB,
            Some(tenant),
            &correlation_id(&headers),
            Bytes::from(payload),
            Some("application/json"),
        )
        .await?;

    let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::OK);
    let content_type = relayed
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok((status, [(header::CONTENT_TYPE, content_type)], Body::from(relayed.body)).into_response())
}
