//! Background jobs relayed to the workflow engine.

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::auth::Verified;
use crate::error::AppError;
use crate::error_log::correlation_id;
use crate::flags::RELAY_ENABLED;
use crate::state::AppState;

/// Whether `job` is a usable job name: `[a-z0-9_-]`, 1 to 64 chars.
#[must_use]
pub fn is_valid_job(job: &str) -> bool {
    !job.is_empty()
        && job.len() <= 64
        && job
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

/// POST /api/jobs/{job} - relay a job for the verified tenant.
#[instrument(skip(state, verified, headers, body))]
pub async fn relay(
    State(state): State<AppState>,
    verified: Verified,
    Path(job): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if !is_valid_job(&job) {
        return Err(AppError::MalformedInput(format!("invalid job name: {job}")));
    }

    if !state.flags().is_enabled(RELAY_ENABLED, true, Utc::now()).await {
        return Err(AppError::Unavailable("job relay disabled".to_string()));
    }

    let tenant = verified.tenant()?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let relayed = state
        .workflow()
        .forward(&job, Some(tenant), &correlation_id(&headers), body, content_type)
        .await?;
    info!(shop = %tenant.shop, status = relayed.status, "job relayed");

    let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::ACCEPTED);
    let mut response = (status, Body::from(relayed.body)).into_response();
    if let Some(content_type) = relayed.content_type
        && let Ok(value) = content_type.parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
