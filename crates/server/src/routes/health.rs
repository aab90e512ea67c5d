//! Health check endpoints.

use std::time::Duration;

use axum::{extract::State, http::StatusCode};
use tracing::warn;

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies the credential store answers before returning OK.
/// Returns 503 Service Unavailable if it does not.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match tokio::time::timeout(Duration::from_secs(2), state.vault().store().ping()).await {
        Ok(Ok(())) => StatusCode::OK,
        Ok(Err(e)) => {
            warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(_) => {
            warn!("readiness check timed out");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
