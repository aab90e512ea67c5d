//! Unified error handling for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthFailure;
use crate::db::StoreError;
use crate::relay::UpstreamError;
use crate::vault::VaultError;

/// Stable machine-readable error code, attached to error responses and
/// written to the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Configuration,
    NotFound,
    Integrity,
    UpstreamTimeout,
    UpstreamFailure,
    MalformedInput,
    PayloadTooLarge,
    Unavailable,
    Store,
    Internal,
}

impl ErrorCode {
    /// The code as stored in the error log.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Configuration => "configuration",
            Self::NotFound => "not_found",
            Self::Integrity => "integrity",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamFailure => "upstream_failure",
            Self::MalformedInput => "malformed_input",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Unavailable => "unavailable",
            Self::Store => "store",
            Self::Internal => "internal",
        }
    }
}

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request verification failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Secret material for a declared protocol is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored credential failed authentication.
    #[error("Stored credential failed integrity check")]
    Integrity,

    /// An upstream call timed out.
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// An upstream call failed.
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Bad request from client.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Request body over the size limit.
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Feature disabled or dependency unavailable.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The error's stable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Integrity => ErrorCode::Integrity,
            Self::UpstreamTimeout(_) => ErrorCode::UpstreamTimeout,
            Self::UpstreamFailure(_) => ErrorCode::UpstreamFailure,
            Self::MalformedInput(_) => ErrorCode::MalformedInput,
            Self::PayloadTooLarge => ErrorCode::PayloadTooLarge,
            Self::Unavailable(_) => ErrorCode::Unavailable,
            Self::Store(_) => ErrorCode::Store,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// HTTP status for the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MalformedInput(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Configuration(_) | Self::Integrity | Self::Store(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                code = code.as_str(),
                sentry_event_id = %event_id,
                "request error"
            );
        }

        // Don't expose internal error details or signature reasons to clients
        let message = match &self {
            Self::Unauthorized(_) => "Unauthorized".to_string(),
            Self::UpstreamTimeout(_) => "Upstream service timed out".to_string(),
            Self::UpstreamFailure(_) => "External service error".to_string(),
            Self::Unavailable(_) => "Service unavailable".to_string(),
            _ if status.is_server_error() => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let mut response = (status, Json(ErrorBody { error: code, message })).into_response();
        response.extensions_mut().insert(code);
        response
    }
}

impl From<AuthFailure> for AppError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Unauthorized(reason) => Self::Unauthorized(reason),
            AuthFailure::Configuration(reason) => Self::Configuration(reason),
        }
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound => Self::NotFound("credential".to_string()),
            VaultError::Integrity => Self::Integrity,
            VaultError::Timeout => Self::UpstreamTimeout("credential store".to_string()),
            VaultError::Store(e) => Self::Store(e),
            VaultError::MalformedInput(msg) => Self::MalformedInput(msg),
            VaultError::Ambiguous => Self::Internal("client id matches several tenants".to_string()),
            VaultError::Crypto(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(target) => Self::UpstreamTimeout(target),
            UpstreamError::Failure(reason) => Self::UpstreamFailure(reason),
        }
    }
}
