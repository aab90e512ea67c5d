//! Fire-and-forget request failure log.
//!
//! Every error response is appended to the `error_log` table with the route,
//! tenant, correlation id and error code. Writes run on a spawned task with
//! a timeout; a failed write is logged and dropped, never surfaced to the
//! request that triggered it.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use shopgate_core::ShopDomain;
use tracing::warn;

use crate::db::StoreFuture;
use crate::error::ErrorCode;
use crate::request_id::REQUEST_ID_HEADER;
use crate::state::AppState;

/// One failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorLogEntry {
    pub route: String,
    pub shop: Option<ShopDomain>,
    pub correlation_id: String,
    pub code: ErrorCode,
    pub status: u16,
    pub occurred_at: DateTime<Utc>,
}

/// Destination of error log entries.
pub trait ErrorSink
where
    Self: Send + Sync,
{
    /// Append one entry.
    fn append(&self, entry: ErrorLogEntry) -> StoreFuture<'_, ()>;
}

/// Collects entries in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryErrorSink(Arc<Mutex<Vec<ErrorLogEntry>>>);

impl MemoryErrorSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.0.lock().clone()
    }
}

impl ErrorSink for MemoryErrorSink {
    fn append(&self, entry: ErrorLogEntry) -> StoreFuture<'_, ()> {
        self.0.lock().push(entry);
        Box::pin(async { Ok(()) })
    }
}

/// Handle for recording failures without waiting on the write.
#[derive(Clone)]
pub struct ErrorLog {
    sink: Arc<dyn ErrorSink>,
    timeout: Duration,
}

impl ErrorLog {
    /// Create a log writing to `sink`, each write bounded by `timeout`.
    #[must_use]
    pub fn new(sink: Arc<dyn ErrorSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Record `entry` in the background.
    pub fn record(&self, entry: ErrorLogEntry) {
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let correlation_id = entry.correlation_id.clone();
            match tokio::time::timeout(timeout, sink.append(entry)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, %correlation_id, "failed to write error log entry");
                }
                Err(_) => {
                    warn!(%correlation_id, "error log write timed out");
                }
            }
        });
    }
}

impl std::fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorLog")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Correlation id of a request, or `"unknown"`.
#[must_use]
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_owned()
}

/// Middleware recording every response that carries an [`ErrorCode`].
pub async fn record_errors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_owned(), |p| p.as_str().to_owned());
    let correlation_id = correlation_id(request.headers());

    let response = next.run(request).await;

    if let Some(code) = response.extensions().get::<ErrorCode>().copied() {
        state.error_log().record(ErrorLogEntry {
            route,
            shop: response.extensions().get::<ShopDomain>().cloned(),
            correlation_id,
            code,
            status: response.status().as_u16(),
            occurred_at: Utc::now(),
        });
    }

    response
}
