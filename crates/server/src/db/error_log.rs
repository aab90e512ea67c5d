//! `error_log` repository.

use sqlx::PgPool;

use super::StoreFuture;
use crate::error_log::{ErrorLogEntry, ErrorSink};

/// Appends error log entries to `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgErrorSink {
    pool: PgPool,
}

impl PgErrorSink {
    /// Create a new sink over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ErrorSink for PgErrorSink {
    fn append(&self, entry: ErrorLogEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO error_log (route, shop, correlation_id, code, status, occurred_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(&entry.route)
            .bind(entry.shop.as_ref().map(|s| s.as_str()))
            .bind(&entry.correlation_id)
            .bind(entry.code.as_str())
            .bind(i16::try_from(entry.status).unwrap_or(i16::MAX))
            .bind(entry.occurred_at)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }
}
