//! `app_config` repository.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::warn;

use super::StoreFuture;
use crate::flags::{FLAG_KEY_PREFIX, FlagSource, flag_value};

/// Reads feature flags from the `app_config` key-value table.
#[derive(Debug, Clone)]
pub struct PgConfigSource {
    pool: PgPool,
}

impl PgConfigSource {
    /// Create a new source over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl FlagSource for PgConfigSource {
    fn load(&self) -> StoreFuture<'_, HashMap<String, bool>> {
        Box::pin(async move {
            let rows: Vec<(String, serde_json::Value)> =
                sqlx::query_as("SELECT key, value FROM app_config WHERE key LIKE 'flag.%'")
                    .fetch_all(&self.pool)
                    .await?;

            let mut flags = HashMap::with_capacity(rows.len());
            for (key, value) in rows {
                let Some(name) = key.strip_prefix(FLAG_KEY_PREFIX) else {
                    continue;
                };
                match flag_value(&value) {
                    Some(enabled) => {
                        flags.insert(name.to_owned(), enabled);
                    }
                    None => warn!(key = %key, "ignoring non-boolean flag value"),
                }
            }

            Ok(flags)
        })
    }
}
