//! Coarse feature flags.
//!
//! Flags are read from the `app_config` table through a [`FlagSource`] and
//! held in an explicit [`FlagCache`] value (map, fetch time, TTL). A lookup on
//! a stale cache triggers a refresh; if the refresh fails the stale values
//! keep serving until the next TTL window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::db::StoreFuture;

/// Gate for relaying jobs to the workflow engine.
pub const RELAY_ENABLED: &str = "jobs.relay_enabled";

/// Key prefix of flag rows in `app_config`.
pub const FLAG_KEY_PREFIX: &str = "flag.";

/// Interpret a stored config value as a flag.
#[must_use]
pub fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(true),
            "false" | "off" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Snapshot of flag values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagCache {
    values: HashMap<String, bool>,
    fetched_at: Option<DateTime<Utc>>,
    ttl: TimeDelta,
}

impl FlagCache {
    /// A cache that has never been filled; always stale.
    #[must_use]
    pub fn empty(ttl: Duration) -> Self {
        Self {
            values: HashMap::new(),
            fetched_at: None,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// A cache filled at `fetched_at`.
    #[must_use]
    pub fn filled(values: HashMap<String, bool>, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            values,
            fetched_at: Some(fetched_at),
            ..Self::empty(ttl)
        }
    }

    /// Whether the snapshot is older than its TTL at `now`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.fetched_at
            .is_none_or(|fetched_at| now.signed_duration_since(fetched_at) >= self.ttl)
    }

    /// The cached value of `key`.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<bool> {
        self.values.get(key).copied()
    }

    /// Restart the TTL window without changing values.
    fn touch(&mut self, now: DateTime<Utc>) {
        self.fetched_at = Some(now);
    }
}

/// Where flag values come from.
pub trait FlagSource
where
    Self: Send + Sync,
{
    /// Load every flag, keyed without the [`FLAG_KEY_PREFIX`].
    fn load(&self) -> StoreFuture<'_, HashMap<String, bool>>;
}

/// Fixed flag values, for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct StaticFlagSource(HashMap<String, bool>);

impl StaticFlagSource {
    /// Serve the given values.
    #[must_use]
    pub fn new<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self(values.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl FlagSource for StaticFlagSource {
    fn load(&self) -> StoreFuture<'_, HashMap<String, bool>> {
        let values = self.0.clone();
        Box::pin(async move { Ok(values) })
    }
}

/// Feature flag lookups with a time-bounded cache.
pub struct FeatureFlags {
    cache: RwLock<FlagCache>,
    source: Arc<dyn FlagSource>,
    load_timeout: Duration,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl FeatureFlags {
    /// Create flags served from `source`, cached for `ttl`.
    #[must_use]
    pub fn new(source: Arc<dyn FlagSource>, ttl: Duration, load_timeout: Duration) -> Self {
        Self {
            cache: RwLock::new(FlagCache::empty(ttl)),
            source,
            load_timeout,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether `key` is enabled at `now`, or `default` if it is not set.
    pub async fn is_enabled(&self, key: &str, default: bool, now: DateTime<Utc>) -> bool {
        if self.cache.read().is_stale(now) {
            self.refresh(now).await;
        }
        self.cache.read().lookup(key).unwrap_or(default)
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> FlagCache {
        self.cache.read().clone()
    }

    async fn refresh(&self, now: DateTime<Utc>) {
        let _guard = self.refresh_lock.lock().await;
        if !self.cache.read().is_stale(now) {
            return;
        }

        match tokio::time::timeout(self.load_timeout, self.source.load()).await {
            Ok(Ok(values)) => {
                debug!(count = values.len(), "feature flags refreshed");
                let ttl = self.cache.read().ttl;
                *self.cache.write() = FlagCache {
                    values,
                    fetched_at: Some(now),
                    ttl,
                };
            }
            Ok(Err(e)) => {
                warn!(error = %e, "feature flag refresh failed; serving stale values");
                self.cache.write().touch(now);
            }
            Err(_) => {
                warn!(timeout_ms = self.load_timeout.as_millis(), "feature flag refresh timed out; serving stale values");
                self.cache.write().touch(now);
            }
        }
    }
}

impl std::fmt::Debug for FeatureFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFlags")
            .field("cache", &*self.cache.read())
            .field("load_timeout", &self.load_timeout)
            .finish_non_exhaustive()
    }
}
