//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::auth::Verifier;
use crate::config::ServerConfig;
use crate::db::{PgConfigSource, PgCredentialStore, PgErrorSink};
use crate::error_log::ErrorLog;
use crate::flags::FeatureFlags;
use crate::relay::{UpstreamError, WorkflowClient};
use crate::shopify::AdminApiClient;
use crate::vault::{CipherError, CredentialVault, VaultCipher};

/// Error assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("vault cipher: {0}")]
    Cipher(#[from] CipherError),
    #[error("http client: {0}")]
    Http(#[from] UpstreamError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    verifier: Verifier,
    vault: CredentialVault,
    flags: FeatureFlags,
    error_log: ErrorLog,
    workflow: WorkflowClient,
    shopify: AdminApiClient,
}

impl AppState {
    /// Assemble state from its parts.
    #[must_use]
    pub fn new(
        verifier: Verifier,
        vault: CredentialVault,
        flags: FeatureFlags,
        error_log: ErrorLog,
        workflow: WorkflowClient,
        shopify: AdminApiClient,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                verifier,
                vault,
                flags,
                error_log,
                workflow,
                shopify,
            }),
        }
    }

    /// Build production state backed by `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault cipher or an HTTP client cannot be built.
    pub fn from_config(config: &ServerConfig, pool: &PgPool) -> Result<Self, StateError> {
        let cipher = VaultCipher::new(&config.vault_key)?;
        let vault = CredentialVault::new(
            cipher,
            Arc::new(PgCredentialStore::new(pool.clone())),
            config.store_timeout,
        );
        let flags = FeatureFlags::new(
            Arc::new(PgConfigSource::new(pool.clone())),
            config.flag_ttl,
            config.store_timeout,
        );
        let error_log = ErrorLog::new(
            Arc::new(PgErrorSink::new(pool.clone())),
            config.store_timeout.min(Duration::from_secs(5)),
        );
        let workflow =
            WorkflowClient::new(config.workflow_engine_url.clone(), config.upstream_timeout)?;
        let shopify = AdminApiClient::new(&config.shopify.api_version, config.upstream_timeout)?;

        Ok(Self::new(
            Verifier::new(config.signing.clone()),
            vault,
            flags,
            error_log,
            workflow,
            shopify,
        ))
    }

    /// Request verifier.
    #[must_use]
    pub fn verifier(&self) -> &Verifier {
        &self.inner.verifier
    }

    /// Credential vault.
    #[must_use]
    pub fn vault(&self) -> &CredentialVault {
        &self.inner.vault
    }

    /// Feature flags.
    #[must_use]
    pub fn flags(&self) -> &FeatureFlags {
        &self.inner.flags
    }

    /// Error log.
    #[must_use]
    pub fn error_log(&self) -> &ErrorLog {
        &self.inner.error_log
    }

    /// Workflow engine client.
    #[must_use]
    pub fn workflow(&self) -> &WorkflowClient {
        &self.inner.workflow
    }

    /// Shopify Admin API client.
    #[must_use]
    pub fn shopify(&self) -> &AdminApiClient {
        &self.inner.shopify
    }
}
