//! Credential vault commands.
//!
//! # Usage
//!
//! ```bash
//! # New key for VAULT_ENCRYPTION_KEY
//! shopgate vault keygen
//!
//! # Remove a shop's credential (same effect as the uninstall webhook)
//! shopgate vault purge --shop foo
//! ```

use shopgate_core::ShopDomain;
use shopgate_server::db::{self, PgCredentialStore};
use shopgate_server::vault::{CredentialStore, VaultKey};
use thiserror::Error;

use super::{CommandError, database_url};

/// Errors from vault commands.
#[derive(Debug, Error)]
pub enum VaultCommandError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Invalid shop: {0}")]
    InvalidShop(String),

    #[error("Key generation failed: {0}")]
    Key(#[from] shopgate_server::vault::VaultKeyError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] shopgate_server::db::StoreError),
}

/// Print a fresh 256-bit key, base64 encoded.
pub fn keygen() -> Result<(), VaultCommandError> {
    let key = VaultKey::generate()?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", key.to_base64());
    }
    Ok(())
}

/// Delete the credential row of `shop`. Absence is not an error.
pub async fn purge(shop: &str) -> Result<(), VaultCommandError> {
    let shop = ShopDomain::parse(shop).map_err(|e| VaultCommandError::InvalidShop(e.to_string()))?;

    let pool = db::create_pool(&database_url()?).await?;
    let store = PgCredentialStore::new(pool);

    let removed = store.delete(&shop).await?;
    if removed == 0 {
        tracing::warn!(%shop, "no credential stored");
    } else {
        tracing::info!(%shop, "credential purged");
    }
    Ok(())
}
