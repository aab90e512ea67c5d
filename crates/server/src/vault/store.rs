//! Credential row storage contract and the in-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use shopgate_core::ShopDomain;

use crate::db::{StoreError, StoreFuture};

/// A sealed credential ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedCredential {
    pub shop: ShopDomain,
    pub client_id: Option<String>,
    /// base64(ciphertext || tag)
    pub token_ciphertext_b64: String,
    pub nonce_b64: String,
}

/// A stored credential row. Holds ciphertext only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct EncryptedCredential {
    pub shop: ShopDomain,
    pub client_id: Option<String>,
    pub token_ciphertext_b64: String,
    pub nonce_b64: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage backend for credential rows.
///
/// Rows are unique on `shop`; `upsert` replaces the whole row on conflict.
pub trait CredentialStore
where
    Self: Send + Sync,
{
    /// Insert the row, or replace the existing row for the same shop.
    fn upsert(&self, credential: SealedCredential) -> StoreFuture<'_, EncryptedCredential>;

    /// Fetch the row for `shop`.
    fn find_by_shop<'a>(
        &'a self,
        shop: &'a ShopDomain,
    ) -> StoreFuture<'a, Option<EncryptedCredential>>;

    /// Fetch rows carrying `client_id`. At most two rows are returned, enough
    /// for the caller to tell a unique match from an ambiguous one.
    fn find_by_client_id<'a>(
        &'a self,
        client_id: &'a str,
    ) -> StoreFuture<'a, Vec<EncryptedCredential>>;

    /// Delete the row for `shop`; returns the number removed.
    fn delete<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, u64>;

    /// Check that the backend is reachable.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

type CredentialMap = Arc<RwLock<HashMap<ShopDomain, EncryptedCredential>>>;

/// Thread-safe in-process credential store for tests and local development.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore(CredentialMap);

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Raw row for `shop`, for inspecting what actually got persisted.
    #[must_use]
    pub fn row(&self, shop: &ShopDomain) -> Option<EncryptedCredential> {
        self.0.read().get(shop).cloned()
    }

    /// Overwrite a raw row, bypassing the cipher.
    pub fn put_row(&self, row: EncryptedCredential) {
        self.0.write().insert(row.shop.clone(), row);
    }

    fn upsert_now(map: &CredentialMap, credential: SealedCredential) -> EncryptedCredential {
        let now = Utc::now();
        let mut guard = map.write();
        let created_at = guard
            .get(&credential.shop)
            .map_or(now, |existing| existing.created_at);

        let row = EncryptedCredential {
            shop: credential.shop,
            client_id: credential.client_id,
            token_ciphertext_b64: credential.token_ciphertext_b64,
            nonce_b64: credential.nonce_b64,
            created_at,
            updated_at: now,
        };
        guard.insert(row.shop.clone(), row.clone());
        row
    }

}

impl CredentialStore for MemoryCredentialStore {
    fn upsert(&self, credential: SealedCredential) -> StoreFuture<'_, EncryptedCredential> {
        let map = self.0.clone();

        Box::pin(async move { Ok(Self::upsert_now(&map, credential)) })
    }

    fn find_by_shop<'a>(
        &'a self,
        shop: &'a ShopDomain,
    ) -> StoreFuture<'a, Option<EncryptedCredential>> {
        Box::pin(async move { Ok(self.0.read().get(shop).cloned()) })
    }

    fn find_by_client_id<'a>(
        &'a self,
        client_id: &'a str,
    ) -> StoreFuture<'a, Vec<EncryptedCredential>> {
        Box::pin(async move {
            Ok(self
                .0
                .read()
                .values()
                .filter(|row| row.client_id.as_deref() == Some(client_id))
                .take(2)
                .cloned()
                .collect())
        })
    }

    fn delete<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, u64> {
        Box::pin(async move { Ok(u64::from(self.0.write().remove(shop).is_some())) })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok::<(), StoreError>(()) })
    }
}
