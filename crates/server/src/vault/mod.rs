//! Encrypted-at-rest storage of per-tenant platform access tokens.
//!
//! Plaintext tokens never reach the store: [`CredentialVault::encrypt`] seals
//! them with AES-256-GCM (the shop domain as associated data) and persists
//! `base64(ciphertext || tag)` plus the nonce. [`CredentialVault::decrypt`]
//! returns plaintext only when the tag verifies.
//!
//! # Example
//!
//! ```rust,ignore
//! let vault = CredentialVault::new(cipher, Arc::new(MemoryCredentialStore::new()), timeout);
//! vault.encrypt(&tenant, &SecretString::from("shpat_abc123")).await?;
//! let token = vault.decrypt(&CredentialLookup::from(&tenant)).await?;
//! ```

pub mod cipher;
pub mod store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use shopgate_core::{ShopDomain, TenantIdentity};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::StoreError;

pub use cipher::{CipherError, KEY_LEN, SealedToken, VaultCipher, VaultKey, VaultKeyError};
pub use store::{CredentialStore, EncryptedCredential, MemoryCredentialStore, SealedCredential};

/// Largest accepted plaintext token, in bytes.
pub const MAX_PLAINTEXT_LEN: usize = 8192;

/// Errors from vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No credential row for the tenant.
    #[error("no credential stored for tenant")]
    NotFound,

    /// The stored ciphertext failed authentication or is malformed.
    #[error("stored credential failed integrity check")]
    Integrity,

    /// The store did not answer in time.
    #[error("credential store timed out")]
    Timeout,

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Input rejected before touching the store.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A client id matches more than one tenant.
    #[error("client id matches more than one tenant")]
    Ambiguous,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Crypto(#[from] CipherError),
}

/// Identifiers to find a credential by; at least one must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialLookup {
    pub shop: Option<ShopDomain>,
    pub client_id: Option<String>,
}

impl CredentialLookup {
    /// Look up by shop only.
    #[must_use]
    pub const fn shop(shop: ShopDomain) -> Self {
        Self {
            shop: Some(shop),
            client_id: None,
        }
    }

    /// Look up by client id only.
    #[must_use]
    pub fn client_id(client_id: impl Into<String>) -> Self {
        Self {
            shop: None,
            client_id: Some(client_id.into()),
        }
    }

    fn is_empty(&self) -> bool {
        self.shop.is_none() && self.client_id.is_none()
    }
}

impl From<&TenantIdentity> for CredentialLookup {
    fn from(tenant: &TenantIdentity) -> Self {
        Self {
            shop: Some(tenant.shop.clone()),
            client_id: tenant.client_id.clone(),
        }
    }
}

/// The credential vault.
pub struct CredentialVault {
    cipher: VaultCipher,
    store: Arc<dyn CredentialStore>,
    timeout: Duration,
}

impl CredentialVault {
    /// Create a vault over `store`, bounding every store call by `timeout`.
    #[must_use]
    pub fn new(cipher: VaultCipher, store: Arc<dyn CredentialStore>, timeout: Duration) -> Self {
        Self {
            cipher,
            store,
            timeout,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Seal `token` for `tenant` and upsert it. Reinstalls replace the row.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MalformedInput`] for an empty or oversized token,
    /// and store errors or [`VaultError::Timeout`] from the write.
    #[instrument(skip(self, token), fields(shop = %tenant.shop))]
    pub async fn encrypt(
        &self,
        tenant: &TenantIdentity,
        token: &SecretString,
    ) -> Result<EncryptedCredential, VaultError> {
        let plaintext = token.expose_secret().as_bytes();
        if plaintext.is_empty() || plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(VaultError::MalformedInput(format!(
                "token must be 1..={MAX_PLAINTEXT_LEN} bytes"
            )));
        }

        let client_id = tenant
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned);

        let sealed = self.cipher.seal(tenant.shop.as_str().as_bytes(), plaintext)?;
        let credential = SealedCredential {
            shop: tenant.shop.clone(),
            client_id,
            token_ciphertext_b64: STANDARD.encode(&sealed.ciphertext),
            nonce_b64: STANDARD.encode(sealed.nonce),
        };

        let row = self.bounded(self.store.upsert(credential)).await?;
        info!("credential stored");
        Ok(row)
    }

    /// Fetch and open the credential, trying the shop first, then the client id.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] when no row matches,
    /// [`VaultError::Integrity`] when the row does not authenticate, and
    /// [`VaultError::Ambiguous`] when a client id matches several shops.
    #[instrument(skip(self), fields(shop = lookup.shop.as_ref().map(ShopDomain::as_str)))]
    pub async fn decrypt(&self, lookup: &CredentialLookup) -> Result<SecretString, VaultError> {
        let row = self.find(lookup).await?;

        let blob = STANDARD
            .decode(&row.token_ciphertext_b64)
            .map_err(|_| VaultError::Integrity)?;
        let nonce = STANDARD
            .decode(&row.nonce_b64)
            .map_err(|_| VaultError::Integrity)?;

        let plaintext = self
            .cipher
            .open(row.shop.as_str().as_bytes(), &nonce, &blob)
            .map_err(|_| {
                warn!(shop = %row.shop, "stored credential failed authentication");
                VaultError::Integrity
            })?;

        String::from_utf8(plaintext)
            .map(SecretString::from)
            .map_err(|e| {
                e.into_bytes().fill(0);
                VaultError::Integrity
            })
    }

    /// Remove the credential for the lookup's shop. Absence is success.
    ///
    /// A client id is only used when no shop is given, and then only when it
    /// names exactly one tenant. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Ambiguous`] when a bare client id matches several
    /// shops, store errors, or [`VaultError::Timeout`].
    #[instrument(skip(self), fields(shop = lookup.shop.as_ref().map(ShopDomain::as_str)))]
    pub async fn delete(&self, lookup: &CredentialLookup) -> Result<bool, VaultError> {
        let shop = match (&lookup.shop, lookup.client_id.as_deref()) {
            (Some(shop), _) => shop.clone(),
            (None, Some(client_id)) => {
                let mut rows = self.bounded(self.store.find_by_client_id(client_id)).await?;
                if rows.len() > 1 {
                    warn!(client_id, "client id matches more than one tenant");
                    return Err(VaultError::Ambiguous);
                }
                match rows.pop() {
                    Some(row) => row.shop,
                    None => return Ok(false),
                }
            }
            (None, None) => {
                return Err(VaultError::MalformedInput(
                    "lookup needs a shop or client id".to_string(),
                ));
            }
        };

        let removed = self.bounded(self.store.delete(&shop)).await?;

        if removed > 0 {
            info!(removed, "credential deleted");
        }
        Ok(removed > 0)
    }

    async fn find(&self, lookup: &CredentialLookup) -> Result<EncryptedCredential, VaultError> {
        if lookup.is_empty() {
            return Err(VaultError::MalformedInput(
                "lookup needs a shop or client id".to_string(),
            ));
        }

        if let Some(shop) = &lookup.shop
            && let Some(row) = self.bounded(self.store.find_by_shop(shop)).await?
        {
            return Ok(row);
        }

        let Some(client_id) = lookup.client_id.as_deref() else {
            return Err(VaultError::NotFound);
        };

        let mut rows = self.bounded(self.store.find_by_client_id(client_id)).await?;
        if rows.len() > 1 {
            warn!(client_id, "client id matches more than one tenant");
            return Err(VaultError::Ambiguous);
        }
        let row = rows.pop().ok_or(VaultError::NotFound)?;

        // Never hand one tenant's token to a request verified for another
        if let Some(shop) = &lookup.shop
            && *shop != row.shop
        {
            warn!(requested = %shop, stored = %row.shop, "client id belongs to a different shop");
            return Err(VaultError::NotFound);
        }

        Ok(row)
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, VaultError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis(), "credential store call timed out");
                Err(VaultError::Timeout)
            }
        }
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("cipher", &self.cipher)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::StoreFuture;

    const HEX_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn vault_with(store: Arc<dyn CredentialStore>) -> CredentialVault {
        let cipher = VaultCipher::new(&VaultKey::parse(HEX_KEY).unwrap()).unwrap();
        CredentialVault::new(cipher, store, Duration::from_millis(200))
    }

    fn vault() -> (CredentialVault, MemoryCredentialStore) {
        let store = MemoryCredentialStore::new();
        (vault_with(Arc::new(store.clone())), store)
    }

    fn tenant(raw: &str) -> TenantIdentity {
        TenantIdentity::new(ShopDomain::parse(raw).unwrap())
    }

    fn token(s: &str) -> SecretString {
        SecretString::from(s)
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let (vault, store) = vault();
        let foo = tenant("foo.myshopify.com");

        vault.encrypt(&foo, &token("shpat_abc123")).await.unwrap();
        let plaintext = vault.decrypt(&CredentialLookup::from(&foo)).await.unwrap();

        assert_eq!(plaintext.expose_secret(), "shpat_abc123");

        let row = store.row(&foo.shop).unwrap();
        assert!(!row.token_ciphertext_b64.contains("shpat_abc123"));
        let blob = STANDARD.decode(&row.token_ciphertext_b64).unwrap();
        assert!(!blob.windows(12).any(|w| w == b"shpat_abc123"));
    }

    #[tokio::test]
    async fn test_round_trip_length_range() {
        let (vault, _) = vault();
        let foo = tenant("foo");

        for len in [1, 2, 15, 16, 17, 255, 4096, MAX_PLAINTEXT_LEN] {
            let plaintext = "x".repeat(len);
            vault.encrypt(&foo, &token(&plaintext)).await.unwrap();
            let opened = vault.decrypt(&CredentialLookup::from(&foo)).await.unwrap();
            assert_eq!(opened.expose_secret(), plaintext);
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized() {
        let (vault, store) = vault();
        let foo = tenant("foo");

        assert!(matches!(
            vault.encrypt(&foo, &token("")).await,
            Err(VaultError::MalformedInput(_))
        ));
        assert!(matches!(
            vault.encrypt(&foo, &token(&"x".repeat(MAX_PLAINTEXT_LEN + 1))).await,
            Err(VaultError::MalformedInput(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_reinstall_keeps_one_row() {
        let (vault, store) = vault();
        let foo = tenant("foo");

        vault.encrypt(&foo, &token("first")).await.unwrap();
        vault.encrypt(&foo, &token("second")).await.unwrap();

        assert_eq!(store.len(), 1);
        let opened = vault.decrypt(&CredentialLookup::from(&foo)).await.unwrap();
        assert_eq!(opened.expose_secret(), "second");
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let (vault, _) = vault();
        assert!(matches!(
            vault.decrypt(&CredentialLookup::from(&tenant("nobody"))).await,
            Err(VaultError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_tampered_row_is_integrity_error() {
        let (vault, store) = vault();
        let foo = tenant("foo");
        vault.encrypt(&foo, &token("shpat_abc123")).await.unwrap();
        let row = store.row(&foo.shop).unwrap();

        let mut blob = STANDARD.decode(&row.token_ciphertext_b64).unwrap();
        blob[0] ^= 0x01;
        store.put_row(EncryptedCredential {
            token_ciphertext_b64: STANDARD.encode(&blob),
            ..row.clone()
        });
        assert!(matches!(
            vault.decrypt(&CredentialLookup::from(&foo)).await,
            Err(VaultError::Integrity)
        ));

        let mut nonce = STANDARD.decode(&row.nonce_b64).unwrap();
        nonce[11] ^= 0x80;
        store.put_row(EncryptedCredential {
            nonce_b64: STANDARD.encode(&nonce),
            ..row.clone()
        });
        assert!(matches!(
            vault.decrypt(&CredentialLookup::from(&foo)).await,
            Err(VaultError::Integrity)
        ));

        store.put_row(EncryptedCredential {
            nonce_b64: "***".to_string(),
            ..row
        });
        assert!(matches!(
            vault.decrypt(&CredentialLookup::from(&foo)).await,
            Err(VaultError::Integrity)
        ));
    }

    #[tokio::test]
    async fn test_authentic_non_utf8_plaintext_is_integrity_error() {
        let (vault, store) = vault();
        let foo = tenant("foo");
        vault.encrypt(&foo, &token("placeholder")).await.unwrap();

        let cipher = VaultCipher::new(&VaultKey::parse(HEX_KEY).unwrap()).unwrap();
        let sealed = cipher.seal(foo.shop.as_str().as_bytes(), &[0xff, 0xfe, 0x00]).unwrap();
        let row = store.row(&foo.shop).unwrap();
        store.put_row(EncryptedCredential {
            token_ciphertext_b64: STANDARD.encode(&sealed.ciphertext),
            nonce_b64: STANDARD.encode(sealed.nonce),
            ..row
        });

        assert!(matches!(
            vault.decrypt(&CredentialLookup::from(&foo)).await,
            Err(VaultError::Integrity)
        ));
    }

    #[tokio::test]
    async fn test_row_moved_to_other_shop_fails() {
        let (vault, store) = vault();
        let foo = tenant("foo");
        let bar = tenant("bar");
        vault.encrypt(&foo, &token("foo-token")).await.unwrap();

        let row = store.row(&foo.shop).unwrap();
        store.put_row(EncryptedCredential {
            shop: bar.shop.clone(),
            ..row
        });

        assert!(matches!(
            vault.decrypt(&CredentialLookup::from(&bar)).await,
            Err(VaultError::Integrity)
        ));
    }

    #[tokio::test]
    async fn test_client_id_fallback() {
        let (vault, _) = vault();
        let foo = tenant("foo").with_client_id("client-foo");
        vault.encrypt(&foo, &token("foo-token")).await.unwrap();

        let opened = vault
            .decrypt(&CredentialLookup::client_id("client-foo"))
            .await
            .unwrap();
        assert_eq!(opened.expose_secret(), "foo-token");
    }

    #[tokio::test]
    async fn test_client_id_fallback_never_crosses_tenants() {
        let (vault, _) = vault();
        vault
            .encrypt(&tenant("foo").with_client_id("client-foo"), &token("foo-token"))
            .await
            .unwrap();

        let lookup = CredentialLookup {
            shop: Some(ShopDomain::parse("bar").unwrap()),
            client_id: Some("client-foo".to_string()),
        };
        assert!(matches!(vault.decrypt(&lookup).await, Err(VaultError::NotFound)));
    }

    #[tokio::test]
    async fn test_ambiguous_client_id() {
        let (vault, _) = vault();
        vault
            .encrypt(&tenant("foo").with_client_id("shared"), &token("a"))
            .await
            .unwrap();
        vault
            .encrypt(&tenant("bar").with_client_id("shared"), &token("b"))
            .await
            .unwrap();

        assert!(matches!(
            vault.decrypt(&CredentialLookup::client_id("shared")).await,
            Err(VaultError::Ambiguous)
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (vault, store) = vault();
        let foo = tenant("foo");
        vault.encrypt(&foo, &token("t")).await.unwrap();

        assert!(vault.delete(&CredentialLookup::from(&foo)).await.unwrap());
        assert!(!vault.delete(&CredentialLookup::from(&foo)).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_never_crosses_tenants() {
        let (vault, store) = vault();
        vault
            .encrypt(&tenant("a").with_client_id("ca"), &token("a-token"))
            .await
            .unwrap();
        vault
            .encrypt(&tenant("b").with_client_id("cb"), &token("b-token"))
            .await
            .unwrap();

        let lookup = CredentialLookup {
            shop: Some(ShopDomain::parse("a").unwrap()),
            client_id: Some("cb".to_string()),
        };
        assert!(vault.delete(&lookup).await.unwrap());

        assert_eq!(store.len(), 1);
        let b = vault.decrypt(&CredentialLookup::from(&tenant("b"))).await.unwrap();
        assert_eq!(b.expose_secret(), "b-token");
    }

    #[tokio::test]
    async fn test_delete_by_client_id_alone() {
        let (vault, store) = vault();
        vault
            .encrypt(&tenant("a").with_client_id("ca"), &token("a-token"))
            .await
            .unwrap();
        vault.encrypt(&tenant("b"), &token("b-token")).await.unwrap();

        assert!(vault.delete(&CredentialLookup::client_id("ca")).await.unwrap());
        assert!(!vault.delete(&CredentialLookup::client_id("ca")).await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_ambiguous_client_id_removes_nothing() {
        let (vault, store) = vault();
        vault
            .encrypt(&tenant("a").with_client_id("shared"), &token("a"))
            .await
            .unwrap();
        vault
            .encrypt(&tenant("b").with_client_id("shared"), &token("b"))
            .await
            .unwrap();

        assert!(matches!(
            vault.delete(&CredentialLookup::client_id("shared")).await,
            Err(VaultError::Ambiguous)
        ));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_lookup_is_malformed() {
        let (vault, _) = vault();
        assert!(matches!(
            vault.decrypt(&CredentialLookup::default()).await,
            Err(VaultError::MalformedInput(_))
        ));
        assert!(matches!(
            vault.delete(&CredentialLookup::default()).await,
            Err(VaultError::MalformedInput(_))
        ));
    }

    struct StalledStore;

    impl CredentialStore for StalledStore {
        fn upsert(&self, _credential: SealedCredential) -> StoreFuture<'_, EncryptedCredential> {
            Box::pin(std::future::pending())
        }

        fn find_by_shop<'a>(
            &'a self,
            _shop: &'a ShopDomain,
        ) -> StoreFuture<'a, Option<EncryptedCredential>> {
            Box::pin(std::future::pending())
        }

        fn find_by_client_id<'a>(
            &'a self,
            _client_id: &'a str,
        ) -> StoreFuture<'a, Vec<EncryptedCredential>> {
            Box::pin(std::future::pending())
        }

        fn delete<'a>(&'a self, _shop: &'a ShopDomain) -> StoreFuture<'a, u64> {
            Box::pin(std::future::pending())
        }

        fn ping(&self) -> StoreFuture<'_, ()> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn test_store_timeout() {
        let vault = vault_with(Arc::new(StalledStore));
        let started = Utc::now();

        assert!(matches!(
            vault.encrypt(&tenant("foo"), &token("t")).await,
            Err(VaultError::Timeout)
        ));
        assert!(matches!(
            vault.decrypt(&CredentialLookup::from(&tenant("foo"))).await,
            Err(VaultError::Timeout)
        ));
        assert!(Utc::now() - started < chrono::TimeDelta::seconds(5));
    }
}
