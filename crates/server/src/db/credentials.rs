//! `shop_credentials` repository.

use shopgate_core::ShopDomain;
use sqlx::PgPool;

use super::{StoreError, StoreFuture};
use crate::vault::{CredentialStore, EncryptedCredential, SealedCredential};

const COLUMNS: &str = "shop, client_id, token_ciphertext_b64, nonce_b64, created_at, updated_at";

/// Credential store backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_row(&self, credential: SealedCredential) -> Result<EncryptedCredential, StoreError> {
        let sql = format!(
            r"
            INSERT INTO shop_credentials (shop, client_id, token_ciphertext_b64, nonce_b64)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (shop) DO UPDATE SET
                client_id = EXCLUDED.client_id,
                token_ciphertext_b64 = EXCLUDED.token_ciphertext_b64,
                nonce_b64 = EXCLUDED.nonce_b64,
                updated_at = NOW()
            RETURNING {COLUMNS}
            "
        );

        let row = sqlx::query_as::<_, EncryptedCredential>(&sql)
            .bind(&credential.shop)
            .bind(credential.client_id.as_deref())
            .bind(&credential.token_ciphertext_b64)
            .bind(&credential.nonce_b64)
            .fetch_one(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_shop(&self, shop: &ShopDomain) -> Result<Option<EncryptedCredential>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM shop_credentials WHERE shop = $1");
        let row = sqlx::query_as::<_, EncryptedCredential>(&sql)
            .bind(shop)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_client(&self, client_id: &str) -> Result<Vec<EncryptedCredential>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM shop_credentials WHERE client_id = $1 ORDER BY shop LIMIT 2"
        );
        let rows = sqlx::query_as::<_, EncryptedCredential>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn delete_row(&self, shop: &ShopDomain) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM shop_credentials WHERE shop = $1")
            .bind(shop.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

impl CredentialStore for PgCredentialStore {
    fn upsert(&self, credential: SealedCredential) -> StoreFuture<'_, EncryptedCredential> {
        Box::pin(self.upsert_row(credential))
    }

    fn find_by_shop<'a>(
        &'a self,
        shop: &'a ShopDomain,
    ) -> StoreFuture<'a, Option<EncryptedCredential>> {
        Box::pin(self.find_shop(shop))
    }

    fn find_by_client_id<'a>(
        &'a self,
        client_id: &'a str,
    ) -> StoreFuture<'a, Vec<EncryptedCredential>> {
        Box::pin(self.find_client(client_id))
    }

    fn delete<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, u64> {
        Box::pin(self.delete_row(shop))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }
}
