//! Backend credential registration and purge.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use shopgate_core::{ShopDomain, TenantIdentity};
use tracing::{info, instrument};

use crate::auth::Verified;
use crate::error::AppError;
use crate::state::AppState;
use crate::vault::CredentialLookup;

// =============================================================================
// Register
// =============================================================================

#[derive(Deserialize)]
struct RegisterCredential {
    shop: ShopDomain,
    #[serde(default)]
    client_id: Option<String>,
    access_token: String,
}

/// What a registration returns. Never includes the token.
#[derive(Debug, Serialize)]
pub struct RegisteredCredential {
    pub shop: ShopDomain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// POST /api/credentials - store or replace a tenant's access token.
///
/// The body shop must match the shop the request was verified for, when the
/// request named one.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    verified: Verified,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisteredCredential>), AppError> {
    let input: RegisterCredential = serde_json::from_slice(&body)
        .map_err(|e| AppError::MalformedInput(format!("invalid credential body: {e}")))?;

    if let Some(tenant) = verified.0.tenant.as_ref()
        && tenant.shop != input.shop
    {
        return Err(AppError::MalformedInput(
            "body shop does not match request shop".to_string(),
        ));
    }

    let mut tenant = TenantIdentity::new(input.shop);
    if let Some(client_id) = input.client_id {
        tenant = tenant.with_client_id(client_id);
    }
    let token = SecretString::from(input.access_token);

    let row = state.vault().encrypt(&tenant, &token).await?;
    info!(shop = %row.shop, "credential registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisteredCredential {
            shop: row.shop,
            client_id: row.client_id,
            updated_at: row.updated_at,
        }),
    ))
}

// =============================================================================
// Purge
// =============================================================================

/// DELETE /api/credentials/{shop} - remove a tenant's credential.
///
/// Idempotent: deleting an absent credential is also a 204.
#[instrument(skip(state, _verified))]
pub async fn purge(
    State(state): State<AppState>,
    _verified: Verified,
    Path(shop): Path<String>,
) -> Result<StatusCode, AppError> {
    let shop = ShopDomain::parse(&shop)
        .map_err(|e| AppError::MalformedInput(format!("invalid shop: {e}")))?;

    let removed = state.vault().delete(&CredentialLookup::shop(shop)).await?;
    info!(removed, "credential purge requested");

    Ok(StatusCode::NO_CONTENT)
}
