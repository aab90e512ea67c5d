//! Embedded-app shop lookup.

use axum::{Json, extract::State};
use serde_json::Value;
use tracing::instrument;

use crate::auth::Verified;
use crate::error::AppError;
use crate::state::AppState;
use crate::vault::CredentialLookup;

/// GET /api/shop - fetch the tenant's shop record from the Admin API.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, verified: Verified) -> Result<Json<Value>, AppError> {
    let tenant = verified.tenant()?;

    let token = state.vault().decrypt(&CredentialLookup::from(tenant)).await?;
    let shop = state.shopify().get(&tenant.shop, &token, "shop").await?;

    Ok(Json(shop))
}
