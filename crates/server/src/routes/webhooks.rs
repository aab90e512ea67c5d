//! Platform webhooks.

use axum::{extract::State, http::HeaderMap, http::StatusCode};
use tracing::{debug, info, instrument};

use crate::auth::Verified;
use crate::auth::webhook::WEBHOOK_TOPIC_HEADER;
use crate::error::AppError;
use crate::state::AppState;
use crate::vault::CredentialLookup;

/// Topics after which the tenant's credential must be purged.
const PURGE_TOPICS: [&str; 2] = ["app/uninstalled", "shop/redact"];

/// POST /webhooks - receive a verified webhook.
#[instrument(skip_all, fields(topic, shop))]
pub async fn receive(
    State(state): State<AppState>,
    verified: Verified,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let topic = headers
        .get(WEBHOOK_TOPIC_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::MalformedInput("missing webhook topic".to_string()))?;

    let tenant = verified.tenant()?;
    let span = tracing::Span::current();
    span.record("topic", topic.as_str());
    span.record("shop", tenant.shop.as_str());

    if PURGE_TOPICS.contains(&topic.as_str()) {
        let removed = state
            .vault()
            .delete(&CredentialLookup::shop(tenant.shop.clone()))
            .await?;
        info!(removed, "credential purged after webhook");
    } else {
        debug!("webhook acknowledged");
    }

    Ok(StatusCode::OK)
}
