//! Webhook HMAC verification.
//!
//! Webhooks carry the base64 HMAC-SHA256 of the exact raw body in
//! `X-Shopify-Hmac-Sha256`. The tenant is the `X-Shopify-Shop-Domain` header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use shopgate_core::{ShopDomain, TenantIdentity};

use super::{CheckResult, InboundRequest, compare};

/// Header carrying the body signature.
pub const WEBHOOK_HMAC_HEADER: &str = "x-shopify-hmac-sha256";

/// Header naming the shop a webhook is about.
pub const WEBHOOK_SHOP_HEADER: &str = "x-shopify-shop-domain";

/// Header naming the webhook topic.
pub const WEBHOOK_TOPIC_HEADER: &str = "x-shopify-topic";

/// Compute the base64 signature of a raw webhook body.
#[must_use]
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    STANDARD.encode(compare::hmac_sha256(secret, body))
}

pub(super) fn verify(secrets: &[SecretString], request: &InboundRequest) -> CheckResult {
    let provided = request
        .header(WEBHOOK_HMAC_HEADER)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "missing webhook signature header".to_string())?;

    let expected = secrets
        .iter()
        .map(|secret| sign(secret.expose_secret().as_bytes(), &request.body));

    if !compare::matches_any(expected, provided.as_bytes()) {
        return Err("webhook signature mismatch".to_string());
    }

    let shop = request
        .header(WEBHOOK_SHOP_HEADER)
        .map(ShopDomain::parse)
        .transpose()
        .map_err(|e| format!("invalid shop domain header: {e}"))?;

    Ok(shop.map(TenantIdentity::new))
}
