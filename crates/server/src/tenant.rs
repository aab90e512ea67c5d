//! Tenant resolution.
//!
//! Extracts the shop a request claims to speak for from whichever carrier
//! the caller used. The value returned here is a *claim*: a handler trusts
//! it only once the request has been verified (see [`crate::auth`]).
//!
//! Carriers, in order of precedence:
//!
//! 1. `shop` query parameter (app proxy, OAuth redirects)
//! 2. `X-Shopify-Shop-Domain` header (webhooks)
//! 3. `X-Shop-Domain` header (backend callers)

use axum::http::HeaderMap;
use shopgate_core::ShopDomain;
use tracing::debug;

use crate::auth::InboundRequest;

/// Query parameter naming the shop.
pub const SHOP_PARAM: &str = "shop";

/// Headers naming the shop, in precedence order.
pub const SHOP_HEADERS: [&str; 2] = ["x-shopify-shop-domain", "x-shop-domain"];

/// Canonicalize a raw claim, logging (not failing) on garbage.
#[must_use]
pub fn from_claim(raw: &str) -> Option<ShopDomain> {
    match ShopDomain::parse(raw) {
        Ok(shop) => Some(shop),
        Err(e) => {
            debug!(error = %e, "ignoring unparseable shop claim");
            None
        }
    }
}

/// Shop named by the `shop` query parameter.
#[must_use]
pub fn from_query(query: Option<&str>) -> Option<ShopDomain> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find_map(|(k, v)| (k == SHOP_PARAM).then(|| v.into_owned()))
        .and_then(|raw| from_claim(&raw))
}

/// Shop named by the shop headers.
#[must_use]
pub fn from_headers(headers: &HeaderMap) -> Option<ShopDomain> {
    SHOP_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .and_then(from_claim)
    })
}

/// Shop claimed by a request through any carrier.
#[must_use]
pub fn from_request(request: &InboundRequest) -> Option<ShopDomain> {
    from_query(request.query.as_deref()).or_else(|| from_headers(&request.headers))
}
