//! Tenant identity.

use serde::{Deserialize, Serialize};

use super::ShopDomain;

/// The identity of one merchant installation.
///
/// The canonical shop domain is always present. The client identifier is only
/// set when a backend registers a credential under one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantIdentity {
    /// Canonical shop domain.
    pub shop: ShopDomain,
    /// Secondary client identifier, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl TenantIdentity {
    /// Create an identity from a shop domain alone.
    #[must_use]
    pub const fn new(shop: ShopDomain) -> Self {
        Self {
            shop,
            client_id: None,
        }
    }

    /// Attach a secondary client identifier.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

impl From<ShopDomain> for TenantIdentity {
    fn from(shop: ShopDomain) -> Self {
        Self::new(shop)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_skips_missing_client_id() {
        let tenant = TenantIdentity::new(ShopDomain::parse("foo").unwrap());
        let json = serde_json::to_string(&tenant).unwrap();
        assert_eq!(json, r#"{"shop":"foo.myshopify.com"}"#);
    }

    #[test]
    fn test_with_client_id() {
        let tenant = TenantIdentity::new(ShopDomain::parse("foo").unwrap()).with_client_id("abc");
        assert_eq!(tenant.client_id.as_deref(), Some("abc"));
    }
}
