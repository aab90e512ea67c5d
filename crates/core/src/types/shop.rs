//! Canonical shop domain type.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Suffix every canonical shop domain ends with.
pub const STOREFRONT_SUFFIX: &str = ".myshopify.com";

/// Platform host suffix that is rewritten to [`STOREFRONT_SUFFIX`].
const PLATFORM_SUFFIX: &str = ".shopify.com";

/// Host of the unified admin, which addresses stores by path.
const ADMIN_HOST: &str = "admin.shopify.com";

/// Errors that can occur when parsing a [`ShopDomain`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopDomainError {
    /// The input has no host after stripping scheme, path and port.
    #[error("shop domain cannot be empty")]
    Empty,
    /// The canonical domain is too long.
    #[error("shop domain must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The store handle contains a character outside `[a-z0-9-]`.
    #[error("shop domain contains invalid character {0:?}")]
    InvalidCharacter(char),
    /// The host does not belong to the platform.
    #[error("not a shop domain: {0}")]
    NotShopifyDomain(String),
}

/// A canonical shop domain such as `foo.myshopify.com`.
///
/// This is the primary tenant identifier. Every representation the platform
/// sends us (full URLs, admin URLs, bare handles, mixed case, ports) parses to
/// the same value, and parsing is idempotent on canonical input.
///
/// ## Examples
///
/// ```
/// use shopgate_core::ShopDomain;
///
/// let shop = ShopDomain::parse("https://Foo.myshopify.com:443/admin?x=1").unwrap();
/// assert_eq!(shop.as_str(), "foo.myshopify.com");
///
/// assert_eq!(ShopDomain::parse("foo.shopify.com").unwrap(), shop);
/// assert_eq!(ShopDomain::parse("admin.shopify.com/store/foo").unwrap(), shop);
/// assert_eq!(ShopDomain::parse("foo").unwrap(), shop);
///
/// assert!(ShopDomain::parse("example.com").is_err());
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Maximum length of a canonical shop domain (DNS name limit).
    pub const MAX_LENGTH: usize = 255;

    /// Parse and canonicalize a shop domain from any raw representation.
    ///
    /// # Errors
    ///
    /// Returns an error if no host remains after stripping, if the host is not
    /// a platform domain, or if the store handle contains invalid characters.
    pub fn parse(raw: &str) -> Result<Self, ShopDomainError> {
        let lower = raw.trim().to_ascii_lowercase();

        let rest = lower
            .split_once("://")
            .map_or(lower.as_str(), |(_, rest)| rest);
        let rest = rest.trim_start_matches('/');

        let (authority, path) = rest
            .find(['/', '?', '#'])
            .map_or((rest, ""), |idx| rest.split_at(idx));

        let authority = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host);
        let host = authority
            .split_once(':')
            .map_or(authority, |(host, _)| host)
            .trim_end_matches('.');

        if host.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        let handle = if host == ADMIN_HOST {
            path.strip_prefix("/store/")
                .and_then(|p| p.split(['/', '?', '#']).next())
                .filter(|h| !h.is_empty())
                .ok_or_else(|| ShopDomainError::NotShopifyDomain(host.to_owned()))?
        } else if let Some(handle) = host.strip_suffix(STOREFRONT_SUFFIX) {
            handle
        } else if let Some(handle) = host.strip_suffix(PLATFORM_SUFFIX) {
            handle
        } else if !host.contains('.') {
            host
        } else {
            return Err(ShopDomainError::NotShopifyDomain(host.to_owned()));
        };

        if handle.is_empty() {
            return Err(ShopDomainError::Empty);
        }

        if let Some(c) = handle
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(ShopDomainError::InvalidCharacter(c));
        }

        let canonical = format!("{handle}{STOREFRONT_SUFFIX}");
        if canonical.len() > Self::MAX_LENGTH {
            return Err(ShopDomainError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        Ok(Self(canonical))
    }

    /// Returns the canonical domain as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `ShopDomain` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the store handle (the part before `.myshopify.com`).
    #[must_use]
    pub fn handle(&self) -> &str {
        self.0.strip_suffix(STOREFRONT_SUFFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShopDomain {
    type Err = ShopDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ShopDomain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ShopDomain {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ShopDomain {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Re-canonicalize so rows written by older code still compare equal
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ShopDomain {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn canonical(raw: &str) -> String {
        ShopDomain::parse(raw).unwrap().into_inner()
    }

    #[test]
    fn test_parse_canonical_input() {
        assert_eq!(canonical("foo.myshopify.com"), "foo.myshopify.com");
    }

    #[test]
    fn test_parse_strips_scheme_path_query_and_port() {
        assert_eq!(canonical("https://foo.myshopify.com"), "foo.myshopify.com");
        assert_eq!(canonical("http://foo.myshopify.com/"), "foo.myshopify.com");
        assert_eq!(
            canonical("https://foo.myshopify.com:8443/admin/apps?x=1#frag"),
            "foo.myshopify.com"
        );
        assert_eq!(canonical("foo.myshopify.com?shop=bar"), "foo.myshopify.com");
        assert_eq!(canonical("//foo.myshopify.com"), "foo.myshopify.com");
    }

    #[test]
    fn test_parse_lowercases_and_trims() {
        assert_eq!(canonical("  FOO.MyShopify.COM \n"), "foo.myshopify.com");
    }

    #[test]
    fn test_parse_maps_platform_suffix() {
        assert_eq!(canonical("foo.shopify.com"), "foo.myshopify.com");
        assert_eq!(canonical("https://foo.shopify.com/x"), "foo.myshopify.com");
    }

    #[test]
    fn test_parse_admin_url() {
        assert_eq!(
            canonical("https://admin.shopify.com/store/foo/apps/bar"),
            "foo.myshopify.com"
        );
        assert!(matches!(
            ShopDomain::parse("https://admin.shopify.com/"),
            Err(ShopDomainError::NotShopifyDomain(_))
        ));
    }

    #[test]
    fn test_parse_bare_handle() {
        assert_eq!(canonical("foo-bar-2"), "foo-bar-2.myshopify.com");
    }

    #[test]
    fn test_parse_strips_userinfo_and_trailing_dot() {
        assert_eq!(
            canonical("https://user:pw@foo.myshopify.com./"),
            "foo.myshopify.com"
        );
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ShopDomain::parse(""), Err(ShopDomainError::Empty));
        assert_eq!(ShopDomain::parse("https://"), Err(ShopDomainError::Empty));
        assert_eq!(
            ShopDomain::parse(".myshopify.com"),
            Err(ShopDomainError::Empty)
        );
    }

    #[test]
    fn test_parse_foreign_domain() {
        assert!(matches!(
            ShopDomain::parse("evil.example.com"),
            Err(ShopDomainError::NotShopifyDomain(_))
        ));
        assert!(matches!(
            ShopDomain::parse("foo.myshopify.com.evil.io"),
            Err(ShopDomainError::NotShopifyDomain(_))
        ));
    }

    #[test]
    fn test_parse_invalid_handle_character() {
        assert_eq!(
            ShopDomain::parse("foo_bar.myshopify.com"),
            Err(ShopDomainError::InvalidCharacter('_'))
        );
        assert_eq!(
            ShopDomain::parse("a.b.myshopify.com"),
            Err(ShopDomainError::InvalidCharacter('.'))
        );
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(250);
        assert!(matches!(
            ShopDomain::parse(&long),
            Err(ShopDomainError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let inputs = [
            "https://Foo.myshopify.com:443/admin",
            "foo.shopify.com",
            "admin.shopify.com/store/foo",
            "FOO",
            "shop-1.myshopify.com",
        ];
        for raw in inputs {
            let once = ShopDomain::parse(raw).unwrap();
            let twice = ShopDomain::parse(once.as_str()).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn test_handle() {
        let shop = ShopDomain::parse("foo.myshopify.com").unwrap();
        assert_eq!(shop.handle(), "foo");
    }

    #[test]
    fn test_deserialize_canonicalizes() {
        let shop: ShopDomain = serde_json::from_str("\"https://FOO.myshopify.com/\"").unwrap();
        assert_eq!(shop.as_str(), "foo.myshopify.com");
        assert_eq!(serde_json::to_string(&shop).unwrap(), "\"foo.myshopify.com\"");

        assert!(serde_json::from_str::<ShopDomain>("\"example.com\"").is_err());
    }
}
