//! Trust protocols accepted by the request verifier.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a protocol name is not recognized.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown protocol: {0}")]
pub struct ProtocolParseError(pub String);

/// The trust domain an inbound request was authenticated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Platform-forwarded app proxy request signed over its query string.
    ProxySignature,
    /// Platform webhook signed over the raw body.
    WebhookHmac,
    /// Embedded-app session token (HS256 JWT).
    SessionToken,
    /// Backend-to-backend shared secret header.
    SharedSecret,
}

impl Protocol {
    /// All protocols, in dispatch order.
    pub const ALL: [Self; 4] = [
        Self::ProxySignature,
        Self::WebhookHmac,
        Self::SessionToken,
        Self::SharedSecret,
    ];

    /// Returns the string representation used in logs and the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProxySignature => "proxy_signature",
            Self::WebhookHmac => "webhook_hmac",
            Self::SessionToken => "session_token",
            Self::SharedSecret => "shared_secret",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = ProtocolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ProtocolParseError(s.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_from_str_agree() {
        for protocol in Protocol::ALL {
            let parsed: Protocol = protocol.to_string().parse().unwrap();
            assert_eq!(parsed, protocol);
        }
    }

    #[test]
    fn test_unknown_protocol() {
        assert!("basic_auth".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Protocol::WebhookHmac).unwrap();
        assert_eq!(json, "\"webhook_hmac\"");
    }
}
