//! App proxy signature verification.
//!
//! The platform signs app proxy requests over their query parameters:
//! parameters other than `signature` are sorted by name, values of repeated
//! names are joined with `,`, and each `name=value` is concatenated with no
//! separator. The signature is the lowercase hex HMAC-SHA256 of that string.

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use shopgate_core::{ShopDomain, TenantIdentity};

use super::{CheckResult, InboundRequest, compare};

/// Query parameter carrying the signature.
pub const SIGNATURE_PARAM: &str = "signature";

/// Build the message the platform signs from decoded query pairs.
#[must_use]
pub fn proxy_message<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        let key = key.into();
        if key == SIGNATURE_PARAM {
            continue;
        }
        grouped.entry(key).or_default().push(value.into());
    }

    grouped
        .into_iter()
        .map(|(key, values)| format!("{key}={}", values.join(",")))
        .collect()
}

/// Compute the hex signature of `message` under `secret`.
#[must_use]
pub fn sign(secret: &[u8], message: &str) -> String {
    hex::encode(compare::hmac_sha256(secret, message.as_bytes()))
}

/// Verify an app proxy request. The tenant is the `shop` parameter.
pub(super) fn verify(secrets: &[SecretString], request: &InboundRequest) -> CheckResult {
    let pairs = request.query_pairs();

    let provided = pairs
        .iter()
        .find_map(|(k, v)| (k == SIGNATURE_PARAM).then(|| v.to_ascii_lowercase()))
        .ok_or_else(|| "missing signature parameter".to_string())?;

    let shop = pairs
        .iter()
        .find_map(|(k, v)| (k == "shop").then_some(v.as_str()))
        .map(ShopDomain::parse)
        .transpose()
        .map_err(|e| format!("invalid shop parameter: {e}"))?;

    let message = proxy_message(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let expected = secrets
        .iter()
        .map(|secret| sign(secret.expose_secret().as_bytes(), &message));

    if compare::matches_any(expected, provided.as_bytes()) {
        Ok(shop.map(TenantIdentity::new))
    } else {
        Err("proxy signature mismatch".to_string())
    }
}
