//! Session token verification.
//!
//! Embedded app frontends send a short-lived HS256 JWT signed with the app
//! secret, either as `Authorization: Bearer <token>` or as the `id_token`
//! query parameter. The token's `dest` claim names the shop.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shopgate_core::{STOREFRONT_SUFFIX, ShopDomain, TenantIdentity};

use super::{CheckResult, InboundRequest};

/// Query parameter that may carry the token on document requests.
pub const ID_TOKEN_PARAM: &str = "id_token";

/// The `aud` claim: a single audience or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// Whether `expected` is among the audiences.
    #[must_use]
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    pub dest: String,
    pub aud: Audience,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// Pull the raw token out of the request.
fn extract_token(request: &InboundRequest) -> Option<String> {
    let bearer = request.header("authorization").and_then(|value| {
        let (scheme, token) = value.trim().split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim().to_owned())
    });

    bearer
        .filter(|t| !t.is_empty())
        .or_else(|| request.query_param(ID_TOKEN_PARAM).filter(|t| !t.is_empty()))
}

/// Decode `token` and check its signature and claims.
///
/// # Errors
///
/// Returns a reason string when the signature, algorithm, time window,
/// audience or destination is wrong.
pub fn decode(
    token: &str,
    key: &SecretString,
    audience: &str,
    leeway_secs: i64,
    now: DateTime<Utc>,
) -> Result<SessionClaims, String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let claims = jsonwebtoken::decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(key.expose_secret().as_bytes()),
        &validation,
    )
    .map_err(|e| format!("invalid session token: {e}"))?
    .claims;

    let now = now.timestamp();

    if let Some(exp) = claims.exp
        && now >= exp.saturating_add(leeway_secs)
    {
        return Err("session token expired".to_string());
    }

    if let Some(nbf) = claims.nbf
        && now < nbf.saturating_sub(leeway_secs)
    {
        return Err("session token not yet valid".to_string());
    }

    if !claims.aud.contains(audience) {
        return Err("session token audience mismatch".to_string());
    }

    let dest_host = claims
        .dest
        .split_once("://")
        .map_or(claims.dest.as_str(), |(_, rest)| rest)
        .trim_end_matches('/');
    if !dest_host.to_ascii_lowercase().ends_with(STOREFRONT_SUFFIX) {
        return Err("session token destination is not a shop".to_string());
    }

    Ok(claims)
}

pub(super) fn verify(
    key: &SecretString,
    audience: &str,
    leeway_secs: i64,
    request: &InboundRequest,
    now: DateTime<Utc>,
) -> CheckResult {
    let token = extract_token(request).ok_or_else(|| "missing session token".to_string())?;
    let claims = decode(&token, key, audience, leeway_secs, now)?;

    let shop = ShopDomain::parse(&claims.dest)
        .map_err(|e| format!("invalid session token destination: {e}"))?;

    if let Some(iss) = &claims.iss {
        let issuer = ShopDomain::parse(iss)
            .map_err(|e| format!("invalid session token issuer: {e}"))?;
        if issuer != shop {
            return Err("session token issuer does not match destination".to_string());
        }
    }

    Ok(Some(TenantIdentity::new(shop)))
}
