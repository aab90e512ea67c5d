//! Backend shared secret verification.
//!
//! Trusted backend callers present the secret in `X-Shopgate-Secret` and
//! name the tenant with `X-Shop-Domain` or the `shop` query parameter.

use secrecy::{ExposeSecret, SecretString};
use shopgate_core::TenantIdentity;

use super::{CheckResult, InboundRequest, compare};
use crate::tenant;

/// Header carrying the shared secret.
pub const SHARED_SECRET_HEADER: &str = "x-shopgate-secret";

pub(super) fn verify(secret: &SecretString, request: &InboundRequest) -> CheckResult {
    let provided = request
        .header(SHARED_SECRET_HEADER)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "missing shared secret header".to_string())?;

    if !compare::secure_eq(secret.expose_secret().as_bytes(), provided.as_bytes()) {
        return Err("shared secret mismatch".to_string());
    }

    Ok(tenant::from_request(request).map(TenantIdentity::new))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::tests::{BACKEND_SECRET, request};

    fn backend() -> SecretString {
        SecretString::from(BACKEND_SECRET)
    }

    #[test]
    fn test_matching_secret_passes() {
        let req = request(
            "/api/credentials?shop=foo",
            &[(SHARED_SECRET_HEADER, BACKEND_SECRET)],
            b"",
        );
        let tenant = verify(&backend(), &req).unwrap().unwrap();
        assert_eq!(tenant.shop.as_str(), "foo.myshopify.com");
    }

    #[test]
    fn test_prefix_of_secret_fails() {
        let req = request(
            "/api/credentials",
            &[(SHARED_SECRET_HEADER, &BACKEND_SECRET[..4])],
            b"",
        );
        assert!(verify(&backend(), &req).is_err());
    }

    #[test]
    fn test_same_length_wrong_secret_fails() {
        let mut last = BACKEND_SECRET.to_string();
        last.pop();
        last.push('#');
        let first = format!("#{}", &BACKEND_SECRET[1..]);

        for wrong in [last, first] {
            assert_eq!(wrong.len(), BACKEND_SECRET.len());
            let req = request(
                "/api/credentials",
                &[(SHARED_SECRET_HEADER, wrong.as_str())],
                b"",
            );
            assert_eq!(verify(&backend(), &req).unwrap_err(), "shared secret mismatch");
        }
    }

    #[test]
    fn test_missing_header_fails() {
        let req = request("/api/credentials", &[], b"");
        assert!(verify(&backend(), &req).is_err());
    }

    #[test]
    fn test_empty_header_fails() {
        let req = request("/api/credentials", &[(SHARED_SECRET_HEADER, "")], b"");
        assert!(verify(&backend(), &req).is_err());
    }
}
