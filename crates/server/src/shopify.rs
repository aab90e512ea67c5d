//! Shopify Admin REST API client.
//!
//! Calls are made per tenant with the access token fetched from the vault:
//! `GET https://<shop>/admin/api/<version>/<resource>.json`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use shopgate_core::ShopDomain;
use tracing::{instrument, warn};

use crate::relay::UpstreamError;

/// Header carrying the Admin API access token.
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Admin API client.
#[derive(Debug, Clone)]
pub struct AdminApiClient {
    client: reqwest::Client,
    api_version: String,
    scheme: &'static str,
}

impl AdminApiClient {
    /// Create a client for `api_version`, bounding calls by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_version: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Failure(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_version: api_version.into(),
            scheme: "https",
        })
    }

    /// The URL of `resource` for `shop`.
    #[must_use]
    pub fn resource_url(&self, shop: &ShopDomain, resource: &str) -> String {
        format!(
            "{}://{shop}/admin/api/{}/{}.json",
            self.scheme,
            self.api_version,
            resource.trim_matches('/')
        )
    }

    /// Fetch `resource` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Timeout`] on timeout and
    /// [`UpstreamError::Failure`] on transport errors, non-2xx, or bad JSON.
    #[instrument(skip(self, token), fields(shop = %shop))]
    pub async fn get(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        resource: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        let response = self
            .client
            .get(self.resource_url(shop, resource))
            .header(ACCESS_TOKEN_HEADER, token.expose_secret())
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest("admin api", &e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "admin api returned error");
            return Err(UpstreamError::Failure(format!("admin api returned {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::Failure(format!("admin api response: {e}")))
    }
}
