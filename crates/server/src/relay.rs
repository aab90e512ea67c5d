//! Workflow engine relay.
//!
//! Verified requests that need background work are forwarded to the workflow
//! engine as `POST <WORKFLOW_ENGINE_URL>/webhook/<job>`, carrying the verified
//! tenant in `X-Shop-Domain` and the correlation id in `X-Correlation-Id`.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use shopgate_core::TenantIdentity;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

/// Header carrying the verified tenant to the workflow engine.
pub const SHOP_DOMAIN_HEADER: &str = "x-shop-domain";

/// Header carrying the correlation id to the workflow engine.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Errors calling an upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The call did not finish in time. Retryable.
    #[error("upstream timed out: {0}")]
    Timeout(String),

    /// Transport error or non-success status.
    #[error("upstream failed: {0}")]
    Failure(String),
}

impl UpstreamError {
    pub(crate) fn from_reqwest(target: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(target.to_owned())
        } else {
            Self::Failure(format!("{target}: {err}"))
        }
    }
}

/// What the workflow engine answered.
#[derive(Debug, Clone)]
pub struct RelayResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// HTTP client for the workflow engine.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    client: reqwest::Client,
    base_url: Url,
}

impl WorkflowClient {
    /// Create a client for the engine at `base_url`, bounding calls by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Failure(format!("http client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// URL a job is posted to.
    ///
    /// # Errors
    ///
    /// Returns an error if the job name does not form a valid URL path.
    pub fn job_url(&self, job: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(&format!("webhook/{job}"))
            .map_err(|e| UpstreamError::Failure(format!("invalid job url: {e}")))
    }

    /// Forward `body` to `job`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Timeout`] when the engine does not answer in
    /// time and [`UpstreamError::Failure`] on transport errors or non-2xx.
    #[instrument(skip(self, tenant, body, content_type), fields(shop = tenant.map(|t| t.shop.as_str())))]
    pub async fn forward(
        &self,
        job: &str,
        tenant: Option<&TenantIdentity>,
        correlation_id: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<RelayResponse, UpstreamError> {
        let url = self.job_url(job)?;

        let mut request = self
            .client
            .post(url)
            .header(CORRELATION_ID_HEADER, correlation_id)
            .body(body);
        if let Some(tenant) = tenant {
            request = request.header(SHOP_DOMAIN_HEADER, tenant.shop.as_str());
        }
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest("workflow engine", &e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "workflow engine rejected job");
            return Err(UpstreamError::Failure(format!(
                "workflow engine returned {status}"
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest("workflow engine", &e))?;

        debug!(status = status.as_u16(), bytes = body.len(), "job relayed");
        Ok(RelayResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{Router, http::HeaderMap, routing::post};
    use shopgate_core::ShopDomain;

    use super::*;

    async fn spawn_engine(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[test]
    fn test_job_url() {
        let client = WorkflowClient::new(
            Url::parse("https://engine.example.com/hooks/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.job_url("sync-orders").unwrap().as_str(),
            "https://engine.example.com/hooks/webhook/sync-orders"
        );
    }

    #[tokio::test]
    async fn test_forward_carries_tenant_and_correlation() {
        let router = Router::new().route(
            "/webhook/{job}",
            post(|headers: HeaderMap, body: Bytes| async move {
                let shop = headers
                    .get(SHOP_DOMAIN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                let corr = headers
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                format!("{shop}|{corr}|{}", String::from_utf8_lossy(&body))
            }),
        );
        let client = WorkflowClient::new(spawn_engine(router).await, Duration::from_secs(2)).unwrap();
        let tenant = TenantIdentity::new(ShopDomain::parse("foo").unwrap());

        let response = client
            .forward("sync", Some(&tenant), "req-9", Bytes::from_static(b"hello"), None)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"foo.myshopify.com|req-9|hello");
    }

    #[tokio::test]
    async fn test_non_success_is_failure() {
        let router = Router::new().route(
            "/webhook/{job}",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let client = WorkflowClient::new(spawn_engine(router).await, Duration::from_secs(2)).unwrap();

        let err = client
            .forward("sync", None, "req-1", Bytes::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Failure(_)));
    }

    #[tokio::test]
    async fn test_slow_engine_is_timeout() {
        let router = Router::new().route(
            "/webhook/{job}",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let client =
            WorkflowClient::new(spawn_engine(router).await, Duration::from_millis(100)).unwrap();

        let err = client
            .forward("sync", None, "req-1", Bytes::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
    }
}
