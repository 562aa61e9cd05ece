//! `reqwest`-backed transport.

use super::transport::{HttpResponse, HttpTransport};
use crate::error::Result;
use std::time::Duration;

/// HTTP transport built on a shared `reqwest::Client`.
///
/// Cloning is cheap; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use cmab_cache::client::{DefaultCmabClient, ReqwestTransport};
///
/// let client = DefaultCmabClient::new(ReqwestTransport::new());
/// ```
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, TLS roots, pool sizing).
    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let mut request = self.client.post(url).timeout(timeout).body(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!("✓ POST {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}
