//! Pluggable HTTP transport.

use crate::error::Result;
use std::time::Duration;

/// Status and body of an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            body: body.into(),
        }
    }

    /// Status in `200..300`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for the network layer under the prediction client.
///
/// Connection handling, TLS and timeout enforcement belong to the
/// implementation. Any failure to obtain a response should be returned as
/// `Error::FetchError` (or `Error::Timeout`); a response with any status is
/// returned as `Ok`.
#[allow(async_fn_in_trait)]
pub trait HttpTransport: Send + Sync {
    /// POST `body` to `url`.
    ///
    /// # Errors
    /// Returns `Err` if no response could be obtained within `timeout`.
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<HttpResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(199, "").is_success());
        assert!(!HttpResponse::new(300, "").is_success());
        assert!(!HttpResponse::new(500, "").is_success());
    }
}
