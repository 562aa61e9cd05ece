//! Prediction service client.
//!
//! `DefaultCmabClient` turns a `(rule, user, attributes, uuid)` tuple into one
//! POST against the prediction service and extracts the variation id from the
//! answer. Failed attempts are retried with exponential backoff according to
//! its [`RetryPolicy`].

use crate::config::{CmabConfig, RetryPolicy, DEFAULT_PREDICTION_ENDPOINT, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{Error, Result};
use crate::key::Attributes;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

#[cfg(feature = "http")]
pub mod http;
pub mod transport;

#[cfg(feature = "http")]
pub use http::ReqwestTransport;
pub use transport::{HttpResponse, HttpTransport};

const JSON_HEADERS: [(&str, &str); 1] = [("Content-Type", "application/json")];

/// Trait for anything that can produce a variation id for a CMAB rule.
///
/// The decision service only depends on this seam, so tests can substitute
/// a scripted client.
#[allow(async_fn_in_trait)]
pub trait CmabClient: Send + Sync {
    /// Fetch the variation id for `user_id` under `rule_id`.
    ///
    /// # Errors
    /// Returns `Err` once the request has failed for good.
    async fn fetch_decision(
        &self,
        rule_id: &str,
        user_id: &str,
        attributes: &Attributes,
        cmab_uuid: &str,
    ) -> Result<String>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Serialize)]
struct PredictionRequest<'a> {
    instances: [PredictionInstance<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictionInstance<'a> {
    visitor_id: &'a str,
    experiment_id: &'a str,
    attributes: Vec<PredictionAttribute<'a>>,
    #[serde(rename = "cmabUUID")]
    cmab_uuid: &'a str,
}

#[derive(Serialize)]
struct PredictionAttribute<'a> {
    id: &'a str,
    value: &'a Value,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Encode the prediction request body.
///
/// # Errors
/// Returns `Error::SerializationError` if encoding fails.
pub fn build_request_body(
    rule_id: &str,
    user_id: &str,
    attributes: &Attributes,
    cmab_uuid: &str,
) -> Result<String> {
    let request = PredictionRequest {
        instances: [PredictionInstance {
            visitor_id: user_id,
            experiment_id: rule_id,
            attributes: attributes
                .iter()
                .map(|(id, value)| PredictionAttribute {
                    id,
                    value,
                    kind: "custom_attribute",
                })
                .collect(),
            cmab_uuid,
        }],
    };

    serde_json::to_string(&request).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Extract `predictions[0].variationId` from a response body.
///
/// # Errors
/// Returns `Error::InvalidResponse` if the body is not JSON or lacks that shape.
pub fn parse_prediction(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::InvalidResponse(format!("Body is not valid JSON: {}", e)))?;

    let first = value
        .get("predictions")
        .and_then(Value::as_array)
        .and_then(|predictions| predictions.first())
        .ok_or_else(|| Error::InvalidResponse("Missing or empty predictions array".to_string()))?;

    first
        .get("variationId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidResponse("predictions[0].variationId missing or not a string".to_string())
        })
}

// ============================================================================
// Default client
// ============================================================================

/// Retrying prediction client over a pluggable transport.
///
/// # Example
///
/// ```ignore
/// use cmab_cache::client::{DefaultCmabClient, ReqwestTransport};
/// use cmab_cache::config::RetryPolicy;
///
/// let client = DefaultCmabClient::new(ReqwestTransport::new())
///     .with_retry_policy(RetryPolicy::default().with_max_retries(5));
///
/// let variation = client.fetch_decision("exp_1", "user_1", &attrs, &uuid).await?;
/// ```
pub struct DefaultCmabClient<T: HttpTransport> {
    transport: T,
    retry_policy: RetryPolicy,
    prediction_endpoint: String,
    request_timeout: Duration,
}

impl<T: HttpTransport> DefaultCmabClient<T> {
    /// Client with the default endpoint, timeout and retry policy.
    pub fn new(transport: T) -> Self {
        DefaultCmabClient {
            transport,
            retry_policy: RetryPolicy::default(),
            prediction_endpoint: DEFAULT_PREDICTION_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Client taking endpoint, timeout and retry policy from `config`.
    pub fn from_config(transport: T, config: &CmabConfig) -> Self {
        DefaultCmabClient {
            transport,
            retry_policy: config.retry_policy.clone(),
            prediction_endpoint: config.prediction_endpoint.clone(),
            request_timeout: config.request_timeout,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_prediction_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.prediction_endpoint = endpoint.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `<endpoint>/predict/<rule_id>`
    pub fn prediction_url(&self, rule_id: &str) -> String {
        format!(
            "{}/predict/{}",
            self.prediction_endpoint.trim_end_matches('/'),
            rule_id
        )
    }

    /// One request, no retry.
    async fn attempt(&self, url: &str, body: String) -> Result<String> {
        let timeout = self.request_timeout;
        let response = tokio::time::timeout(
            timeout,
            self.transport.post(url, body, &JSON_HEADERS, timeout),
        )
        .await
        .map_err(|_| Error::Timeout(format!("CMAB request to {} exceeded {:?}", url, timeout)))?
        .map_err(|e| match e {
            Error::FetchError(_) | Error::Timeout(_) => e,
            other => Error::FetchError(format!("Transport failure for {}: {}", url, other)),
        })?;

        if !response.is_success() {
            return Err(Error::FetchError(format!(
                "HTTP {} from {}",
                response.status, url
            )));
        }

        parse_prediction(&response.body)
    }
}

impl<T: HttpTransport> CmabClient for DefaultCmabClient<T> {
    async fn fetch_decision(
        &self,
        rule_id: &str,
        user_id: &str,
        attributes: &Attributes,
        cmab_uuid: &str,
    ) -> Result<String> {
        let url = self.prediction_url(rule_id);
        let body = build_request_body(rule_id, user_id, attributes, cmab_uuid)?;
        let max_retries = self.retry_policy.max_retries;

        let mut attempt = 0;
        loop {
            let err = match self.attempt(&url, body.clone()).await {
                Ok(variation_id) => return Ok(variation_id),
                Err(e) => e,
            };

            if max_retries == 0 {
                error!("CMAB request for rule {} failed: {}", rule_id, err);
                return Err(err);
            }

            if attempt >= max_retries {
                error!(
                    "CMAB request for rule {} failed after {} retries: {}",
                    rule_id, max_retries, err
                );
                return Err(Error::FetchError(format!(
                    "Exhausted all {} retries for CMAB request to rule {}: {}",
                    max_retries, rule_id, err
                )));
            }

            let wait = self.retry_policy.backoff(attempt);
            warn!(
                "CMAB request for rule {} failed (attempt {}/{}): {}",
                rule_id,
                attempt + 1,
                max_retries + 1,
                err
            );
            info!("Retrying CMAB request (attempt {}) after {:?}", attempt + 2, wait);

            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
