//! reqwest-backed BookStack API client.
//!
//! Every request goes through [`RetryPolicy`]: transport failures and
//! configured status codes are retried with exponential backoff; any other
//! non-2xx status fails at once.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::HttpSettings;

use super::{ApiClient, HttpError};

/// Retry policy for upstream requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    pub backoff_multiplier: f64,

    /// Response statuses worth retrying
    pub retry_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&HttpSettings::default())
    }
}

impl RetryPolicy {
    /// Build a policy from the `http_config` block
    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self {
            max_attempts: settings.retry_count + 1,
            initial_delay_ms: (settings.backoff_factor.max(0.0) * 1000.0) as u64,
            max_delay_ms: 120_000,
            backoff_multiplier: 2.0,
            retry_codes: settings.retry_codes.clone(),
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Check if a response status is in the retry allowlist
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_codes.contains(&status)
    }
}

/// API client with default headers, timeout and retry
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client from HTTP settings and the resolved header set
    pub fn new(settings: &HttpSettings, headers: &BTreeMap<String, String>) -> Result<Self> {
        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .with_context(|| format!("Invalid HTTP header name: {}", key))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for HTTP header: {}", key))?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .timeout(Duration::from_secs(settings.timeout))
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            retry: RetryPolicy::from_settings(settings),
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, HttpError> {
        let mut attempt = 1;

        loop {
            debug!(url, attempt, "GET");
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    if self.retry.is_retryable_status(status) && self.retry.should_retry(attempt) {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!(url, status, attempt, ?delay, "Retryable status, backing off");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(HttpError::Status {
                        status,
                        url: url.to_string(),
                    });
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect() || e.is_request();
                    if transient && self.retry.should_retry(attempt) {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!(url, attempt, ?delay, error = %e, "Request failed, backing off");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(HttpError::Transport {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl ApiClient for HttpClient {
    async fn get_json(&self, url: &str) -> Result<Value, HttpError> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|e| HttpError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let response = self.send(url).await?;
        let body = response.bytes().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        Ok(body.to_vec())
    }
}
