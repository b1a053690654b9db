//! HTTP client shared foundation
//!
//! This module provides a shared HTTP client with:
//! - Configurable timeout and User-Agent
//! - Exponential backoff retry through [`crate::retry`]
//! - Status classification into transient and permanent errors

use crate::error::{ConfigError, RegistryError};
use crate::retry::{self, RetryPolicy};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent header
pub const DEFAULT_USER_AGENT: &str = concat!("stubsabot/", env!("CARGO_PKG_VERSION"));

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(timeout: Duration, user_agent: &str) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ConfigError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            policy: RetryPolicy::default(),
        })
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Get the retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET a JSON document; `Ok(None)` when the server answers 404
    ///
    /// Transient failures are retried; once the budget is spent the last
    /// error is wrapped in `SourceUnavailable`.
    pub async fn get_json_optional<T: DeserializeOwned>(
        &self,
        url: &str,
        package: &str,
        registry: &str,
    ) -> Result<Option<T>, RegistryError> {
        let result = retry::retry(self.policy, RegistryError::is_transient, || {
            self.fetch_once::<T>(url, package, registry)
        })
        .await;

        result.map_err(|failure| {
            if failure.exhausted {
                tracing::warn!(
                    package,
                    registry,
                    attempts = failure.attempts,
                    "giving up after repeated failures"
                );
                RegistryError::SourceUnavailable {
                    package: package.to_string(),
                    registry: registry.to_string(),
                    attempts: failure.attempts,
                    message: failure.error.to_string(),
                }
            } else {
                failure.error
            }
        })
    }

    /// A single request with no retry
    async fn fetch_once<T: DeserializeOwned>(
        &self,
        url: &str,
        package: &str,
        registry: &str,
    ) -> Result<Option<T>, RegistryError> {
        tracing::debug!(url, "GET");
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::timeout(package, registry)
            } else {
                RegistryError::network_error(package, registry, e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(status, package, registry)?;

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::timeout(package, registry)
            } else {
                RegistryError::network_error(package, registry, e.to_string())
            }
        })?;

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| RegistryError::InvalidResponse {
                package: package.to_string(),
                registry: registry.to_string(),
                message: format!("failed to parse JSON: {}", e),
            })
    }
}

/// Map a non-success status to an error
fn check_status(status: StatusCode, package: &str, registry: &str) -> Result<(), RegistryError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RegistryError::rate_limit_exceeded(registry));
    }
    if status.is_server_error() {
        return Err(RegistryError::ServerError {
            package: package.to_string(),
            registry: registry.to_string(),
            status: status.as_u16(),
        });
    }
    Err(RegistryError::ClientError {
        package: package.to_string(),
        registry: registry.to_string(),
        status: status.as_u16(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_http_client_with_config() {
        let client = HttpClient::with_config(Duration::from_secs(60), "test-agent/1.0");
        assert!(client.is_ok());
    }

    #[test]
    fn test_http_client_with_retry_policy() {
        let client = HttpClient::new()
            .unwrap()
            .with_retry_policy(RetryPolicy::none());
        assert_eq!(client.retry_policy().max_retries, 0);
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(30));
        assert!(DEFAULT_USER_AGENT.starts_with("stubsabot/"));
        assert_eq!(HttpClient::new().unwrap().retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_check_status_success() {
        assert!(check_status(StatusCode::OK, "foo", "PyPI").is_ok());
    }

    #[test]
    fn test_check_status_transient() {
        let err = check_status(StatusCode::BAD_GATEWAY, "foo", "PyPI").unwrap_err();
        assert!(matches!(err, RegistryError::ServerError { status: 502, .. }));
        assert!(err.is_transient());

        let err = check_status(StatusCode::TOO_MANY_REQUESTS, "foo", "PyPI").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_check_status_permanent() {
        let err = check_status(StatusCode::FORBIDDEN, "foo", "PyPI").unwrap_err();
        assert!(matches!(err, RegistryError::ClientError { status: 403, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_source_unavailable() {
        let client = HttpClient::with_config(Duration::from_secs(2), "test")
            .unwrap()
            .with_retry_policy(RetryPolicy::new(1, Duration::ZERO));
        let result: Result<Option<serde_json::Value>, _> = client
            .get_json_optional("http://127.0.0.1:9/pypi/foo/json", "foo", "PyPI")
            .await;
        match result {
            Err(RegistryError::SourceUnavailable { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected SourceUnavailable, got {:?}", other.map(|_| ())),
        }
    }
}
