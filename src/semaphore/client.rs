//! Semaphore UI API client implementation.
//!
//! This module provides the HTTP client for the project environment endpoints
//! of the Semaphore UI REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, header};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ProviderConfig;
use crate::error::{ApiError, ProviderError, Result};

use super::api::EnvironmentApi;
use super::types::{Environment, EnvironmentRequest};

/// Maximum number of attempts for read requests.
const MAX_ATTEMPTS: u32 = 3;

/// Delay between retries in milliseconds, multiplied by the attempt number.
const RETRY_DELAY_MS: u64 = 1000;

/// Fallback wait when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Upper bound on a server-requested wait between read attempts.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Semaphore UI API client.
#[derive(Clone)]
pub struct SemaphoreClient {
    /// HTTP client.
    client: Client,
    /// API base URL without trailing slash.
    base_url: String,
    /// Bearer token.
    token: String,
    /// Base retry delay.
    retry_delay: Duration,
}

impl SemaphoreClient {
    /// Creates a new client from resolved provider settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        if config.tls_skip_verify {
            debug!("TLS certificate verification is disabled");
        }

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Sets the base delay between read retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn environments_path(project_id: i64) -> String {
        format!("/project/{project_id}/environment")
    }

    fn environment_path(project_id: i64, environment_id: i64) -> String {
        format!("/project/{project_id}/environment/{environment_id}")
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header(header::ACCEPT, "application/json")
            .bearer_auth(&self.token)
    }

    /// Sends a request once and maps error statuses.
    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request to {path} failed: {e}")))?;

        let status = response.status();
        trace!("{path} responded with {status}");

        if status.is_success() {
            return Ok(response);
        }

        let err = match status.as_u16() {
            401 | 403 => ApiError::AuthenticationFailed {
                message: format!("{status} for {path}, check the API token"),
            },
            404 => ApiError::NotFound {
                path: path.to_string(),
            },
            429 => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                ApiError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            code => {
                let body = response.text().await.unwrap_or_default();
                ApiError::request_failed(code, body.trim())
            }
        };

        Err(err.into())
    }

    /// Sends a GET, retrying transient failures.
    async fn get_with_retry(&self, path: &str) -> Result<Response> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = last_error
                    .as_ref()
                    .and_then(ProviderError::retry_delay_secs)
                    .map_or(self.retry_delay * attempt, |secs| {
                        Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS))
                    });
                debug!(
                    "Retry attempt {attempt} of {} for {path} in {delay:?}",
                    MAX_ATTEMPTS - 1
                );
                tokio::time::sleep(delay).await;
            }

            match self.send(self.request(Method::GET, path), path).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::from(ApiError::network("Max retries exceeded"))))
    }

    async fn parse_environment(response: Response) -> Result<Environment> {
        response.json().await.map_err(|e| {
            ApiError::InvalidResponse {
                message: format!("Failed to parse environment: {e}"),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for SemaphoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemaphoreClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EnvironmentApi for SemaphoreClient {
    async fn create_environment(&self, request: &EnvironmentRequest) -> Result<Environment> {
        let path = Self::environments_path(request.project_id);
        debug!("POST {path}");

        let response = self
            .send(self.request(Method::POST, &path).json(request), &path)
            .await?;
        Self::parse_environment(response).await
    }

    async fn get_environment(&self, project_id: i64, environment_id: i64) -> Result<Environment> {
        let path = Self::environment_path(project_id, environment_id);
        debug!("GET {path}");

        let response = self.get_with_retry(&path).await?;
        Self::parse_environment(response).await
    }

    async fn update_environment(
        &self,
        environment_id: i64,
        request: &EnvironmentRequest,
    ) -> Result<()> {
        let path = Self::environment_path(request.project_id, environment_id);
        debug!("PUT {path}");

        self.send(self.request(Method::PUT, &path).json(request), &path)
            .await?;
        Ok(())
    }

    async fn delete_environment(&self, project_id: i64, environment_id: i64) -> Result<()> {
        let path = Self::environment_path(project_id, environment_id);
        debug!("DELETE {path}");

        self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(())
    }
}
