//! HTTP fetcher for the upstream API
//!
//! Performs a GET against `API_URL + endpoint`, retrying transient failures
//! with exponential backoff. Any non-2xx status and any transport error is
//! retried; a 2xx response whose body is not JSON is not.

use crate::config::ApiSettings;
use crate::retry::RetryPolicy;
use collector_common::{CollectorError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

/// User-Agent sent on every request.
pub const USER_AGENT: &str = "DataCollector/1.0";

/// Failure of a single attempt
#[derive(Debug)]
enum AttemptError {
    Retryable(String),
    Malformed(String),
}

/// API client with a bounded retry budget
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl Fetcher {
    /// Create a new fetcher
    pub fn new(api: &ApiSettings, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .default_headers(default_headers(api.token.as_deref())?)
            .user_agent(USER_AGENT)
            .timeout(api.timeout())
            .build()
            .map_err(|e| CollectorError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: api.url.clone(),
            retry,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Full request URL for an endpoint suffix
    pub fn url_for(&self, endpoint: Option<&str>) -> String {
        format!("{}{}", self.base_url, endpoint.unwrap_or_default())
    }

    /// Fetch a JSON document, retrying transient failures
    #[instrument(name = "fetch", skip(self, params), fields(endpoint = endpoint.unwrap_or("")))]
    pub async fn fetch(
        &self,
        endpoint: Option<&str>,
        params: Option<&[(String, String)]>,
    ) -> Result<Value> {
        let url = self.url_for(endpoint);
        let params = params.unwrap_or_default();
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;

        loop {
            info!(url = %url, attempt, max_attempts, "Requesting API");

            match self.attempt(&url, params).await {
                Ok(value) => {
                    info!(url = %url, attempt, "API request succeeded");
                    return Ok(value);
                }
                Err(AttemptError::Malformed(message)) => {
                    error!(url = %url, error = %message, "API returned malformed JSON");
                    return Err(CollectorError::MalformedResponse { url, message });
                }
                Err(AttemptError::Retryable(message)) => {
                    error!(url = %url, attempt, max_attempts, error = %message, "API request failed");

                    if !self.retry.has_attempts_after(attempt) {
                        return Err(CollectorError::TransientFetch {
                            url,
                            attempts: attempt,
                            message,
                        });
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        url = %url,
                        retry_in_ms = delay.as_millis() as u64,
                        "Retrying API request after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<Value, AttemptError> {
        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(format!("request error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Retryable(format!("HTTP status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Retryable(format!("failed to read body: {e}")))?;

        serde_json::from_str(&body).map_err(|e| AttemptError::Malformed(e.to_string()))
    }
}

fn default_headers(token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| CollectorError::config("API_TOKEN contains invalid header characters"))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn api(url: &str, token: Option<&str>) -> ApiSettings {
        ApiSettings {
            url: url.to_string(),
            token: token.map(String::from),
            timeout_secs: 5,
            endpoint: String::new(),
        }
    }

    #[test]
    fn test_url_for_appends_endpoint() {
        let fetcher = Fetcher::new(&api("https://api.test/v1", None), RetryPolicy::default()).unwrap();

        assert_eq!(fetcher.url_for(Some("/items")), "https://api.test/v1/items");
        assert_eq!(fetcher.url_for(None), "https://api.test/v1");
    }

    #[test]
    fn test_default_headers_mark_token_sensitive() {
        let headers = default_headers(Some("abc")).unwrap();

        let auth = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer abc");
        assert!(auth.is_sensitive());
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        let err = default_headers(Some("abc\ndef")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_unreachable_host_exhausts_budget() {
        // Port 9 (discard) on localhost is closed in test environments
        let fetcher = Fetcher::new(
            &api("http://127.0.0.1:9", None),
            RetryPolicy::new(2, Duration::from_millis(5)),
        )
        .unwrap();

        let err = fetcher.fetch(None, None).await.unwrap_err();
        match err {
            CollectorError::TransientFetch { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
