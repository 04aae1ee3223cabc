//! Catalog API client implementation

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::models::{ErrorResponse, Lyrics, SearchResult, SearchScope};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Maximum search query length
const MAX_QUERY_LENGTH: usize = 512;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Music catalog API client
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http_client: Client,
    base_url: String,
    max_retries: u32,
}

impl CatalogClient {
    /// Create a new catalog client for the given base URL
    ///
    /// # Errors
    /// Returns `CatalogError::MissingBaseUrl` if the URL is empty
    pub fn new(base_url: impl Into<String>) -> CatalogResult<Self> {
        let base_url = base_url.into();
        if base_url.is_empty() {
            return Err(CatalogError::MissingBaseUrl);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Tunedock/1.0")
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create a catalog client from the `CATALOG_API_URL` environment variable
    ///
    /// # Errors
    /// - `CatalogError::MissingBaseUrl` if the variable is not set or empty
    pub fn from_env() -> CatalogResult<Self> {
        match std::env::var("CATALOG_API_URL") {
            Ok(url) if url.is_empty() => Err(CatalogError::MissingBaseUrl),
            Ok(url) => Self::new(url),
            Err(_) => Err(CatalogError::MissingBaseUrl),
        }
    }

    /// Override the retry budget (mainly useful in tests)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate a search query
    fn validate_query(query: &str) -> CatalogResult<&str> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidInput(
                "search query cannot be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_QUERY_LENGTH {
            return Err(CatalogError::InvalidInput(format!(
                "search query too long (max {} characters)",
                MAX_QUERY_LENGTH
            )));
        }
        Ok(trimmed)
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> CatalogResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CatalogResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Catalog request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make a GET request and handle common error cases
    async fn make_request(&self, path: &str, params: &[(&str, &str)]) -> CatalogResult<String> {
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CatalogError::Timeout
                } else {
                    CatalogError::Http(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Catalog API rate limited");
            return Err(CatalogError::RateLimited);
        }

        let text = response.text().await.map_err(CatalogError::Http)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.message)
                .unwrap_or_else(|_| text.clone());
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(text)
    }

    /// Search the catalog for tracks matching a free-text query
    ///
    /// # Arguments
    /// * `query` - Free text, conventionally `"{title} {artist}"`
    /// * `scope` - Catalog section to search (`songs` or `videos`)
    ///
    /// # Errors
    /// - `CatalogError::InvalidInput` - If the query is empty or too long
    /// - `CatalogError::Api` - If the catalog returns an error status
    /// - `CatalogError::Http` - If the HTTP request fails
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, scope: SearchScope) -> CatalogResult<Vec<SearchResult>> {
        let query = Self::validate_query(query)?;

        debug!(query = %query, scope = %scope, "Searching catalog");

        let text = self
            .with_retry(|| async {
                self.make_request("/search", &[("q", query), ("filter", scope.as_str())])
                    .await
            })
            .await?;

        let results: Vec<SearchResult> = serde_json::from_str(&text)?;

        debug!(
            query = %query,
            result_count = results.len(),
            "Catalog search completed"
        );

        Ok(results)
    }

    /// Look up lyrics for a catalog track
    ///
    /// Returns `Ok(None)` when the track has no lyrics, which the catalog
    /// signals with a 404.
    ///
    /// # Errors
    /// - `CatalogError::InvalidInput` - If the track id is empty
    /// - `CatalogError::Api` - If the catalog returns a non-404 error status
    #[instrument(skip(self))]
    pub async fn lyrics(&self, track_id: &str) -> CatalogResult<Option<Lyrics>> {
        if track_id.trim().is_empty() {
            return Err(CatalogError::InvalidInput(
                "track id cannot be empty".to_string(),
            ));
        }

        let path = format!("/lyrics/{}", track_id.trim());
        let result = self
            .with_retry(|| async { self.make_request(&path, &[]).await })
            .await;

        match result {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(CatalogError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_base_url() {
        let result = CatalogClient::new("");
        assert!(matches!(result, Err(CatalogError::MissingBaseUrl)));
    }

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = CatalogClient::new("http://localhost:9000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_validate_query_empty() {
        let result = CatalogClient::validate_query("   ");
        assert!(matches!(result, Err(CatalogError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_query_too_long() {
        let long_query = "a".repeat(MAX_QUERY_LENGTH + 1);
        let result = CatalogClient::validate_query(&long_query);
        assert!(matches!(result, Err(CatalogError::InvalidInput(_))));
    }

    #[test]
    fn test_validate_query_trims() {
        let result = CatalogClient::validate_query("  Midnight Drive  ");
        assert!(matches!(result, Ok("Midnight Drive")));
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(CatalogError::Timeout.is_retryable());
        assert!(CatalogError::RateLimited.is_retryable());
        assert!(CatalogError::Api {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_retryable());
        assert!(!CatalogError::Api {
            status: 400,
            message: "bad request".to_string()
        }
        .is_retryable());
        assert!(!CatalogError::MissingBaseUrl.is_retryable());
    }
}
