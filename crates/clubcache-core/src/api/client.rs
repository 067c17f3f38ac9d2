//! API client for the page database's REST API.
//!
//! This module provides the `NotionClient` struct for making authenticated
//! requests to read database metadata and list database records.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{ContainerMetadata, RawRecord};

use super::{ApiError, RemoteSource};

// ============================================================================
// Constants
// ============================================================================

/// Base URL for the REST API
const API_BASE_URL: &str = "https://api.notion.com/v1";

/// API version pinned for response shapes we decode.
const NOTION_VERSION: &str = "2022-06-28";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Largest page size the query endpoint accepts.
const QUERY_PAGE_SIZE: u32 = 100;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<RawRecord>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

/// API client for the page database.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    token: String,
    base_url: String,
}

impl NotionClient {
    /// Create a new API client authenticated with an integration token
    pub fn new(token: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_base_url(token, API_BASE_URL)
    }

    /// Create a client against a different API root (used for proxies and tests)
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .header(header::ACCEPT, "application/json")
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, backing off and retrying while rate limited.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e)))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self
            .send_with_retry(url, || self.authorized(self.client.get(url)))
            .await?;
        Self::parse_json(response, url).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T, ApiError> {
        let response = self
            .send_with_retry(url, || self.authorized(self.client.post(url)).json(body))
            .await?;
        Self::parse_json(response, url).await
    }

    // ===== Data Fetching Methods =====

    /// Retrieve a database's metadata
    pub async fn retrieve_database(&self, database_id: &str) -> Result<ContainerMetadata, ApiError> {
        let url = format!("{}/databases/{}", self.base_url, database_id);
        self.get(&url).await
    }

    /// Query every page of a database, following pagination cursors
    pub async fn query_database(&self, database_id: &str) -> Result<Vec<RawRecord>, ApiError> {
        let url = format!("{}/databases/{}/query", self.base_url, database_id);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let request = QueryRequest {
                page_size: QUERY_PAGE_SIZE,
                start_cursor: cursor.as_deref(),
            };
            let page: QueryResponse = self.post(&url, &request).await?;
            debug!(database = database_id, count = page.results.len(), "Fetched record page");
            records.extend(page.results);

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(records)
    }

    /// Download an attached file. Hosted file URLs are pre-signed, so no
    /// authorization header is sent.
    pub async fn download_file(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.send_with_retry(url, || self.client.get(url)).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RemoteSource for NotionClient {
    async fn fetch_container_metadata(&self, database_id: &str) -> Result<ContainerMetadata, ApiError> {
        self.retrieve_database(database_id).await
    }

    async fn fetch_records(&self, database_id: &str) -> Result<Vec<RawRecord>, ApiError> {
        self.query_database(database_id).await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        self.download_file(url).await
    }
}
