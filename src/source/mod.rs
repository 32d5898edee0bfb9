//! Wiki content source
//!
//! Fetches raw page content and page listings from a Confluence-style wiki
//! REST API. The pipeline only depends on the [`ContentSource`] trait, so
//! tests (and alternative backends) can substitute their own page supply.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Immutable source-of-truth input for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub source_id: String,
    pub title: String,
    /// Opaque upstream version token; compared only for equality.
    pub version: String,
    pub raw_body: String,
    pub url: String,
}

/// Abstract page supplier.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch a single page by id.
    async fn fetch_page(&self, page_id: &str) -> Result<RawPage>;

    /// List the page ids of a space.
    async fn fetch_space_page_ids(&self, space_key: &str) -> Result<Vec<String>>;
}

/// REST client for the wiki API.
pub struct WikiClient {
    base_url: String,
    username: String,
    api_token: String,
    client: reqwest::Client,
    max_retries: usize,
}

const SPACE_PAGE_LIMIT: usize = 100;

impl WikiClient {
    /// Create a new wiki client.
    pub fn new(base_url: &str, username: &str, api_token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            api_token: api_token.to_string(),
            client: reqwest::Client::new(),
            max_retries: 3,
        }
    }

    /// Override the retry budget for transient failures.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn page_url(&self, page_id: &str) -> String {
        format!("{}/pages/{}", self.base_url, page_id)
    }

    /// GET with bounded exponential backoff on transient failures.
    async fn get_with_retry(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            let result = self
                .client
                .get(url)
                .basic_auth(&self.username, Some(&self.api_token))
                .query(query)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if is_transient_status(response.status()) => {
                    tracing::warn!(
                        "wiki request to {} returned {} (attempt {})",
                        url,
                        response.status(),
                        attempt + 1
                    );
                    last_error = Some(format!("status {}", response.status()));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("wiki request failed: {} - {}", status, body);
                }
                Err(e) => {
                    tracing::warn!("wiki request to {} failed (attempt {}): {}", url, attempt + 1, e);
                    last_error = Some(e.to_string());
                }
            }

            tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
        }

        Err(PipelineError::Transient(format!(
            "wiki request to {} exhausted retries: {}",
            url,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        ))
        .into())
    }
}

#[async_trait]
impl ContentSource for WikiClient {
    async fn fetch_page(&self, page_id: &str) -> Result<RawPage> {
        let url = format!("{}/rest/api/content/{}", self.base_url, page_id);
        let response = self
            .get_with_retry(&url, &[("expand", "body.storage,version".to_string())])
            .await?;

        let page: PageResponse = response
            .json()
            .await
            .context("Failed to parse wiki page response")?;

        Ok(RawPage {
            url: self.page_url(&page.id),
            source_id: page.id,
            title: page.title,
            version: page.version.map(|v| v.number.to_string()).unwrap_or_default(),
            raw_body: page.body.map(|b| b.storage.value).unwrap_or_default(),
        })
    }

    async fn fetch_space_page_ids(&self, space_key: &str) -> Result<Vec<String>> {
        let url = format!("{}/rest/api/content", self.base_url);
        let mut ids = Vec::new();
        let mut start = 0usize;

        loop {
            let response = self
                .get_with_retry(
                    &url,
                    &[
                        ("spaceKey", space_key.to_string()),
                        ("start", start.to_string()),
                        ("limit", SPACE_PAGE_LIMIT.to_string()),
                    ],
                )
                .await?;

            let listing: SpaceListing = response
                .json()
                .await
                .context("Failed to parse space listing response")?;

            let batch = listing.results.len();
            ids.extend(listing.results.into_iter().map(|entry| entry.id));

            if batch < SPACE_PAGE_LIMIT {
                break;
            }
            start += batch;
        }

        Ok(ids)
    }
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

// Wiki API wire types

#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
    title: String,
    version: Option<VersionInfo>,
    body: Option<PageBody>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    number: i64,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    storage: StorageBody,
}

#[derive(Debug, Deserialize)]
struct StorageBody {
    value: String,
}

#[derive(Debug, Deserialize)]
struct SpaceListing {
    results: Vec<SpaceEntry>,
}

#[derive(Debug, Deserialize)]
struct SpaceEntry {
    id: String,
}
