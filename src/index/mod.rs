//! Search index client
//!
//! Defines the searchable record schema and submits record batches to the
//! search service. The pipeline depends on the [`SearchIndex`] trait; the
//! concrete client speaks the service's batch-action REST protocol and
//! supports a dry-run mode that skips submission entirely.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One unit of searchable content: a whole document or a single section.
///
/// `id` is a deterministic composite of page id, version, and section id,
/// so re-indexing the same version overwrites instead of duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub content: String,
    pub source_page_id: String,
    pub source_page_title: String,
    pub source_url: String,
    pub is_section: bool,
    pub section_id: String,
    pub section_title: String,
    pub section_level: i32,
    pub section_number: String,
    pub document_type: String,
    pub project_code: String,
    pub document_id: String,
    pub document_version: String,
    pub document_status: String,
    pub created_date: String,
    pub last_updated_date: String,
    pub document_owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub requirement_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Per-record submission outcome.
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub key: String,
    pub succeeded: bool,
    pub message: Option<String>,
}

/// Abstract search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Submit a record batch; returns one result per record.
    async fn upsert(&self, records: &[IndexRecord]) -> Result<Vec<SubmitResult>>;

    /// Delete records by id.
    async fn delete(&self, ids: &[String]) -> Result<()>;
}

/// REST client for the search service's batch document API.
pub struct SearchIndexClient {
    endpoint: String,
    index_name: String,
    api_key: String,
    api_version: String,
    dry_run: bool,
    client: reqwest::Client,
    max_retries: usize,
}

impl SearchIndexClient {
    /// Create a new search index client.
    pub fn new(endpoint: &str, index_name: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
            api_key: api_key.to_string(),
            api_version: "2023-11-01".to_string(),
            dry_run: false,
            client: reqwest::Client::new(),
            max_retries: 3,
        }
    }

    /// Skip all submission calls, logging what would have been sent.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    async fn submit_actions(&self, actions: Vec<serde_json::Value>) -> Result<BatchResponse> {
        let url = format!("{}/indexes/{}/docs/index", self.endpoint, self.index_name);
        let payload = serde_json::json!({ "value": actions });
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            let result = self
                .client
                .post(&url)
                .header("api-key", &self.api_key)
                .query(&[("api-version", self.api_version.as_str())])
                .json(&payload)
                .send()
                .await;

            match result {
                // 207 carries per-record statuses; decode rather than fail.
                Ok(response)
                    if response.status().is_success()
                        || response.status() == reqwest::StatusCode::MULTI_STATUS =>
                {
                    return response
                        .json()
                        .await
                        .context("Failed to parse index batch response");
                }
                Ok(response) if is_transient_status(response.status()) => {
                    tracing::warn!(
                        "index submission returned {} (attempt {})",
                        response.status(),
                        attempt + 1
                    );
                    last_error = Some(format!("status {}", response.status()));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("index submission failed: {} - {}", status, body);
                }
                Err(e) => {
                    tracing::warn!("index submission failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e.to_string());
                }
            }

            tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
        }

        Err(PipelineError::Transient(format!(
            "index submission exhausted retries: {}",
            last_error.unwrap_or_else(|| "unknown error".to_string())
        ))
        .into())
    }
}

#[async_trait]
impl SearchIndex for SearchIndexClient {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<Vec<SubmitResult>> {
        if self.dry_run {
            tracing::info!(
                "DRY RUN: would upsert {} records into index {}",
                records.len(),
                self.index_name
            );
            return Ok(records
                .iter()
                .map(|record| SubmitResult {
                    key: record.id.clone(),
                    succeeded: true,
                    message: None,
                })
                .collect());
        }

        let mut actions = Vec::with_capacity(records.len());
        for record in records {
            let mut action = serde_json::to_value(record).context("Failed to serialize record")?;
            if let serde_json::Value::Object(ref mut fields) = action {
                fields.insert("@search.action".to_string(), "mergeOrUpload".into());
            }
            actions.push(action);
        }

        tracing::info!(
            "upserting {} records into index {}",
            records.len(),
            self.index_name
        );
        let response = self.submit_actions(actions).await?;

        Ok(response
            .value
            .into_iter()
            .map(|item| SubmitResult {
                key: item.key,
                succeeded: item.status,
                message: item.error_message,
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if self.dry_run {
            tracing::info!("DRY RUN: would delete {} records", ids.len());
            return Ok(());
        }

        let actions = ids
            .iter()
            .map(|id| serde_json::json!({ "@search.action": "delete", "id": id }))
            .collect();

        let response = self.submit_actions(actions).await?;
        let failed = response.value.iter().filter(|item| !item.status).count();
        if failed > 0 {
            anyhow::bail!("{} of {} deletions failed", failed, ids.len());
        }
        Ok(())
    }
}

fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

// Search service wire types

#[derive(Debug, Deserialize)]
struct BatchResponse {
    value: Vec<BatchResponseItem>,
}

#[derive(Debug, Deserialize)]
struct BatchResponseItem {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}
