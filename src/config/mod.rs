//! Application and page configuration
//!
//! Application settings come from environment variables; the set of pages
//! and spaces to process lives in a JSON configuration file that the CLI
//! can list and edit. Missing required settings abort the invocation
//! before any processing starts.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default page configuration file path
pub const DEFAULT_PAGE_CONFIG: &str = "config/pages.json";

/// Wiki API settings
#[derive(Debug, Clone)]
pub struct WikiSettings {
    pub base_url: String,
    pub username: String,
    pub api_token: String,
}

/// Search index settings
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub endpoint: String,
    pub index_name: String,
    pub api_key: String,
}

/// AI service settings (present only when enrichment is enabled)
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub completion_model: String,
    pub embedding_model: String,
    pub max_tokens: usize,
}

/// Which records receive embedding vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbedScope {
    /// Only the whole-document record.
    #[default]
    FullDocument,
    /// The whole-document record and every section record.
    AllRecords,
}

/// Processing options
#[derive(Debug, Clone)]
pub struct ProcessingSettings {
    pub summarize: bool,
    pub vectorize: bool,
    pub embed_scope: EmbedScope,
    pub cache_dir: String,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            summarize: false,
            vectorize: false,
            embed_scope: EmbedScope::default(),
            cache_dir: ".cache".to_string(),
        }
    }
}

impl ProcessingSettings {
    /// Read processing options from the environment. Everything defaults.
    pub fn from_env() -> Self {
        Self {
            summarize: env_flag("ENABLE_SUMMARIZATION"),
            vectorize: env_flag("ENABLE_VECTORIZATION"),
            embed_scope: std::env::var("EMBED_SCOPE")
                .map(|value| parse_scope(&value))
                .unwrap_or_default(),
            cache_dir: std::env::var("CACHE_DIRECTORY").unwrap_or_else(|_| ".cache".to_string()),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub wiki: WikiSettings,
    pub search: SearchSettings,
    pub ai: Option<AiSettings>,
    pub processing: ProcessingSettings,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, PipelineError> {
        let wiki = WikiSettings {
            base_url: required("WIKI_BASE_URL")?,
            username: required("WIKI_USERNAME")?,
            api_token: required("WIKI_API_TOKEN")?,
        };
        let search = SearchSettings {
            endpoint: required("SEARCH_ENDPOINT")?,
            index_name: required("SEARCH_INDEX_NAME")?,
            api_key: required("SEARCH_API_KEY")?,
        };
        let processing = ProcessingSettings::from_env();

        let ai = if processing.summarize || processing.vectorize {
            Some(AiSettings {
                endpoint: required("AI_ENDPOINT")?,
                api_key: std::env::var("AI_API_KEY").ok(),
                completion_model: std::env::var("AI_COMPLETION_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                embedding_model: std::env::var("AI_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-large".to_string()),
                max_tokens: std::env::var("AI_MAX_TOKENS")
                    .ok()
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(500),
            })
        } else {
            None
        };

        Ok(Self {
            wiki,
            search,
            ai,
            processing,
        })
    }
}

fn required(name: &str) -> Result<String, PipelineError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            PipelineError::Config(format!("missing required environment variable {}", name))
        })
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| parse_flag(&value))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_scope(value: &str) -> EmbedScope {
    match value.trim().to_lowercase().as_str() {
        "all" | "sections" => EmbedScope::AllRecords,
        _ => EmbedScope::FullDocument,
    }
}

/// One configured page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// One configured space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The JSON file of pages and spaces to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default)]
    pub pages: BTreeMap<String, PageEntry>,
    #[serde(default)]
    pub spaces: BTreeMap<String, SpaceEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl PageConfig {
    /// Load the page configuration, or start empty when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("page configuration file not found: {:?}", path);
            return Ok(Self {
                path: path.to_path_buf(),
                ..Default::default()
            });
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page configuration {:?}", path))?;
        let mut config: PageConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse page configuration {:?}", path))?;
        config.path = path.to_path_buf();

        tracing::info!(
            "loaded configuration for {} pages and {} spaces",
            config.pages.len(),
            config.spaces.len()
        );
        Ok(config)
    }

    /// Write the configuration back to its file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory {:?}", parent))?;
            }
        }
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize page configuration")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write page configuration {:?}", self.path))?;
        Ok(())
    }

    /// Add or replace a page entry.
    pub fn add_page(&mut self, page_id: &str, name: &str) {
        self.pages.insert(
            page_id.to_string(),
            PageEntry {
                name: name.to_string(),
                enabled: true,
            },
        );
    }

    /// Remove a page entry. Returns true when it existed.
    pub fn remove_page(&mut self, page_id: &str) -> bool {
        self.pages.remove(page_id).is_some()
    }

    /// Ids of all pages enabled for processing.
    pub fn enabled_page_ids(&self) -> Vec<String> {
        self.pages
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
