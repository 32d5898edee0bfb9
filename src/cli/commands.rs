//! Command implementations

use crate::config::{AppConfig, PageConfig, ProcessingSettings};
use crate::index::SearchIndexClient;
use crate::llm::{AiClient, AiConfig};
use crate::pipeline::{IndexOptions, Indexer, Outcome, RunSummary};
use crate::source::WikiClient;
use crate::storage::Cache;
use anyhow::{Context, Result};
use std::path::Path;

/// Collaborators for one invocation. The cache is opened once and shared
/// across every document the run touches.
pub struct Collaborators {
    wiki: WikiClient,
    search: SearchIndexClient,
    ai: Option<AiClient>,
    cache: Cache,
    options: IndexOptions,
}

impl Collaborators {
    /// Build clients and cache from the application configuration.
    pub fn build(config: &AppConfig, dry_run: bool, force: bool) -> Result<Self> {
        let wiki = WikiClient::new(
            &config.wiki.base_url,
            &config.wiki.username,
            &config.wiki.api_token,
        );
        let search = SearchIndexClient::new(
            &config.search.endpoint,
            &config.search.index_name,
            &config.search.api_key,
        )
        .with_dry_run(dry_run);

        let ai = config.ai.as_ref().map(|settings| {
            AiClient::new(AiConfig {
                endpoint: settings.endpoint.clone(),
                api_key: settings.api_key.clone(),
                completion_model: settings.completion_model.clone(),
                embedding_model: settings.embedding_model.clone(),
                ..Default::default()
            })
        });

        let cache = Cache::open(&config.processing.cache_dir)
            .context("Failed to open the fingerprint cache")?;

        let options = IndexOptions {
            summarize: config.processing.summarize,
            vectorize: config.processing.vectorize,
            embed_scope: config.processing.embed_scope,
            force,
            summary_max_tokens: config.ai.as_ref().map(|ai| ai.max_tokens).unwrap_or(500),
        };

        Ok(Self {
            wiki,
            search,
            ai,
            cache,
            options,
        })
    }

    fn indexer(&self) -> Indexer<'_> {
        let indexer = Indexer::new(&self.wiki, &self.search, &self.cache, self.options.clone());
        match &self.ai {
            Some(ai) => indexer.with_ai(ai),
            None => indexer,
        }
    }
}

/// Process a single page.
pub async fn process_one_page(
    config: &AppConfig,
    page_id: &str,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let collaborators = Collaborators::build(config, dry_run, force)?;
    match collaborators.indexer().process_page(page_id).await? {
        Outcome::Indexed(count) => println!("✓ Indexed {} records for page {}", count, page_id),
        Outcome::Skipped => println!("Page {} unchanged, skipped", page_id),
    }
    Ok(())
}

/// Process every page of a space.
pub async fn process_one_space(
    config: &AppConfig,
    space_key: &str,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let collaborators = Collaborators::build(config, dry_run, force)?;
    let summary = collaborators.indexer().process_space(space_key).await?;
    print_summary(&summary);
    Ok(())
}

/// Process every page enabled in the configuration file.
pub async fn process_all_configured(
    config: &AppConfig,
    config_file: &Path,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    let page_config = PageConfig::load(config_file)?;
    let page_ids = page_config.enabled_page_ids();

    if page_ids.is_empty() {
        println!("No enabled pages found in {:?}", config_file);
        return Ok(());
    }

    println!("Processing {} configured pages", page_ids.len());
    let collaborators = Collaborators::build(config, dry_run, force)?;
    let summary = collaborators.indexer().process_pages(&page_ids).await;
    print_summary(&summary);
    Ok(())
}

/// List configured pages and spaces.
pub fn list_configured(config_file: &Path) -> Result<()> {
    let page_config = PageConfig::load(config_file)?;

    println!("Configured pages:");
    if page_config.pages.is_empty() {
        println!("  (none)");
    }
    for (id, entry) in &page_config.pages {
        let status = if entry.enabled { "Enabled" } else { "Disabled" };
        let name = if entry.name.is_empty() {
            "Unnamed"
        } else {
            entry.name.as_str()
        };
        println!("  - {}: {} [{}]", id, name, status);
    }

    println!("\nConfigured spaces:");
    if page_config.spaces.is_empty() {
        println!("  (none)");
    }
    for (key, entry) in &page_config.spaces {
        let status = if entry.enabled { "Enabled" } else { "Disabled" };
        let name = if entry.name.is_empty() {
            "Unnamed"
        } else {
            entry.name.as_str()
        };
        println!("  - {}: {} [{}]", key, name, status);
    }

    Ok(())
}

/// Add a page to the configuration file.
pub fn add_configured(config_file: &Path, page_id: &str, name: Option<&str>) -> Result<()> {
    let mut page_config = PageConfig::load(config_file)?;
    let name = name
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("Page {}", page_id));
    page_config.add_page(page_id, &name);
    page_config.save()?;
    println!("✓ Added page {} to {:?}", page_id, config_file);
    Ok(())
}

/// Remove a page from the configuration file.
pub fn remove_configured(config_file: &Path, page_id: &str) -> Result<()> {
    let mut page_config = PageConfig::load(config_file)?;
    if page_config.remove_page(page_id) {
        page_config.save()?;
        println!("✓ Removed page {} from {:?}", page_id, config_file);
    } else {
        println!("Page {} is not in {:?}", page_id, config_file);
    }
    Ok(())
}

/// Show cache statistics and entries.
pub fn cache_status(processing: &ProcessingSettings) -> Result<()> {
    let cache = Cache::open(&processing.cache_dir)?;
    let status = cache.status()?;

    println!("Cache statistics:");
    println!("  Entries: {}", status.entries);
    println!(
        "  Most recent: {}",
        status.newest_entry.as_deref().unwrap_or("-")
    );
    println!(
        "  Oldest: {}",
        status.oldest_entry.as_deref().unwrap_or("-")
    );

    let entries = cache.entries()?;
    if !entries.is_empty() {
        println!("\nEntries:");
        for entry in entries {
            println!(
                "  - {} (version {}, indexed {})",
                entry.source_id, entry.last_version, entry.last_indexed_at
            );
        }
    }

    Ok(())
}

/// Drop all cache entries.
pub fn cache_clear(processing: &ProcessingSettings) -> Result<()> {
    let cache = Cache::open(&processing.cache_dir)?;
    let count = cache.clear()?;
    println!("✓ Cleared {} cache entries", count);
    Ok(())
}

/// Print the outcome of a multi-page run.
pub fn print_summary(summary: &RunSummary) {
    println!(
        "\nRun complete. Indexed: {}, skipped: {}, failed: {}",
        summary.processed,
        summary.skipped,
        summary.failed.len()
    );
    for (page_id, reason) in &summary.failed {
        println!("  ✗ {}: {}", page_id, reason);
    }
}
