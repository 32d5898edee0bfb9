//! Document assembly and indexing orchestration
//!
//! Ties the parsing stages together:
//! - Normalize markup, extract metadata, split sections, assemble the
//!   in-memory [`Document`] with its content fingerprint
//! - Decide via the fingerprint cache whether re-indexing is needed
//! - Fan a document out into index records (whole document + one per
//!   section), optionally enriched with an AI summary and embeddings
//! - Commit the cache entry only after every record was accepted
//!
//! Per-document failures never abort a multi-page run; they are collected
//! into a [`RunSummary`] and reported at the end.

use crate::config::EmbedScope;
use crate::error::PipelineError;
use crate::extract::{
    content_hash, extract_metadata, flatten, split_sections, DocumentMetadata, Section,
};
use crate::index::{IndexRecord, SearchIndex};
use crate::llm::AiService;
use crate::normalize;
use crate::source::{ContentSource, RawPage};
use crate::storage::Cache;
use anyhow::Result;
use std::collections::HashSet;

/// Fully parsed page, ready for indexing. Never mutated after assembly,
/// only replaced wholesale on a re-run.
#[derive(Debug, Clone)]
pub struct Document {
    pub page: RawPage,
    pub metadata: DocumentMetadata,
    pub sections: Vec<Section>,
    pub full_content: String,
    pub fingerprint: String,
    pub summary: Option<String>,
}

/// Parse a raw page into a [`Document`]: normalize, extract metadata,
/// split sections, assemble. Pure — no I/O.
pub fn parse_document(page: &RawPage) -> Result<Document, PipelineError> {
    let blocks = normalize::parse_blocks(&page.raw_body)?;
    let extraction = extract_metadata(&blocks);
    let sections = split_sections(&blocks, &extraction.consumed);
    assemble(page.clone(), extraction.metadata, sections)
}

/// Combine page, metadata, and section tree into a [`Document`].
///
/// Fails only when nothing indexable came out of the page at all: no
/// sections, no content, and no metadata.
pub fn assemble(
    page: RawPage,
    metadata: DocumentMetadata,
    sections: Vec<Section>,
) -> Result<Document, PipelineError> {
    let full_content = render_full_content(&sections);
    if sections.is_empty() && full_content.trim().is_empty() && metadata.is_unset() {
        return Err(PipelineError::EmptyDocument(page.source_id));
    }
    let fingerprint = content_hash(&full_content);
    Ok(Document {
        page,
        metadata,
        sections,
        full_content,
        fingerprint,
        summary: None,
    })
}

/// Flatten the section tree back into normalized text, heading markers
/// re-inserted, in document order.
fn render_full_content(sections: &[Section]) -> String {
    let mut parts = Vec::new();
    for section in flatten(sections) {
        parts.push(section.heading_marker());
        if !section.content.is_empty() {
            parts.push(section.content.clone());
        }
    }
    parts.join("\n\n")
}

/// Union of every section's requirement ids, pre-order, first seen wins.
pub fn document_requirement_ids(sections: &[Section]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for section in flatten(sections) {
        for id in &section.requirement_ids {
            if seen.insert(id.clone()) {
                ids.push(id.clone());
            }
        }
    }
    ids
}

/// Build the index record set for a document: one whole-document record
/// followed by one record per section in pre-order.
pub fn build_records(doc: &Document) -> Vec<IndexRecord> {
    let metadata = &doc.metadata;
    let document_version = metadata
        .version_label
        .clone()
        .unwrap_or_else(|| doc.page.version.clone());

    let mut records = Vec::with_capacity(1 + doc.sections.len());
    records.push(IndexRecord {
        id: format!("{}_v{}_full", doc.page.source_id, doc.page.version),
        content: doc.full_content.clone(),
        source_page_id: doc.page.source_id.clone(),
        source_page_title: doc.page.title.clone(),
        source_url: doc.page.url.clone(),
        is_section: false,
        section_id: String::new(),
        section_title: String::new(),
        section_level: 0,
        section_number: String::new(),
        document_type: metadata.document_type.to_string(),
        project_code: metadata.project_code.clone().unwrap_or_default(),
        document_id: metadata.document_id.clone().unwrap_or_default(),
        document_version: document_version.clone(),
        document_status: metadata.status.clone().unwrap_or_default(),
        created_date: metadata.created_date.clone().unwrap_or_default(),
        last_updated_date: metadata.updated_date.clone().unwrap_or_default(),
        document_owner: metadata.author.clone().unwrap_or_default(),
        summary: doc.summary.clone(),
        requirement_ids: document_requirement_ids(&doc.sections),
        vector: None,
    });

    for section in flatten(&doc.sections) {
        records.push(IndexRecord {
            id: format!("{}_v{}_{}", doc.page.source_id, doc.page.version, section.id),
            content: section.content.clone(),
            source_page_id: doc.page.source_id.clone(),
            source_page_title: doc.page.title.clone(),
            source_url: doc.page.url.clone(),
            is_section: true,
            section_id: section.id.clone(),
            section_title: section.title.clone(),
            section_level: section.level as i32,
            section_number: section.number.clone().unwrap_or_default(),
            document_type: metadata.document_type.to_string(),
            project_code: metadata.project_code.clone().unwrap_or_default(),
            document_id: metadata.document_id.clone().unwrap_or_default(),
            document_version: document_version.clone(),
            document_status: metadata.status.clone().unwrap_or_default(),
            created_date: metadata.created_date.clone().unwrap_or_default(),
            last_updated_date: metadata.updated_date.clone().unwrap_or_default(),
            document_owner: metadata.author.clone().unwrap_or_default(),
            summary: None,
            requirement_ids: section.requirement_ids.clone(),
            vector: None,
        });
    }

    records
}

/// Per-run processing options.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub summarize: bool,
    pub vectorize: bool,
    pub embed_scope: EmbedScope,
    pub force: bool,
    pub summary_max_tokens: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            summarize: false,
            vectorize: false,
            embed_scope: EmbedScope::default(),
            force: false,
            summary_max_tokens: 500,
        }
    }
}

/// What happened to one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Indexed this many records.
    Indexed(usize),
    /// Unchanged since the last run; nothing submitted.
    Skipped,
}

/// Result of a multi-page run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    fn record(&mut self, page_id: &str, outcome: Result<Outcome>) {
        match outcome {
            Ok(Outcome::Indexed(_)) => self.processed += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(e) => {
                tracing::error!("failed to process page {}: {:#}", page_id, e);
                self.failed.push((page_id.to_string(), format!("{:#}", e)));
            }
        }
    }
}

/// Indexing orchestrator. Collaborators are injected; the cache is opened
/// once per invocation and shared across documents.
pub struct Indexer<'a> {
    source: &'a dyn ContentSource,
    index: &'a dyn SearchIndex,
    ai: Option<&'a dyn AiService>,
    cache: &'a Cache,
    options: IndexOptions,
}

impl<'a> Indexer<'a> {
    /// Create an orchestrator without AI enrichment.
    pub fn new(
        source: &'a dyn ContentSource,
        index: &'a dyn SearchIndex,
        cache: &'a Cache,
        options: IndexOptions,
    ) -> Self {
        Self {
            source,
            index,
            ai: None,
            cache,
            options,
        }
    }

    /// Attach an AI service for summaries and embeddings.
    pub fn with_ai(mut self, ai: &'a dyn AiService) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Process a single page end to end.
    pub async fn process_page(&self, page_id: &str) -> Result<Outcome> {
        let page = self.source.fetch_page(page_id).await?;
        let mut doc = parse_document(&page)?;

        if !self.cache.should_process(
            &page.source_id,
            &page.version,
            &doc.fingerprint,
            self.options.force,
        ) {
            return Ok(Outcome::Skipped);
        }

        doc.summary = self.generate_summary(&doc).await;
        let mut records = build_records(&doc);
        self.attach_embeddings(&mut records).await;

        let results = self.index.upsert(&records).await?;
        let failed = results.iter().filter(|result| !result.succeeded).count();
        if failed > 0 {
            // No cache commit: the next run retries the whole document.
            // Record ids are deterministic, so the retry overwrites cleanly.
            anyhow::bail!(
                "{} of {} records failed to index for page {}",
                failed,
                results.len(),
                page.source_id
            );
        }

        self.cache
            .commit(&page.source_id, &page.version, &doc.fingerprint)?;
        tracing::info!(
            "indexed page {} version {} ({} records)",
            page.source_id,
            page.version,
            records.len()
        );
        Ok(Outcome::Indexed(records.len()))
    }

    /// Process a list of pages, collecting per-page outcomes.
    pub async fn process_pages(&self, page_ids: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();
        for page_id in page_ids {
            let outcome = self.process_page(page_id).await;
            summary.record(page_id, outcome);
        }
        summary
    }

    /// Process every page of a space.
    pub async fn process_space(&self, space_key: &str) -> Result<RunSummary> {
        let page_ids = self.source.fetch_space_page_ids(space_key).await?;
        tracing::info!("found {} pages in space {}", page_ids.len(), space_key);
        Ok(self.process_pages(&page_ids).await)
    }

    async fn generate_summary(&self, doc: &Document) -> Option<String> {
        let ai = self.ai?;
        if !self.options.summarize {
            return None;
        }
        match ai
            .summarize(&doc.full_content, self.options.summary_max_tokens)
            .await
        {
            Ok(summary) if !summary.is_empty() => Some(summary),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    "summary generation failed for page {}: {:#}",
                    doc.page.source_id,
                    e
                );
                None
            }
        }
    }

    async fn attach_embeddings(&self, records: &mut [IndexRecord]) {
        let Some(ai) = self.ai else { return };
        if !self.options.vectorize {
            return;
        }
        for (position, record) in records.iter_mut().enumerate() {
            if position > 0 && self.options.embed_scope == EmbedScope::FullDocument {
                break;
            }
            match ai.embed(&record.content).await {
                Ok(vector) => record.vector = Some(vector),
                Err(e) => {
                    tracing::warn!("embedding failed for record {}: {:#}", record.id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::DocumentType;
    use crate::index::SubmitResult;
    use crate::llm::MockAiClient;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PAGE_HTML: &str = r#"
        <table>
            <tbody>
                <tr><th>Document Control</th><td></td></tr>
                <tr><th>Document ID</th><td>ABRD-HRMS-2025-1.0</td></tr>
                <tr><th>Version</th><td>1.0</td></tr>
                <tr><th>Status</th><td>Approved</td></tr>
                <tr><th>Author</th><td>Jane Doe</td></tr>
            </tbody>
        </table>
        <h1>1. Executive Summary</h1>
        <p>High-level summary mentioning FR-001.</p>
        <h1>2. Feature Overview</h1>
        <p>Overview referencing PR-003.</p>
        <h2>2.1 Feature Background</h2>
        <p>Background detail for FR-001 and SR-002.</p>
    "#;

    fn sample_page(version: &str, body: &str) -> RawPage {
        RawPage {
            source_id: "12345".into(),
            title: "ABRD - HR Management System".into(),
            version: version.into(),
            raw_body: body.into(),
            url: "https://wiki.example.com/pages/12345".into(),
        }
    }

    struct StaticSource {
        pages: Mutex<HashMap<String, RawPage>>,
    }

    impl StaticSource {
        fn single(page: RawPage) -> Self {
            let mut pages = HashMap::new();
            pages.insert(page.source_id.clone(), page);
            Self {
                pages: Mutex::new(pages),
            }
        }

        fn set(&self, page: RawPage) {
            self.pages
                .lock()
                .unwrap()
                .insert(page.source_id.clone(), page);
        }
    }

    #[async_trait]
    impl ContentSource for StaticSource {
        async fn fetch_page(&self, page_id: &str) -> Result<RawPage> {
            self.pages
                .lock()
                .unwrap()
                .get(page_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such page: {}", page_id))
        }

        async fn fetch_space_page_ids(&self, _space_key: &str) -> Result<Vec<String>> {
            let mut ids: Vec<String> = self.pages.lock().unwrap().keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        batches: Mutex<Vec<Vec<IndexRecord>>>,
        fail_keys: Vec<String>,
    }

    impl RecordingIndex {
        fn failing_on(key: &str) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                fail_keys: vec![key.to_string()],
            }
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }

        fn last_batch(&self) -> Vec<IndexRecord> {
            self.batches.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn upsert(&self, records: &[IndexRecord]) -> Result<Vec<SubmitResult>> {
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(records
                .iter()
                .map(|record| SubmitResult {
                    key: record.id.clone(),
                    succeeded: !self.fail_keys.contains(&record.id),
                    message: None,
                })
                .collect())
        }

        async fn delete(&self, _ids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    fn indexer<'a>(
        source: &'a StaticSource,
        index: &'a RecordingIndex,
        cache: &'a Cache,
        options: IndexOptions,
    ) -> Indexer<'a> {
        Indexer::new(source, index, cache, options)
    }

    #[test]
    fn test_scenario_four_records_with_hierarchy() {
        let page = sample_page("7", PAGE_HTML);
        let doc = parse_document(&page).unwrap();
        let records = build_records(&doc);

        assert_eq!(records.len(), 4);

        let full = &records[0];
        assert_eq!(full.id, "12345_v7_full");
        assert!(!full.is_section);
        assert_eq!(full.document_type, "ABRD");
        assert_eq!(full.project_code, "HRMS");
        assert_eq!(full.document_id, "ABRD-HRMS-2025-1.0");
        assert_eq!(full.document_version, "1.0");

        let ids: Vec<&str> = records[1..].iter().map(|r| r.section_id.as_str()).collect();
        assert_eq!(ids, vec!["section_1", "section_2", "section_2_1"]);

        let background = &records[3];
        assert_eq!(background.id, "12345_v7_section_2_1");
        assert_eq!(background.section_level, 2);
        assert_eq!(background.section_number, "2.1");
        assert_eq!(records[2].section_level, 1);
        assert_eq!(background.document_id, records[2].document_id);
    }

    #[test]
    fn test_full_record_ids_are_ordered_union() {
        let page = sample_page("7", PAGE_HTML);
        let doc = parse_document(&page).unwrap();
        let records = build_records(&doc);

        assert_eq!(records[0].requirement_ids, vec!["FR-001", "PR-003", "SR-002"]);
        // Section ids stay local to their own content.
        assert_eq!(records[2].requirement_ids, vec!["PR-003"]);
        assert_eq!(records[3].requirement_ids, vec!["FR-001", "SR-002"]);
    }

    #[test]
    fn test_degraded_page_without_metadata_still_parses() {
        let page = sample_page("1", "<p>Plain prose, no control table, no headings.</p>");
        let doc = parse_document(&page).unwrap();

        assert_eq!(doc.metadata.document_type, DocumentType::Unknown);
        assert!(doc.metadata.document_id.is_none());
        let records = build_records(&doc);
        // Preamble section only: one full record + one section record.
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].document_type, "UNKNOWN");
        assert_eq!(records[0].document_id, "");
        // Without a control-table version the upstream token is used.
        assert_eq!(records[0].document_version, "1");
    }

    #[test]
    fn test_empty_body_is_empty_content() {
        let page = sample_page("1", "   ");
        assert!(matches!(
            parse_document(&page),
            Err(PipelineError::EmptyContent)
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content_not_version() {
        let a = parse_document(&sample_page("1", PAGE_HTML)).unwrap();
        let b = parse_document(&sample_page("2", PAGE_HTML)).unwrap();
        let c = parse_document(&sample_page("1", "<h1>1. Other</h1><p>Changed.</p>")).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn test_full_content_preserves_heading_sequence() {
        let doc = parse_document(&sample_page("1", PAGE_HTML)).unwrap();
        let exec = doc.full_content.find("# 1 Executive Summary").unwrap();
        let overview = doc.full_content.find("# 2 Feature Overview").unwrap();
        let background = doc.full_content.find("## 2.1 Feature Background").unwrap();
        assert!(exec < overview && overview < background);
        // The control table was consumed by metadata extraction.
        assert!(!doc.full_content.contains("Document Control"));
    }

    #[tokio::test]
    async fn test_second_run_skips_without_index_calls() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        let index = RecordingIndex::default();
        let cache = Cache::open_in_memory().unwrap();
        let worker = indexer(&source, &index, &cache, IndexOptions::default());

        assert_eq!(worker.process_page("12345").await.unwrap(), Outcome::Indexed(4));
        assert_eq!(worker.process_page("12345").await.unwrap(), Outcome::Skipped);
        assert_eq!(index.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_forced_runs_produce_identical_records() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        let index = RecordingIndex::default();
        let cache = Cache::open_in_memory().unwrap();
        let options = IndexOptions {
            force: true,
            ..Default::default()
        };
        let worker = indexer(&source, &index, &cache, options);

        worker.process_page("12345").await.unwrap();
        let first = index.last_batch();
        worker.process_page("12345").await.unwrap();
        let second = index.last_batch();

        assert_eq!(index.batch_count(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_changed_body_overrides_version_match() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        let index = RecordingIndex::default();
        let cache = Cache::open_in_memory().unwrap();
        let worker = indexer(&source, &index, &cache, IndexOptions::default());

        worker.process_page("12345").await.unwrap();

        // Same version token, edited body: the fingerprint mismatch wins.
        source.set(sample_page("7", "<h1>1. Rewritten</h1><p>New text.</p>"));
        assert!(matches!(
            worker.process_page("12345").await.unwrap(),
            Outcome::Indexed(_)
        ));
        assert_eq!(index.batch_count(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_leaves_cache_uncommitted() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        let index = RecordingIndex::failing_on("12345_v7_section_2_1");
        let cache = Cache::open_in_memory().unwrap();
        let worker = indexer(&source, &index, &cache, IndexOptions::default());

        assert!(worker.process_page("12345").await.is_err());
        assert!(cache.lookup("12345").unwrap().is_none());

        // The next run retries the whole document.
        assert!(worker.process_page("12345").await.is_err());
        assert_eq!(index.batch_count(), 2);
    }

    #[tokio::test]
    async fn test_summary_and_full_scope_embeddings() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        let index = RecordingIndex::default();
        let cache = Cache::open_in_memory().unwrap();
        let ai = MockAiClient::new("Concise summary.", vec![0.1, 0.2, 0.3]);
        let options = IndexOptions {
            summarize: true,
            vectorize: true,
            ..Default::default()
        };
        let worker = indexer(&source, &index, &cache, options).with_ai(&ai);

        worker.process_page("12345").await.unwrap();
        let batch = index.last_batch();

        assert_eq!(batch[0].summary.as_deref(), Some("Concise summary."));
        assert_eq!(batch[0].vector.as_deref(), Some(&[0.1, 0.2, 0.3][..]));
        // FullDocument scope: sections carry no vectors, and never a summary.
        assert!(batch[1..].iter().all(|r| r.vector.is_none()));
        assert!(batch[1..].iter().all(|r| r.summary.is_none()));
    }

    #[tokio::test]
    async fn test_all_records_embed_scope() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        let index = RecordingIndex::default();
        let cache = Cache::open_in_memory().unwrap();
        let ai = MockAiClient::new("s", vec![1.0]);
        let options = IndexOptions {
            vectorize: true,
            embed_scope: EmbedScope::AllRecords,
            ..Default::default()
        };
        let worker = indexer(&source, &index, &cache, options).with_ai(&ai);

        worker.process_page("12345").await.unwrap();
        let batch = index.last_batch();
        assert!(batch.iter().all(|r| r.vector.is_some()));
    }

    #[tokio::test]
    async fn test_ai_failure_does_not_abort_indexing() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        let index = RecordingIndex::default();
        let cache = Cache::open_in_memory().unwrap();
        let ai = MockAiClient::failing();
        let options = IndexOptions {
            summarize: true,
            vectorize: true,
            ..Default::default()
        };
        let worker = indexer(&source, &index, &cache, options).with_ai(&ai);

        assert_eq!(worker.process_page("12345").await.unwrap(), Outcome::Indexed(4));
        let batch = index.last_batch();
        assert!(batch[0].summary.is_none());
        assert!(batch[0].vector.is_none());
        assert!(cache.lookup("12345").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_multi_page_run_collects_failures() {
        let source = StaticSource::single(sample_page("7", PAGE_HTML));
        source.set(RawPage {
            source_id: "99999".into(),
            title: "Empty".into(),
            version: "1".into(),
            raw_body: "".into(),
            url: "https://wiki.example.com/pages/99999".into(),
        });
        let index = RecordingIndex::default();
        let cache = Cache::open_in_memory().unwrap();
        let worker = indexer(&source, &index, &cache, IndexOptions::default());

        let summary = worker.process_space("REQ").await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "99999");
    }

    #[test]
    fn test_assemble_rejects_fully_empty_document() {
        let page = sample_page("1", "ignored");
        let result = assemble(page, DocumentMetadata::default(), Vec::new());
        assert!(matches!(result, Err(PipelineError::EmptyDocument(id)) if id == "12345"));
    }

    #[test]
    fn test_assemble_accepts_metadata_only_document() {
        let page = sample_page("1", "ignored");
        let metadata = DocumentMetadata {
            document_id: Some("FBRD-ORD-2025-1.0".into()),
            document_type: DocumentType::Fbrd,
            project_code: Some("ORD".into()),
            ..Default::default()
        };
        let doc = assemble(page, metadata, Vec::new()).unwrap();
        assert_eq!(build_records(&doc).len(), 1);
    }
}
