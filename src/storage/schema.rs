//! Database schema definition

/// SQL schema for the fingerprint cache database
pub const SCHEMA: &str = r#"
-- One row per source page: last indexed version and content fingerprint
CREATE TABLE IF NOT EXISTS document_cache (
    source_id TEXT PRIMARY KEY,
    last_version TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    last_indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_document_cache_indexed ON document_cache(last_indexed_at);
"#;
