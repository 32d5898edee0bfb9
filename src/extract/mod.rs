//! Semantic extraction from normalized block sequences
//!
//! This module recovers structure from the block stream the normalizer
//! produces:
//! - Document Control / Document History metadata (with list fallback)
//! - The hierarchical section tree keyed by heading structure
//! - Typed requirement identifiers from free text and tables

pub mod identifiers;
pub mod metadata;
pub mod sections;

pub use identifiers::extract_requirement_ids;
pub use metadata::{
    extract_metadata, DocumentMetadata, DocumentType, HistoryEntry, MetadataExtraction,
};
pub use sections::{flatten, split_sections, Section};

use sha2::{Digest, Sha256};

/// Compute a stable hash for content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
