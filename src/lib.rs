//! reqindex - Wiki requirement-document ingestion and search indexing
//!
//! This library ingests structured business-requirement documents (ABRD and
//! FBRD types) from a wiki content source, recovers their metadata and
//! section hierarchy from hand-authored markup, and publishes searchable
//! units to a search index, optionally enriched with AI summaries and
//! vector embeddings. A persistent fingerprint cache skips pages whose
//! content has not changed.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod normalize;
pub mod pipeline;
pub mod source;
pub mod storage;

/// Re-export commonly used types
pub use error::PipelineError;
pub use extract::{DocumentMetadata, DocumentType, Section};
pub use index::IndexRecord;
pub use pipeline::{Document, Indexer, RunSummary};
pub use source::RawPage;
pub use storage::Cache;

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "reqindex";
