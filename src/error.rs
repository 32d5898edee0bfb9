//! Pipeline error taxonomy
//!
//! Distinguishes failures that abort a single document from failures that
//! abort the whole invocation. Recoverable parse gaps (unrecognized table
//! shapes, missing metadata) are not errors at all and degrade silently.

use thiserror::Error;

/// Errors raised by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The page body contained nothing parseable. Aborts this document only.
    #[error("page body contained no recognizable content")]
    EmptyContent,

    /// Parsing succeeded but produced nothing worth indexing.
    /// Aborts this document only.
    #[error("page '{0}' produced no indexable content")]
    EmptyDocument(String),

    /// An upstream collaborator failed after retries were exhausted.
    /// Surfaced as a per-document failure, never aborts a multi-page run.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Missing or invalid configuration. Aborts the whole invocation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// True when the error should abort the entire invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_is_fatal() {
        assert!(PipelineError::Config("missing SEARCH_ENDPOINT".into()).is_fatal());
        assert!(!PipelineError::EmptyContent.is_fatal());
        assert!(!PipelineError::EmptyDocument("123".into()).is_fatal());
        assert!(!PipelineError::Transient("timeout".into()).is_fatal());
    }
}
