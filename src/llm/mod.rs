//! AI enrichment services
//!
//! Optional collaborators invoked once per document: text summarization via
//! a chat-completions endpoint and vector embeddings via an embeddings
//! endpoint. Failures here never abort indexing of the base records.

mod client;

pub use client::{AiClient, AiConfig, AiService, MockAiClient};
