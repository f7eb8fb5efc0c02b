//! Model client abstractions.
//!
//! Three seams the retrieval pipeline plugs into:
//! - [`Embedder`]: text to vector, backing the vector store
//! - [`CompletionModel`]: prompt to text, backing guidance and query expansion
//! - [`RankingModel`]: (query, document) to relevance score, backing fusion

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex_lite::Regex;

use crate::config::EmbeddingConfig;
use crate::errors::{EngineError, Result};

mod mock;
mod openai;
mod reranker;

pub use mock::MockEmbedder;
pub use openai::{OpenAICompletionModel, OpenAIEmbedder};
pub use reranker::HttpRanker;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

impl std::fmt::Debug for dyn Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model", &self.model_name())
            .field("dimension", &self.dimension())
            .finish()
    }
}

/// Trait for text generation
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Trait for relevance scoring of a document against a query
#[async_trait]
pub trait RankingModel: Send + Sync {
    async fn score(&self, query: &str, document: &str) -> Result<f32>;
}

/// Create an embedder based on configuration.
///
/// Unknown providers are rejected rather than silently downgraded; a store
/// opened against the wrong embedder corrupts its table.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(EngineError::Configuration {
            message: format!("unknown embedding provider: {other:?}"),
        }),
    }
}

static LINE_PREFIX: OnceLock<Regex> = OnceLock::new();

/// Split model output into trimmed lines, stripping list numbering and
/// bullets. Blank lines are dropped.
pub(crate) fn clean_lines(raw: &str) -> Vec<String> {
    let prefix = LINE_PREFIX.get_or_init(|| {
        Regex::new(r"^\s*(?:\d+[.):]\s*|[-*]\s+)").expect("static pattern compiles")
    });
    raw.lines()
        .map(|line| prefix.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
