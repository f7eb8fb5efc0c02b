//! Configuration management for the retrieval engine
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with FORAGE__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::fulltext::FullTextOptions;

/// Top-level engine configuration
///
/// Every section falls back to defaults, so `EngineConfig::default()` yields
/// a working in-process setup (mock-friendly, local SQLite file).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// SQLite storage configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Completion model configuration (guidance, query expansion)
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Reranker endpoint configuration
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Retrieval pipeline tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Keyword-search tokenization options
    #[serde(default)]
    pub fulltext: FullTextOptions,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Use a private in-memory database instead of a file
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API base URL (OpenAI-compatible)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Texts per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// API base URL (OpenAI-compatible)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key for the completion service
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Sampling temperature; guidance prompts want deterministic output
    #[serde(default)]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_completion_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RankingConfig {
    /// Rerank endpoint URL
    #[serde(default = "default_ranking_url")]
    pub api_url: String,

    /// API key for the rerank endpoint
    pub api_key: Option<String>,

    /// Model override; None lets the endpoint pick
    pub model: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_ranking_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Results returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Upper bound on a multi-path fan-out, in seconds
    #[serde(default = "default_fanout_timeout")]
    pub fanout_timeout_seconds: u64,

    /// Documents per ingestion batch
    #[serde(default = "default_ingest_batch_size")]
    pub ingest_batch_size: usize,

    /// Parent chunk size in characters
    #[serde(default = "default_parent_chunk_size")]
    pub parent_chunk_size: usize,

    /// Child chunk size in characters
    #[serde(default = "default_child_chunk_size")]
    pub child_chunk_size: usize,

    /// Overlap between adjacent chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

// Default value functions
fn default_database_path() -> String { "data/forage.db".to_string() }
fn default_max_connections() -> u32 { 5 }
fn default_provider() -> String { "openai".to_string() }
fn default_api_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_batch_size() -> usize { 100 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_completion_model() -> String { "gpt-4o-mini".to_string() }
fn default_completion_timeout() -> u64 { 60 }
fn default_ranking_url() -> String { "https://api.jina.ai/v1/rerank".to_string() }
fn default_ranking_timeout() -> u64 { 30 }
fn default_top_k() -> usize { crate::DEFAULT_TOP_K }
fn default_fanout_timeout() -> u64 { 60 }
fn default_ingest_batch_size() -> usize { 50 }
fn default_parent_chunk_size() -> usize { 1000 }
fn default_child_chunk_size() -> usize { 200 }
fn default_chunk_overlap() -> usize { 50 }

impl EngineConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with FORAGE__ prefix
            // e.g., FORAGE__DATABASE__PATH=/var/lib/forage.db
            .add_source(
                Environment::with_prefix("FORAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::Configuration {
                message: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| EngineError::Configuration {
            message: e.to_string(),
        })
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("FORAGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::Configuration {
                message: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| EngineError::Configuration {
            message: e.to_string(),
        })
    }

    /// Fan-out deadline as a Duration
    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.fanout_timeout_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            in_memory: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: default_api_url(),
            api_key: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            timeout_seconds: default_embedding_timeout(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_completion_model(),
            temperature: 0.0,
            timeout_seconds: default_completion_timeout(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            api_url: default_ranking_url(),
            api_key: None,
            model: None,
            timeout_seconds: default_ranking_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fanout_timeout_seconds: default_fanout_timeout(),
            ingest_batch_size: default_ingest_batch_size(),
            parent_chunk_size: default_parent_chunk_size(),
            child_chunk_size: default_child_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.retrieval.fanout_timeout_seconds, 60);
        assert!(!config.database.in_memory);
    }

    #[test]
    fn test_bare_sources_fall_back_to_defaults() {
        let config: EngineConfig = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.database.path, "data/forage.db");
        assert_eq!(config.retrieval.ingest_batch_size, 50);
    }

    #[test]
    fn test_fanout_timeout_accessor() {
        let config = EngineConfig::default();
        assert_eq!(config.fanout_timeout(), Duration::from_secs(60));
    }
}
