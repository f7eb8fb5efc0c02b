//! Forage Retrieval Engine
//!
//! Embedded document storage and retrieval for augmented generation:
//! - SQLite-backed document and vector stores with typed metadata
//! - Vector, keyword (BM25), and composed retrieval strategies
//! - Embedding, completion, and reranking model clients
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod document;
pub mod errors;
pub mod fulltext;
pub mod metrics;
pub mod models;
pub mod retrieval;
pub mod schema;
pub mod splitter;
pub mod store;

// Re-export commonly used types
pub use config::EngineConfig;
pub use document::{Document, FindRequest, MetadataFilter, SearchRequest, UpdateResult};
pub use errors::{EngineError, Result};
pub use fulltext::{FullTextOptions, FullTextRetriever};
pub use models::{create_embedder, CompletionModel, Embedder, RankingModel};
pub use retrieval::{RetrievalMode, Retriever, StatefulRetriever};
pub use schema::{FieldKind, FieldValue, MetadataSchema};
pub use store::{DocStore, SqliteDocStore, SqliteVectorStore, StoreOptions, VectorStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default number of results returned by a search
pub const DEFAULT_TOP_K: usize = 10;
