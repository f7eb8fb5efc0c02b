//! Retrieval pipeline.
//!
//! Retrievers compose stores, model clients, and splitters into query paths:
//! - [`VectorRetriever`]: similarity search over one table
//! - [`MultiVectorRetriever`]: search derived chunks, return parent documents
//! - [`ChunkedMultiVectorRetriever`]: parent/child splitting on ingestion
//! - [`MultiPathRetriever`]: fan out to children, rerank the union
//! - [`MultiQueryRetriever`]: expand the query, merge per-query results

pub mod chunked;
pub mod multi_path;
pub mod multi_query;
pub mod multi_vector;
pub mod vector;

pub use chunked::{ChildSplitGuidance, ChunkedMultiVectorRetriever};
pub use multi_path::MultiPathRetriever;
pub use multi_query::{ModelQueryExpander, MultiQueryRetriever, QueryExpander};
pub use multi_vector::{
    Guidance, HypotheticalQueriesGuidance, MultiVectorRetriever, SummaryGuidance,
};
pub use vector::VectorRetriever;

use async_trait::async_trait;

use crate::document::{Document, SearchRequest, UpdateResult};
use crate::errors::Result;

/// How a retriever matches documents; doubles as the metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Vector,
    FullText,
    MultiVector,
    MultiPath,
    MultiQuery,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Vector => "vector",
            RetrievalMode::FullText => "fulltext",
            RetrievalMode::MultiVector => "multi_vector",
            RetrievalMode::MultiPath => "multi_path",
            RetrievalMode::MultiQuery => "multi_query",
        }
    }
}

/// Read side of the pipeline.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>>;

    fn mode(&self) -> RetrievalMode;
}

/// A retriever that also owns writes into its backing store.
///
/// Ingestion takes documents by value: ids are assigned and derived records
/// are written as a side effect, and callers get the outcome per document in
/// the returned result.
#[async_trait]
pub trait StatefulRetriever: Retriever {
    async fn ingest(&self, docs: Vec<Document>) -> Result<UpdateResult>;
}
