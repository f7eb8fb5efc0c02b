//! Document and vector storage over an embedded SQL engine.
//!
//! One table per store instance, columns fixed as `id, text, [vector],
//! <schema fields in declared order>`. The SQLite implementations generate
//! all SQL from the [`MetadataSchema`](crate::schema::MetadataSchema) handed
//! to them at open time.

mod doc_store;
mod sql;
mod sqlite;
mod vector_store;

pub use doc_store::SqliteDocStore;
pub use sqlite::{connect, open_memory_pool, open_pool};
pub use vector_store::SqliteVectorStore;

use crate::document::{Document, FindRequest, MetadataFilter, SearchRequest, UpdateResult};
use crate::errors::Result;
use crate::schema::MetadataSchema;

/// Construction-time switches for a store table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Drop and recreate the backing table instead of opening it idempotently.
    pub create_or_replace: bool,
    /// Reject documents carrying metadata fields outside the schema.
    pub strict: bool,
}

/// Persistent document storage.
#[async_trait::async_trait]
pub trait DocStore: Send + Sync {
    /// Insert one document inside its own transaction. Any failure rolls the
    /// transaction back and surfaces as an error. A blank id is replaced with
    /// a generated one before the insert.
    async fn add_document(&self, doc: &mut Document) -> Result<()>;

    /// Insert a batch inside one transaction with per-document isolation:
    /// a document that fails validation or its row insert is recorded in
    /// `failed_documents` and the rest of the batch proceeds. Ids are
    /// assigned in place; `returned_ids` preserves insertion order.
    async fn add_documents(&self, docs: &mut [Document]) -> Result<UpdateResult>;

    /// Delete by id list, echoing the requested ids back in the result.
    async fn delete_documents(&self, ids: &[String]) -> Result<UpdateResult>;

    /// Delete every document matching the predicate.
    async fn delete_documents_matching(&self, filter: &MetadataFilter) -> Result<UpdateResult>;

    /// Fetch documents for the given ids. An empty input returns an empty
    /// list without touching the backend.
    async fn multi_get_documents(&self, ids: &[String]) -> Result<Vec<Document>>;

    /// Scan with optional predicate and pagination.
    async fn find_documents(&self, request: &FindRequest) -> Result<Vec<Document>>;

    /// Row count via the statement generated at open time.
    async fn count_documents(&self) -> Result<u64>;

    fn metadata_schema(&self) -> &MetadataSchema;

    /// Drop the backing table.
    async fn destroy(&self) -> Result<()>;
}

/// Document storage with an embedding column and similarity search.
#[async_trait::async_trait]
pub trait VectorStore: DocStore {
    /// Embed the request's query text and run cosine-similarity search,
    /// best match first. Unfiltered requests reuse the statement prepared
    /// from the SQL generated at open; filtered requests render inline SQL.
    async fn search_documents(&self, request: &SearchRequest) -> Result<Vec<Document>>;

    /// Width of the embedding column.
    fn dimension(&self) -> usize;
}
