//! SQLite-backed vector store: document storage plus an embedding column and
//! similarity search via sqlite-vec.

use std::sync::Arc;
use std::time::Instant;

use sqlx::sqlite::SqlitePool;

use crate::document::{Document, FindRequest, MetadataFilter, SearchRequest, UpdateResult};
use crate::errors::{EngineError, Result};
use crate::models::Embedder;
use crate::schema::MetadataSchema;
use crate::store::doc_store::{validation_error, SqliteDocStore};
use crate::store::{sql, DocStore, StoreOptions, VectorStore};

/// Vector store over one SQLite table whose third column holds embeddings.
///
/// Reads, deletes, and counting share the document-store implementation; the
/// write path embeds texts and the search path runs the cosine-similarity SQL
/// generated at open time.
#[derive(Debug)]
pub struct SqliteVectorStore {
    inner: SqliteDocStore,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    insert_sql: String,
    search_sql: String,
}

impl SqliteVectorStore {
    /// Idempotently ensure the backing table exists and open a store over it.
    ///
    /// `dimension` fixes the embedding column width; it must be positive and
    /// match what the embedder produces, both checked here so misconfiguration
    /// fails at open rather than on the first write.
    pub async fn create_or_open(
        pool: SqlitePool,
        table: impl Into<String>,
        schema: MetadataSchema,
        embedder: Arc<dyn Embedder>,
        dimension: usize,
        options: StoreOptions,
    ) -> Result<Self> {
        let table = table.into();
        if dimension == 0 {
            return Err(EngineError::Configuration {
                message: "vector store requires a positive embedding dimension".into(),
            });
        }
        if embedder.dimension() != dimension {
            return Err(EngineError::DimensionMismatch {
                expected: dimension,
                actual: embedder.dimension(),
            });
        }
        if !crate::schema::is_valid_identifier(&table) {
            return Err(EngineError::Configuration {
                message: format!("invalid table name: {table:?}"),
            });
        }
        if options.create_or_replace {
            sqlx::query(&sql::drop_table_sql(&table)).execute(&pool).await?;
        }
        sqlx::query(&sql::create_table_sql(&table, &schema, dimension))
            .execute(&pool)
            .await?;
        let insert_sql = sql::insert_sql(&table, &schema, true);
        let search_sql = sql::search_sql(&table, &schema, None)?;
        let inner = SqliteDocStore::attach(pool, table, schema, options);
        let store = Self {
            inner,
            embedder,
            dimension,
            insert_sql,
            search_sql,
        };
        let rows = store.count_documents().await?;
        tracing::info!(
            table = %store.inner.table(),
            dimension,
            model = store.embedder.model_name(),
            rows,
            "vector store ready"
        );
        Ok(store)
    }

    pub fn table(&self) -> &str {
        self.inner.table()
    }

    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }
}

#[async_trait::async_trait]
impl DocStore for SqliteVectorStore {
    async fn add_document(&self, doc: &mut Document) -> Result<()> {
        doc.ensure_id();
        let options = self.inner.options();
        let ordered = match self.inner.metadata_schema().check_document(doc, options.strict) {
            Ok(values) => values,
            Err(violations) => return Err(validation_error(violations)),
        };
        let embedding = self.embedder.embed(&doc.text).await?;
        let blob = sql::encode_embedding(&embedding, self.dimension)?;
        let mut tx = self.inner.pool().begin().await?;
        let mut query = sqlx::query(&self.insert_sql)
            .bind(doc.id.clone())
            .bind(doc.text.clone())
            .bind(blob);
        for value in ordered {
            query = sql::bind_field(query, value);
        }
        match query.execute(&mut *tx).await {
            Ok(_) => {
                tx.commit().await.map_err(|e| EngineError::Transaction {
                    message: e.to_string(),
                })?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed insert also failed");
                }
                Err(EngineError::Database(e))
            }
        }
    }

    async fn add_documents(&self, docs: &mut [Document]) -> Result<UpdateResult> {
        let mut result = UpdateResult::default();
        if docs.is_empty() {
            return Ok(result);
        }
        for doc in docs.iter_mut() {
            doc.ensure_id();
        }
        let options = self.inner.options();
        let schema = self.inner.metadata_schema();
        // validate up front; embeddings are only requested for rows that can land
        let plans: Vec<_> = docs
            .iter()
            .map(|doc| schema.check_document(doc, options.strict))
            .collect();
        let texts: Vec<String> = docs
            .iter()
            .zip(&plans)
            .filter(|(_, plan)| plan.is_ok())
            .map(|(doc, _)| doc.text.clone())
            .collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts).await?
        };
        if embeddings.len() != texts.len() {
            return Err(EngineError::EmbeddingError {
                message: format!("expected {} embeddings, got {}", texts.len(), embeddings.len()),
            });
        }

        let mut tx = self.inner.pool().begin().await?;
        let mut embedded = 0usize;
        for (doc, plan) in docs.iter().zip(plans) {
            let ordered = match plan {
                Ok(values) => values,
                Err(violations) => {
                    tracing::warn!(id = %doc.id, ?violations, "document failed validation");
                    result.failed_documents.push(doc.clone());
                    continue;
                }
            };
            // a wrong-width embedding poisons the whole batch; the open
            // transaction rolls back on drop
            let blob = sql::encode_embedding(&embeddings[embedded], self.dimension)?;
            embedded += 1;
            let mut query = sqlx::query(&self.insert_sql)
                .bind(doc.id.clone())
                .bind(doc.text.clone())
                .bind(blob);
            for value in ordered {
                query = sql::bind_field(query, value);
            }
            match query.execute(&mut *tx).await {
                Ok(done) => {
                    result.affected_rows += done.rows_affected();
                    result.returned_ids.push(doc.id.clone());
                }
                Err(e) => {
                    tracing::warn!(id = %doc.id, error = %e, "row insert failed");
                    result.failed_documents.push(doc.clone());
                }
            }
        }
        tx.commit().await.map_err(|e| EngineError::Transaction {
            message: e.to_string(),
        })?;
        crate::metrics::record_ingestion(
            self.inner.table(),
            result.affected_rows,
            result.failed_documents.len(),
        );
        tracing::debug!(
            table = %self.inner.table(),
            stored = result.affected_rows,
            failed = result.failed_documents.len(),
            "bulk embed-and-insert complete"
        );
        Ok(result)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<UpdateResult> {
        self.inner.delete_documents(ids).await
    }

    async fn delete_documents_matching(&self, filter: &MetadataFilter) -> Result<UpdateResult> {
        self.inner.delete_documents_matching(filter).await
    }

    async fn multi_get_documents(&self, ids: &[String]) -> Result<Vec<Document>> {
        self.inner.multi_get_documents(ids).await
    }

    async fn find_documents(&self, request: &FindRequest) -> Result<Vec<Document>> {
        self.inner.find_documents(request).await
    }

    async fn count_documents(&self) -> Result<u64> {
        self.inner.count_documents().await
    }

    fn metadata_schema(&self) -> &MetadataSchema {
        self.inner.metadata_schema()
    }

    async fn destroy(&self) -> Result<()> {
        self.inner.destroy().await
    }
}

#[async_trait::async_trait]
impl VectorStore for SqliteVectorStore {
    async fn search_documents(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        if request.top_k == 0 {
            return Err(EngineError::Validation {
                message: "top_k must be positive".into(),
                field: Some("top_k".into()),
            });
        }
        let start = Instant::now();
        let embedding = self.embedder.embed(&request.query).await?;
        let blob = sql::encode_embedding(&embedding, self.dimension)?;
        let rows = match &request.filter {
            // hot path: the statement generated at open stays in the
            // prepared-statement cache
            None => {
                sqlx::query(&self.search_sql)
                    .bind(blob)
                    .bind(request.top_k as i64)
                    .fetch_all(self.inner.pool())
                    .await?
            }
            Some(filter) => {
                let statement =
                    sql::search_sql(self.inner.table(), self.inner.metadata_schema(), Some(filter))?;
                tracing::debug!(sql = %statement, "generated filtered search");
                sqlx::query(&statement)
                    .persistent(false)
                    .bind(blob)
                    .bind(request.top_k as i64)
                    .fetch_all(self.inner.pool())
                    .await?
            }
        };
        let docs = rows
            .iter()
            .map(|row| sql::document_from_row(row, self.inner.metadata_schema()))
            .collect::<Result<Vec<_>>>()?;
        crate::metrics::record_search(start.elapsed().as_secs_f64(), "vector", docs.len());
        tracing::debug!(hits = docs.len(), "vector similarity search complete");
        Ok(docs)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
