//! SQLite-backed document store.

use sqlx::sqlite::SqlitePool;

use crate::document::{Document, FindRequest, MetadataFilter, UpdateResult};
use crate::errors::{EngineError, Result};
use crate::schema::{is_valid_identifier, FieldViolation, MetadataSchema};
use crate::store::{sql, DocStore, StoreOptions};

/// Document store over one SQLite table with schema-generated columns.
#[derive(Debug)]
pub struct SqliteDocStore {
    pool: SqlitePool,
    table: String,
    schema: MetadataSchema,
    options: StoreOptions,
    insert_sql: String,
    count_sql: String,
}

impl SqliteDocStore {
    /// Idempotently ensure the backing table exists and open a store over it.
    /// With `create_or_replace` the table is dropped and recreated instead.
    pub async fn create_or_open(
        pool: SqlitePool,
        table: impl Into<String>,
        schema: MetadataSchema,
        options: StoreOptions,
    ) -> Result<Self> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(EngineError::Configuration {
                message: format!("invalid table name: {table:?}"),
            });
        }
        if options.create_or_replace {
            sqlx::query(&sql::drop_table_sql(&table)).execute(&pool).await?;
        }
        sqlx::query(&sql::create_table_sql(&table, &schema, 0))
            .execute(&pool)
            .await?;
        let store = Self::attach(pool, table, schema, options);
        // run the count statement once so its prepared plan exists from open
        let rows = store.count_documents().await?;
        tracing::info!(
            table = %store.table,
            fields = store.schema.len(),
            rows,
            "document store ready"
        );
        Ok(store)
    }

    /// Wrap an existing table without touching DDL. Used by the vector store,
    /// which owns table creation itself.
    pub(crate) fn attach(
        pool: SqlitePool,
        table: String,
        schema: MetadataSchema,
        options: StoreOptions,
    ) -> Self {
        let insert_sql = sql::insert_sql(&table, &schema, false);
        let count_sql = sql::count_sql(&table);
        Self {
            pool,
            table,
            schema,
            options,
            insert_sql,
            count_sql,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn options(&self) -> StoreOptions {
        self.options
    }
}

/// Collapse a violation list into the error carried by single-document
/// inserts; bulk inserts keep the offending document instead.
pub(crate) fn validation_error(violations: Vec<FieldViolation>) -> EngineError {
    let field = violations.first().map(|v| v.field.clone());
    let message = violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ");
    EngineError::Validation { message, field }
}

#[async_trait::async_trait]
impl DocStore for SqliteDocStore {
    async fn add_document(&self, doc: &mut Document) -> Result<()> {
        doc.ensure_id();
        let ordered = match self.schema.check_document(doc, self.options.strict) {
            Ok(values) => values,
            Err(violations) => return Err(validation_error(violations)),
        };
        let mut tx = self.pool.begin().await?;
        let mut query = sqlx::query(&self.insert_sql)
            .bind(doc.id.clone())
            .bind(doc.text.clone());
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
        let mut tx = self.pool.begin().await?;
        for doc in docs.iter() {
            let ordered = match self.schema.check_document(doc, self.options.strict) {
                Ok(values) => values,
                Err(violations) => {
                    tracing::warn!(id = %doc.id, ?violations, "document failed validation");
                    result.failed_documents.push(doc.clone());
                    continue;
                }
            };
            let mut query = sqlx::query(&self.insert_sql)
                .bind(doc.id.clone())
                .bind(doc.text.clone());
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
            &self.table,
            result.affected_rows,
            result.failed_documents.len(),
        );
        tracing::debug!(
            table = %self.table,
            stored = result.affected_rows,
            failed = result.failed_documents.len(),
            "bulk insert complete"
        );
        Ok(result)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<UpdateResult> {
        let mut result = UpdateResult::default();
        if ids.is_empty() {
            return Ok(result);
        }
        let statement = sql::delete_by_ids_sql(&self.table, ids.len());
        let mut query = sqlx::query(&statement);
        for id in ids {
            query = query.bind(id.clone());
        }
        let done = query.execute(&self.pool).await?;
        result.affected_rows = done.rows_affected();
        result.returned_ids = ids.to_vec();
        Ok(result)
    }

    async fn delete_documents_matching(&self, filter: &MetadataFilter) -> Result<UpdateResult> {
        let statement = sql::delete_by_filter_sql(&self.table, &self.schema, filter)?;
        tracing::debug!(sql = %statement, "predicate delete");
        let done = sqlx::query(&statement).execute(&self.pool).await?;
        Ok(UpdateResult {
            affected_rows: done.rows_affected(),
            ..UpdateResult::default()
        })
    }

    async fn multi_get_documents(&self, ids: &[String]) -> Result<Vec<Document>> {
        // degenerate input never reaches the backend
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let statement = sql::multi_get_sql(&self.table, &self.schema, ids.len());
        let mut query = sqlx::query(&statement);
        for id in ids {
            query = query.bind(id.clone());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| sql::document_from_row(row, &self.schema))
            .collect()
    }

    async fn find_documents(&self, request: &FindRequest) -> Result<Vec<Document>> {
        let statement = sql::find_sql(&self.table, &self.schema, request)?;
        let rows = sqlx::query(&statement).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| sql::document_from_row(row, &self.schema))
            .collect()
    }

    async fn count_documents(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&self.count_sql).fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    fn metadata_schema(&self) -> &MetadataSchema {
        &self.schema
    }

    async fn destroy(&self) -> Result<()> {
        sqlx::query(&sql::drop_table_sql(&self.table))
            .execute(&self.pool)
            .await?;
        tracing::info!(table = %self.table, "document store destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldValue, MetadataField};
    use crate::store::open_memory_pool;

    fn schema() -> MetadataSchema {
        MetadataSchema::builder()
            .field("source", FieldKind::String)
            .field("page_no", FieldKind::Int32)
            .field("fresh", FieldKind::Bool)
            .build()
            .unwrap()
    }

    fn doc(text: &str, source: &str, page: i32) -> Document {
        let mut d = Document::new(text);
        d.metadata.push(MetadataField::new("fresh", FieldValue::Bool(true)));
        d.metadata
            .push(MetadataField::new("source", FieldValue::String(source.into())));
        d.metadata.push(MetadataField::new("page_no", FieldValue::Int32(page)));
        d
    }

    async fn open_store(options: StoreOptions) -> SqliteDocStore {
        let pool = open_memory_pool().await.unwrap();
        SqliteDocStore::create_or_open(pool, "docs", schema(), options)
            .await
            .unwrap()
    }

    fn assert_same_document(left: &Document, right: &Document) {
        assert_eq!(left.id, right.id);
        assert_eq!(left.text, right.text);
        let mut a = left.metadata.clone();
        let mut b = right.metadata.clone();
        a.sort_by(|x, y| x.name.cmp(&y.name));
        b.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_schema_round_trip() {
        let store = open_store(StoreOptions::default()).await;
        let mut docs = vec![doc("the first document", "a.pdf", 3)];
        let result = store.add_documents(&mut docs).await.unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(result.returned_ids.len(), 1);
        assert!(!docs[0].id.is_empty());

        let fetched = store.multi_get_documents(&result.returned_ids).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_same_document(&docs[0], &fetched[0]);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let store = open_store(StoreOptions::default()).await;
        let mut docs = vec![
            doc("first", "a.pdf", 1),
            doc("   ", "a.pdf", 2), // blank text fails validation
            doc("third", "a.pdf", 3),
        ];
        let result = store.add_documents(&mut docs).await.unwrap();
        assert_eq!(result.affected_rows, 2);
        assert_eq!(result.failed_documents.len(), 1);
        assert_eq!(result.failed_documents[0].text, "   ");
        assert_eq!(store.count_documents().await.unwrap(), 2);

        let survivors = store.multi_get_documents(&result.returned_ids).await.unwrap();
        assert_eq!(survivors.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_id_row_is_isolated() {
        let store = open_store(StoreOptions::default()).await;
        let mut first = vec![Document::with_id("dup", "original")];
        // schema requires metadata
        first[0]
            .metadata
            .push(MetadataField::new("source", FieldValue::String("a".into())));
        first[0].metadata.push(MetadataField::new("page_no", FieldValue::Int32(1)));
        first[0].metadata.push(MetadataField::new("fresh", FieldValue::Bool(false)));
        store.add_documents(&mut first).await.unwrap();

        let mut batch = vec![first[0].clone(), doc("survivor", "b.pdf", 9)];
        let result = store.add_documents(&mut batch).await.unwrap();
        // primary-key conflict marks the row failed without aborting the batch
        assert_eq!(result.affected_rows, 1);
        assert_eq!(result.failed_documents.len(), 1);
        assert_eq!(result.failed_documents[0].id, "dup");
        assert_eq!(store.count_documents().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_single_add_validation_fails_loudly() {
        let store = open_store(StoreOptions::default()).await;
        let mut bad = Document::new("text without metadata");
        let err = store.add_document(&mut bad).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert_eq!(store.count_documents().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_single_add_round_trip() {
        let store = open_store(StoreOptions::default()).await;
        let mut d = doc("solo insert", "s.pdf", 5);
        store.add_document(&mut d).await.unwrap();
        assert!(!d.id.is_empty());
        let fetched = store.multi_get_documents(&[d.id.clone()]).await.unwrap();
        assert_same_document(&d, &fetched[0]);
    }

    #[tokio::test]
    async fn test_empty_multi_get_skips_backend() {
        let store = open_store(StoreOptions::default()).await;
        store.destroy().await.unwrap();
        // the table is gone, so any backend call would error
        let fetched = store.multi_get_documents(&[]).await.unwrap();
        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_ids_echoes_input() {
        let store = open_store(StoreOptions::default()).await;
        let mut docs = vec![doc("one", "a", 1), doc("two", "a", 2)];
        let added = store.add_documents(&mut docs).await.unwrap();
        let result = store.delete_documents(&added.returned_ids[..1].to_vec()).await.unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(result.returned_ids, added.returned_ids[..1].to_vec());
        assert_eq!(store.count_documents().await.unwrap(), 1);

        let noop = store.delete_documents(&[]).await.unwrap();
        assert_eq!(noop.affected_rows, 0);
    }

    #[tokio::test]
    async fn test_delete_by_predicate() {
        let store = open_store(StoreOptions::default()).await;
        let mut docs = vec![doc("one", "a.pdf", 1), doc("two", "b.pdf", 2), doc("three", "a.pdf", 3)];
        store.add_documents(&mut docs).await.unwrap();
        let filter = MetadataFilter::equals("source", FieldValue::String("a.pdf".into()));
        let result = store.delete_documents_matching(&filter).await.unwrap();
        assert_eq!(result.affected_rows, 2);
        assert_eq!(store.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_documents_with_filter_and_pagination() {
        let store = open_store(StoreOptions::default()).await;
        let mut docs: Vec<Document> = (0..5).map(|i| doc(&format!("doc {i}"), "a.pdf", i)).collect();
        docs.push(doc("other", "b.pdf", 0));
        store.add_documents(&mut docs).await.unwrap();

        let request = FindRequest {
            filter: Some(MetadataFilter::equals("source", FieldValue::String("a.pdf".into()))),
            limit: Some(3),
            offset: Some(1),
        };
        let found = store.find_documents(&request).await.unwrap();
        assert_eq!(found.len(), 3);
        for d in &found {
            assert_eq!(d.metadata_value("source"), Some(&FieldValue::String("a.pdf".into())));
        }
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_undeclared_fields() {
        let store = open_store(StoreOptions {
            strict: true,
            ..StoreOptions::default()
        })
        .await;
        let mut d = doc("has extras", "a.pdf", 1);
        d.metadata.push(MetadataField::new("extra", FieldValue::Int64(1)));
        let mut batch = vec![d];
        let result = store.add_documents(&mut batch).await.unwrap();
        assert_eq!(result.affected_rows, 0);
        assert_eq!(result.failed_documents.len(), 1);
    }

    #[tokio::test]
    async fn test_create_or_replace_resets_table() {
        let pool = open_memory_pool().await.unwrap();
        let store = SqliteDocStore::create_or_open(pool.clone(), "docs", schema(), StoreOptions::default())
            .await
            .unwrap();
        let mut docs = vec![doc("persisted", "a.pdf", 1)];
        store.add_documents(&mut docs).await.unwrap();
        assert_eq!(store.count_documents().await.unwrap(), 1);

        let replaced = SqliteDocStore::create_or_open(
            pool,
            "docs",
            schema(),
            StoreOptions {
                create_or_replace: true,
                ..StoreOptions::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(replaced.count_documents().await.unwrap(), 0);
    }
}
