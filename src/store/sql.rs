//! Schema-driven SQL generation and row/embedding codecs.
//!
//! Every statement puts columns in the fixed order `id, text, [vector],
//! <schema fields in declared order>`, and [`document_from_row`] walks the
//! same order when mapping rows back. Write path and read path agreeing on
//! this order is a correctness invariant; reordering a schema over existing
//! data corrupts reads.

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};

use crate::document::{Document, FindRequest, MetadataFilter};
use crate::errors::{EngineError, Result};
use crate::schema::{FieldKind, FieldValue, MetadataField, MetadataSchema};

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// `CREATE TABLE IF NOT EXISTS` for a store table. `dimension == 0` declares
/// a plain document table; a positive dimension adds the embedding column.
pub(crate) fn create_table_sql(table: &str, schema: &MetadataSchema, dimension: usize) -> String {
    let mut columns = vec![
        "id VARCHAR PRIMARY KEY".to_string(),
        "text VARCHAR NOT NULL".to_string(),
    ];
    if dimension > 0 {
        // embeddings are little-endian f32 blobs; width is enforced by the
        // encoder, not the column type
        columns.push("vector BLOB NOT NULL".to_string());
    }
    for spec in schema.fields() {
        columns.push(format!("{} {}", spec.name, spec.kind.sql_type()));
    }
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table, columns.join(", "))
}

pub(crate) fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", table)
}

/// Read-path projection: `id, text, <schema fields>`. The vector column is
/// never read back; embeddings are write-only.
pub(crate) fn projection(schema: &MetadataSchema) -> String {
    let mut columns = vec!["id".to_string(), "text".to_string()];
    for spec in schema.fields() {
        columns.push(spec.name.clone());
    }
    columns.join(", ")
}

pub(crate) fn insert_sql(table: &str, schema: &MetadataSchema, with_vector: bool) -> String {
    let mut columns = vec!["id", "text"];
    if with_vector {
        columns.push("vector");
    }
    for spec in schema.fields() {
        columns.push(spec.name.as_str());
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

pub(crate) fn count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", table)
}

pub(crate) fn multi_get_sql(table: &str, schema: &MetadataSchema, id_count: usize) -> String {
    let placeholders = vec!["?"; id_count].join(", ");
    format!(
        "SELECT {} FROM {} WHERE id IN ({})",
        projection(schema),
        table,
        placeholders
    )
}

pub(crate) fn delete_by_ids_sql(table: &str, id_count: usize) -> String {
    let placeholders = vec!["?"; id_count].join(", ");
    format!("DELETE FROM {} WHERE id IN ({})", table, placeholders)
}

pub(crate) fn delete_by_filter_sql(
    table: &str,
    schema: &MetadataSchema,
    filter: &MetadataFilter,
) -> Result<String> {
    Ok(format!(
        "DELETE FROM {} WHERE {}",
        table,
        render_filter(schema, filter)?
    ))
}

/// Similarity search over the embedding column. With no filter the returned
/// string is generated once at open and executed through the prepared
/// statement cache; with a filter the predicate is rendered inline because
/// parameterization does not extend to dynamic predicate shapes.
pub(crate) fn search_sql(
    table: &str,
    schema: &MetadataSchema,
    filter: Option<&MetadataFilter>,
) -> Result<String> {
    let where_clause = match filter {
        Some(filter) => format!(" WHERE {}", render_filter(schema, filter)?),
        None => String::new(),
    };
    Ok(format!(
        "SELECT {}, 1.0 - vec_distance_cosine(vector, ?) AS score FROM {}{} ORDER BY score DESC LIMIT ?",
        projection(schema),
        table,
        where_clause
    ))
}

pub(crate) fn find_sql(table: &str, schema: &MetadataSchema, request: &FindRequest) -> Result<String> {
    let mut sql = format!("SELECT {} FROM {}", projection(schema), table);
    if let Some(filter) = &request.filter {
        sql.push_str(" WHERE ");
        sql.push_str(&render_filter(schema, filter)?);
    }
    match (request.limit, request.offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        // SQLite requires a LIMIT before OFFSET; -1 means unbounded
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }
    Ok(sql)
}

/// Render the single-equality predicate, checking the field against the
/// schema so a bad filter fails as a validation error instead of a backend
/// syntax error.
pub(crate) fn render_filter(schema: &MetadataSchema, filter: &MetadataFilter) -> Result<String> {
    match filter {
        MetadataFilter::Equals { field, value } => {
            let spec = schema.field(field).ok_or_else(|| EngineError::Validation {
                message: format!("filter references unknown metadata field: {field}"),
                field: Some(field.clone()),
            })?;
            if spec.kind != value.kind() {
                return Err(EngineError::Validation {
                    message: format!(
                        "filter value kind {:?} does not match field kind {:?}",
                        value.kind(),
                        spec.kind
                    ),
                    field: Some(field.clone()),
                });
            }
            Ok(format!("{} = {}", field, render_literal(value)))
        }
    }
}

fn render_literal(value: &FieldValue) -> String {
    match value {
        FieldValue::Int32(v) => v.to_string(),
        FieldValue::Int64(v) => v.to_string(),
        FieldValue::Float32(v) => v.to_string(),
        FieldValue::Float64(v) => v.to_string(),
        // bools are stored with integer affinity
        FieldValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        FieldValue::String(v) => format!("'{}'", v.replace('\'', "''")),
    }
}

/// Bind a metadata value onto a query in column position order.
pub(crate) fn bind_field<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Int32(v) => query.bind(*v),
        FieldValue::Int64(v) => query.bind(*v),
        FieldValue::Float32(v) => query.bind(*v),
        FieldValue::Float64(v) => query.bind(*v),
        FieldValue::Bool(v) => query.bind(*v),
        FieldValue::String(v) => query.bind(v.clone()),
    }
}

/// Map a row back into a document by walking the schema in declaration
/// order, mirroring the projection layout.
pub(crate) fn document_from_row(row: &SqliteRow, schema: &MetadataSchema) -> Result<Document> {
    let id: String = row.try_get(0)?;
    let text: String = row.try_get(1)?;
    let mut metadata = Vec::with_capacity(schema.len());
    for (i, spec) in schema.fields().iter().enumerate() {
        let column = i + 2;
        let value = match spec.kind {
            FieldKind::Int32 => FieldValue::Int32(row.try_get(column)?),
            FieldKind::Int64 => FieldValue::Int64(row.try_get(column)?),
            FieldKind::Float32 => FieldValue::Float32(row.try_get(column)?),
            FieldKind::Float64 => FieldValue::Float64(row.try_get(column)?),
            FieldKind::Bool => FieldValue::Bool(row.try_get(column)?),
            FieldKind::String => FieldValue::String(row.try_get(column)?),
        };
        metadata.push(MetadataField::new(spec.name.clone(), value));
    }
    Ok(Document { id, text, metadata })
}

/// Serialize an embedding to the little-endian f32 blob layout sqlite-vec
/// reads, enforcing the configured width.
pub(crate) fn encode_embedding(embedding: &[f32], dimension: usize) -> Result<Vec<u8>> {
    if embedding.len() != dimension {
        return Err(EngineError::DimensionMismatch {
            expected: dimension,
            actual: embedding.len(),
        });
    }
    Ok(embedding.iter().flat_map(|v| v.to_le_bytes()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;

    fn schema() -> MetadataSchema {
        MetadataSchema::builder()
            .field("parent_doc_id", FieldKind::String)
            .field("page_no", FieldKind::Int32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_table_column_order() {
        let sql = create_table_sql("chunks", &schema(), 4);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS chunks (id VARCHAR PRIMARY KEY, text VARCHAR NOT NULL, \
             vector BLOB NOT NULL, parent_doc_id VARCHAR, page_no INTEGER)"
        );
    }

    #[test]
    fn test_create_table_without_vector() {
        let sql = create_table_sql("docs", &schema(), 0);
        assert!(!sql.contains("vector"));
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS docs (id VARCHAR PRIMARY KEY"));
    }

    #[test]
    fn test_insert_placeholder_count() {
        let sql = insert_sql("chunks", &schema(), true);
        assert_eq!(sql.matches('?').count(), 5);
        let sql = insert_sql("docs", &schema(), false);
        assert_eq!(sql.matches('?').count(), 4);
    }

    #[test]
    fn test_search_sql_unfiltered() {
        let sql = search_sql("chunks", &schema(), None).unwrap();
        assert_eq!(
            sql,
            "SELECT id, text, parent_doc_id, page_no, 1.0 - vec_distance_cosine(vector, ?) AS score \
             FROM chunks ORDER BY score DESC LIMIT ?"
        );
    }

    #[test]
    fn test_search_sql_with_filter() {
        let filter = MetadataFilter::equals("page_no", FieldValue::Int32(2));
        let sql = search_sql("chunks", &schema(), Some(&filter)).unwrap();
        assert!(sql.contains("WHERE page_no = 2 ORDER BY score DESC"));
    }

    #[test]
    fn test_filter_string_literal_is_escaped() {
        let filter = MetadataFilter::equals(
            "parent_doc_id",
            FieldValue::String("it's-a'trap".into()),
        );
        let rendered = render_filter(&schema(), &filter).unwrap();
        assert_eq!(rendered, "parent_doc_id = 'it''s-a''trap'");
    }

    #[test]
    fn test_filter_unknown_field_rejected() {
        let filter = MetadataFilter::equals("missing", FieldValue::Int32(1));
        let err = render_filter(&schema(), &filter).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_filter_kind_mismatch_rejected() {
        let filter = MetadataFilter::equals("page_no", FieldValue::String("2".into()));
        assert!(render_filter(&schema(), &filter).is_err());
    }

    #[test]
    fn test_find_sql_pagination() {
        let request = FindRequest {
            filter: None,
            limit: Some(10),
            offset: Some(20),
        };
        let sql = find_sql("docs", &schema(), &request).unwrap();
        assert!(sql.ends_with("LIMIT 10 OFFSET 20"));

        let request = FindRequest {
            filter: None,
            limit: None,
            offset: Some(5),
        };
        let sql = find_sql("docs", &schema(), &request).unwrap();
        assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
    }

    #[test]
    fn test_encode_embedding_layout() {
        let blob = encode_embedding(&[1.0, -2.0], 2).unwrap();
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&blob[4..8], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn test_encode_embedding_wrong_width() {
        let err = encode_embedding(&[1.0, 2.0, 3.0], 2).unwrap_err();
        assert!(matches!(err, EngineError::DimensionMismatch { expected: 2, actual: 3 }));
    }
}
