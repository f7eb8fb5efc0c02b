//! Core retrieval data model: documents, search/find requests, bulk results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{FieldValue, MetadataField, PARENT_DOC_ID_KEY};
use crate::DEFAULT_TOP_K;

/// A unit of retrievable text with typed metadata.
///
/// Equality is structural: two documents are equal only when id, text, and the
/// full metadata list agree. Deduplication relies on this, so derived
/// documents that differ only in metadata stay distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique id within a store table; blank until assigned by an insert.
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            metadata: Vec::new(),
        }
    }

    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Vec::new(),
        }
    }

    /// Assign a generated id when none is preset; returns the effective id.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        &self.id
    }

    /// First metadata value stored under `name`.
    pub fn metadata_value(&self, name: &str) -> Option<&FieldValue> {
        self.metadata
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }

    /// Set a metadata field, replacing an existing value of the same name.
    pub fn set_metadata(&mut self, name: &str, value: FieldValue) {
        if let Some(field) = self.metadata.iter_mut().find(|field| field.name == name) {
            field.value = value;
        } else {
            self.metadata.push(MetadataField::new(name, value));
        }
    }

    /// Parent document id recorded by chunked/guidance ingestion, if any.
    pub fn parent_doc_id(&self) -> Option<&str> {
        self.metadata_value(PARENT_DOC_ID_KEY).and_then(FieldValue::as_str)
    }
}

/// Single-term metadata predicate.
///
/// Equality on one field is the only interpreted shape; richer boolean
/// composition is an extension point and deliberately not given semantics
/// here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MetadataFilter {
    Equals { field: String, value: FieldValue },
}

impl MetadataFilter {
    pub fn equals(field: impl Into<String>, value: FieldValue) -> Self {
        MetadataFilter::Equals {
            field: field.into(),
            value,
        }
    }
}

/// A similarity or keyword search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    #[serde(default)]
    pub filter: Option<MetadataFilter>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            top_k: DEFAULT_TOP_K,
            filter: None,
        }
    }
}

/// A table-scan request with optional predicate and pagination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindRequest {
    #[serde(default)]
    pub filter: Option<MetadataFilter>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// Outcome of a bulk write.
///
/// Bulk operations favor maximal progress: a document that fails validation
/// or its row insert lands in `failed_documents` while the rest of the batch
/// proceeds. `returned_ids` preserves insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    pub affected_rows: u64,
    pub returned_ids: Vec<String>,
    pub failed_documents: Vec<Document>,
}

impl UpdateResult {
    /// Fold another result into this one, keeping list ordering.
    pub fn merge(&mut self, other: UpdateResult) {
        self.affected_rows += other.affected_rows;
        self.returned_ids.extend(other.returned_ids);
        self.failed_documents.extend(other.failed_documents);
    }
}
