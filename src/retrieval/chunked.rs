//! Chunked multi-vector retrieval.
//!
//! Ingestion optionally splits each input into parent-level units, then
//! derives child chunks from every unit. Queries match the small child
//! chunks and return the larger units for context.

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{Document, SearchRequest, UpdateResult};
use crate::errors::{EngineError, Result};
use crate::retrieval::multi_vector::{Guidance, MultiVectorRetriever};
use crate::retrieval::{RetrievalMode, Retriever, StatefulRetriever};
use crate::schema::{
    fill_preset_metadata, FieldValue, FILE_SOURCE_KEY, PAGE_NO_KEY, PARENT_DOC_ID_KEY,
};
use crate::splitter::TextSplitter;
use crate::store::{DocStore, VectorStore};

/// Splits a unit into child chunks tagged with a 1-based `page_no` and the
/// unit id as `file_source`. The unit must already carry an id; chunks
/// derived from an unidentified unit could never backtrack.
pub struct ChildSplitGuidance {
    splitter: Arc<dyn TextSplitter>,
}

impl ChildSplitGuidance {
    pub fn new(splitter: Arc<dyn TextSplitter>) -> Self {
        Self { splitter }
    }
}

#[async_trait]
impl Guidance for ChildSplitGuidance {
    async fn derive(&self, parent: &Document) -> Result<Vec<Document>> {
        if parent.id.is_empty() {
            return Err(EngineError::ContractViolation {
                message: "child splitting requires a parent with an assigned id".into(),
            });
        }
        let chunks = self.splitter.split_text(&parent.text);
        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut doc = Document::new(chunk);
                doc.set_metadata(PAGE_NO_KEY, FieldValue::Int32((i + 1) as i32));
                doc.set_metadata(FILE_SOURCE_KEY, FieldValue::String(parent.id.clone()));
                doc
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "child_split"
    }
}

pub struct ChunkedMultiVectorRetriever {
    inner: MultiVectorRetriever,
    parent_splitter: Option<Arc<dyn TextSplitter>>,
}

impl ChunkedMultiVectorRetriever {
    pub fn new(
        doc_store: Arc<dyn DocStore>,
        vector_store: Arc<dyn VectorStore>,
        child_splitter: Arc<dyn TextSplitter>,
    ) -> Self {
        Self {
            inner: MultiVectorRetriever::new(
                doc_store,
                vector_store,
                Arc::new(ChildSplitGuidance::new(child_splitter)),
            ),
            parent_splitter: None,
        }
    }

    /// Split inputs into parent-level units before child derivation. Without
    /// this, each input document is its own unit.
    pub fn with_parent_splitter(mut self, splitter: Arc<dyn TextSplitter>) -> Self {
        self.parent_splitter = Some(splitter);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.inner = self.inner.with_batch_size(batch_size);
        self
    }

    /// Turn input documents into the units actually ingested: each unit keeps
    /// the input's metadata and points back at it via `parent_doc_id` plus a
    /// sequential `page_no`.
    fn split_into_units(&self, splitter: &Arc<dyn TextSplitter>, docs: Vec<Document>) -> Vec<Document> {
        let mut units = Vec::new();
        for mut doc in docs {
            doc.ensure_id();
            let pieces = splitter.split_text(&doc.text);
            if pieces.is_empty() {
                tracing::warn!(id = %doc.id, "input produced no parent units");
                continue;
            }
            for (i, piece) in pieces.into_iter().enumerate() {
                let mut unit = Document::new(piece);
                unit.metadata = doc.metadata.clone();
                unit.set_metadata(PARENT_DOC_ID_KEY, FieldValue::String(doc.id.clone()));
                unit.set_metadata(PAGE_NO_KEY, FieldValue::Int32((i + 1) as i32));
                fill_preset_metadata(&mut unit);
                units.push(unit);
            }
        }
        units
    }
}

#[async_trait]
impl Retriever for ChunkedMultiVectorRetriever {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        self.inner.retrieve(request).await
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::MultiVector
    }
}

#[async_trait]
impl StatefulRetriever for ChunkedMultiVectorRetriever {
    async fn ingest(&self, docs: Vec<Document>) -> Result<UpdateResult> {
        let units = match &self.parent_splitter {
            None => docs,
            Some(splitter) => self.split_into_units(splitter, docs),
        };
        self.inner.ingest(units).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MockEmbedder;
    use crate::schema::{FieldKind, MetadataField, MetadataSchema};
    use crate::splitter::CharacterTextSplitter;
    use crate::store::{open_memory_pool, SqliteDocStore, SqliteVectorStore, StoreOptions};

    async fn open_stores(parent_schema: MetadataSchema) -> (Arc<SqliteDocStore>, Arc<SqliteVectorStore>) {
        let pool = open_memory_pool().await.unwrap();
        let docs = SqliteDocStore::create_or_open(
            pool.clone(),
            "parents",
            parent_schema,
            StoreOptions::default(),
        )
        .await
        .unwrap();
        let embedder = Arc::new(MockEmbedder::new(64));
        let vectors = SqliteVectorStore::create_or_open(
            pool,
            "child_chunks",
            MetadataSchema::with_presets(),
            embedder,
            64,
            StoreOptions::default(),
        )
        .await
        .unwrap();
        (Arc::new(docs), Arc::new(vectors))
    }

    #[tokio::test]
    async fn test_child_split_guidance_tags_chunks() {
        let splitter = Arc::new(CharacterTextSplitter::new(30).unwrap());
        let guidance = ChildSplitGuidance::new(splitter);
        let parent = Document::with_id("p", "The cat sat on the mat. Dogs bark loudly at night.");
        let derived = guidance.derive(&parent).await.unwrap();
        assert!(derived.len() >= 2);
        assert_eq!(derived[0].metadata_value(PAGE_NO_KEY), Some(&FieldValue::Int32(1)));
        assert_eq!(derived[1].metadata_value(PAGE_NO_KEY), Some(&FieldValue::Int32(2)));
        for chunk in &derived {
            assert_eq!(
                chunk.metadata_value(FILE_SOURCE_KEY),
                Some(&FieldValue::String("p".into()))
            );
        }
    }

    #[tokio::test]
    async fn test_child_split_requires_parent_id() {
        let splitter = Arc::new(CharacterTextSplitter::new(30).unwrap());
        let guidance = ChildSplitGuidance::new(splitter);
        let parent = Document::new("no id assigned yet");
        let err = guidance.derive(&parent).await.unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[tokio::test]
    async fn test_parent_units_become_retrieval_units() {
        let (docs, vectors) = open_stores(MetadataSchema::empty()).await;
        // child chunks big enough to hold a whole parent unit
        let retriever = ChunkedMultiVectorRetriever::new(
            docs.clone(),
            vectors,
            Arc::new(CharacterTextSplitter::new(100).unwrap()),
        )
        .with_parent_splitter(Arc::new(CharacterTextSplitter::new(30).unwrap()));

        let text = "The cat sat on the mat. Dogs bark loudly at night.";
        let result = retriever.ingest(vec![Document::new(text)]).await.unwrap();
        // two sentences, two parent units
        assert_eq!(result.affected_rows, 2);
        assert_eq!(docs.count_documents().await.unwrap(), 2);

        let hits = retriever
            .retrieve(&SearchRequest::new("The cat sat on the mat.", 1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "The cat sat on the mat.");
    }

    #[tokio::test]
    async fn test_units_point_back_at_the_input() {
        let (docs, vectors) = open_stores(MetadataSchema::with_presets()).await;
        let retriever = ChunkedMultiVectorRetriever::new(
            docs.clone(),
            vectors,
            Arc::new(CharacterTextSplitter::new(100).unwrap()),
        )
        .with_parent_splitter(Arc::new(CharacterTextSplitter::new(30).unwrap()));

        let mut input = Document::new("The cat sat on the mat. Dogs bark loudly at night.");
        let original_id = input.ensure_id().to_string();
        retriever.ingest(vec![input]).await.unwrap();

        let mut units = docs
            .find_documents(&crate::document::FindRequest::default())
            .await
            .unwrap();
        assert_eq!(units.len(), 2);
        units.sort_by_key(|u| match u.metadata_value(PAGE_NO_KEY) {
            Some(FieldValue::Int32(n)) => *n,
            _ => 0,
        });
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit.parent_doc_id(), Some(original_id.as_str()));
            assert_eq!(
                unit.metadata_value(PAGE_NO_KEY),
                Some(&FieldValue::Int32((i + 1) as i32))
            );
        }
    }

    #[tokio::test]
    async fn test_without_parent_splitter_input_is_the_unit() {
        let (docs, vectors) = open_stores(MetadataSchema::empty()).await;
        let retriever = ChunkedMultiVectorRetriever::new(
            docs,
            vectors.clone(),
            Arc::new(CharacterTextSplitter::new(100).unwrap()),
        );

        let text = "A single short document.";
        retriever.ingest(vec![Document::new(text)]).await.unwrap();
        // the lone child chunk holds the full text
        assert_eq!(vectors.count_documents().await.unwrap(), 1);

        let hits = retriever.retrieve(&SearchRequest::new(text, 1)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, text);
    }

    #[tokio::test]
    async fn test_units_inherit_input_metadata() {
        let schema = MetadataSchema::builder()
            .field("source", FieldKind::String)
            .build()
            .unwrap();
        let (docs, vectors) = open_stores(schema).await;
        let retriever = ChunkedMultiVectorRetriever::new(
            docs.clone(),
            vectors,
            Arc::new(CharacterTextSplitter::new(100).unwrap()),
        )
        .with_parent_splitter(Arc::new(CharacterTextSplitter::new(30).unwrap()));

        let mut input = Document::new("The cat sat on the mat. Dogs bark loudly at night.");
        input
            .metadata
            .push(MetadataField::new("source", FieldValue::String("cats.pdf".into())));
        retriever.ingest(vec![input]).await.unwrap();

        let stored = docs
            .find_documents(&crate::document::FindRequest::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        for unit in stored {
            assert_eq!(
                unit.metadata_value("source"),
                Some(&FieldValue::String("cats.pdf".into()))
            );
        }
    }

    #[tokio::test]
    async fn test_two_chunk_document_returns_one_parent() {
        let (docs, vectors) = open_stores(MetadataSchema::empty()).await;
        // capacity 10 packs "A cat sat on a mat." into exactly two chunks
        let retriever = ChunkedMultiVectorRetriever::new(
            docs.clone(),
            vectors.clone(),
            Arc::new(CharacterTextSplitter::new(10).unwrap()),
        );

        let result = retriever
            .ingest(vec![Document::new("A cat sat on a mat.")])
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(docs.count_documents().await.unwrap(), 1);
        assert_eq!(vectors.count_documents().await.unwrap(), 2);

        // both chunks point at the same parent, which comes back once
        let hits = retriever.retrieve(&SearchRequest::new("cat", 10)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "A cat sat on a mat.");
    }

    #[tokio::test]
    async fn test_blank_input_is_skipped() {
        let (docs, vectors) = open_stores(MetadataSchema::empty()).await;
        let retriever = ChunkedMultiVectorRetriever::new(
            docs.clone(),
            vectors,
            Arc::new(CharacterTextSplitter::new(100).unwrap()),
        )
        .with_parent_splitter(Arc::new(CharacterTextSplitter::new(30).unwrap()));

        let result = retriever
            .ingest(vec![Document::new(""), Document::new("Real content here.")])
            .await
            .unwrap();
        assert_eq!(result.affected_rows, 1);
        assert_eq!(docs.count_documents().await.unwrap(), 1);
    }
}
