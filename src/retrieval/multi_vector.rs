//! Multi-vector retrieval.
//!
//! Parents live in a document store; smaller derived documents (summaries,
//! hypothetical questions, chunks) live in a vector store and carry a
//! `parent_doc_id` pointer. Search runs over the derived side, results
//! backtrack to their parents.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::document::{Document, SearchRequest, UpdateResult};
use crate::errors::{EngineError, Result};
use crate::models::{clean_lines, CompletionModel};
use crate::retrieval::{RetrievalMode, Retriever, StatefulRetriever};
use crate::schema::{fill_preset_metadata, FieldValue, PAGE_NO_KEY, PARENT_DOC_ID_KEY};
use crate::store::{DocStore, VectorStore};

const DEFAULT_BATCH_SIZE: usize = 50;

/// Derives the documents stored on the vector side for one parent.
#[async_trait]
pub trait Guidance: Send + Sync {
    async fn derive(&self, parent: &Document) -> Result<Vec<Document>>;

    fn name(&self) -> &'static str;
}

const SUMMARY_PROMPT: &str = "Summarize the following text in one short paragraph. \
Reply with the summary only.\n\nText:\n{text}";

/// One summary per parent, tagged `page_no = 0`.
pub struct SummaryGuidance {
    model: Arc<dyn CompletionModel>,
}

impl SummaryGuidance {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Guidance for SummaryGuidance {
    async fn derive(&self, parent: &Document) -> Result<Vec<Document>> {
        let prompt = SUMMARY_PROMPT.replace("{text}", &parent.text);
        let summary = self.model.complete(&prompt).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            tracing::debug!(parent = %parent.id, "model returned an empty summary");
            return Ok(Vec::new());
        }
        let mut doc = Document::new(summary);
        doc.set_metadata(PAGE_NO_KEY, FieldValue::Int32(0));
        Ok(vec![doc])
    }

    fn name(&self) -> &'static str {
        "summary"
    }
}

const QUERIES_PROMPT: &str = "Generate {count} hypothetical questions that the following \
text could answer. Reply with one question per line, nothing else.\n\nText:\n{text}";

/// N hypothetical questions per parent, tagged with 1-based `page_no`.
pub struct HypotheticalQueriesGuidance {
    model: Arc<dyn CompletionModel>,
    count: usize,
}

impl HypotheticalQueriesGuidance {
    pub fn new(model: Arc<dyn CompletionModel>, count: usize) -> Self {
        Self {
            model,
            count: count.max(1),
        }
    }
}

#[async_trait]
impl Guidance for HypotheticalQueriesGuidance {
    async fn derive(&self, parent: &Document) -> Result<Vec<Document>> {
        let prompt = QUERIES_PROMPT
            .replace("{count}", &self.count.to_string())
            .replace("{text}", &parent.text);
        let raw = self.model.complete(&prompt).await?;
        let questions = clean_lines(&raw);
        if questions.is_empty() {
            tracing::debug!(parent = %parent.id, "model returned no questions");
        }
        Ok(questions
            .into_iter()
            .enumerate()
            .map(|(i, question)| {
                let mut doc = Document::new(question);
                doc.set_metadata(PAGE_NO_KEY, FieldValue::Int32((i + 1) as i32));
                doc
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "hypothetical_queries"
    }
}

/// Retriever joining a parent document store with a derived-document vector
/// store.
pub struct MultiVectorRetriever {
    doc_store: Arc<dyn DocStore>,
    vector_store: Arc<dyn VectorStore>,
    guidance: Arc<dyn Guidance>,
    batch_size: usize,
}

impl MultiVectorRetriever {
    pub fn new(
        doc_store: Arc<dyn DocStore>,
        vector_store: Arc<dyn VectorStore>,
        guidance: Arc<dyn Guidance>,
    ) -> Self {
        Self {
            doc_store,
            vector_store,
            guidance,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Summary-per-parent setup.
    pub fn with_summaries(
        doc_store: Arc<dyn DocStore>,
        vector_store: Arc<dyn VectorStore>,
        model: Arc<dyn CompletionModel>,
    ) -> Self {
        Self::new(doc_store, vector_store, Arc::new(SummaryGuidance::new(model)))
    }

    /// Hypothetical-questions setup.
    pub fn with_hypothetical_queries(
        doc_store: Arc<dyn DocStore>,
        vector_store: Arc<dyn VectorStore>,
        model: Arc<dyn CompletionModel>,
        count: usize,
    ) -> Self {
        Self::new(
            doc_store,
            vector_store,
            Arc::new(HypotheticalQueriesGuidance::new(model, count)),
        )
    }

    async fn ingest_batch(&self, batch: &mut [Document], result: &mut UpdateResult) -> Result<()> {
        // ids must exist before guidance runs so children can point at them
        for doc in batch.iter_mut() {
            doc.ensure_id();
        }

        let mut guidance_tasks: JoinSet<(usize, Result<Vec<Document>>)> = JoinSet::new();
        for (idx, doc) in batch.iter().enumerate() {
            let guidance = self.guidance.clone();
            let parent = doc.clone();
            guidance_tasks.spawn(async move { (idx, guidance.derive(&parent).await) });
        }

        let batch_len = batch.len();
        let guidance_name = self.guidance.name();
        let gather = async move {
            let mut slots: Vec<Option<Vec<Document>>> = vec![None; batch_len];
            let mut fatal: Option<EngineError> = None;
            while let Some(joined) = guidance_tasks.join_next().await {
                match joined {
                    Ok((idx, Ok(derived))) => slots[idx] = Some(derived),
                    Ok((idx, Err(e))) => {
                        if matches!(e, EngineError::ContractViolation { .. }) {
                            fatal = Some(e);
                        } else {
                            // one bad parent must not sink the batch
                            tracing::warn!(
                                guidance = guidance_name,
                                slot = idx,
                                error = %e,
                                "guidance failed, skipping derived documents"
                            );
                        }
                    }
                    Err(join_err) => {
                        fatal = Some(EngineError::Internal {
                            message: format!("guidance task panicked: {join_err}"),
                        });
                    }
                }
            }
            (slots, fatal)
        };

        // parents are written while guidance is still running
        let (store_outcome, (slots, guidance_error)) =
            tokio::join!(self.doc_store.add_documents(batch), gather);
        let batch_result = store_outcome?;
        if let Some(e) = guidance_error {
            return Err(e);
        }

        let failed_ids: HashSet<&str> = batch_result
            .failed_documents
            .iter()
            .map(|d| d.id.as_str())
            .collect();

        let mut children: Vec<Document> = Vec::new();
        for (idx, slot) in slots.into_iter().enumerate() {
            let parent = &batch[idx];
            let Some(derived) = slot else { continue };
            if failed_ids.contains(parent.id.as_str()) {
                if !derived.is_empty() {
                    tracing::warn!(parent = %parent.id, "parent rejected, discarding derived documents");
                }
                continue;
            }
            for mut child in derived {
                child.set_metadata(PARENT_DOC_ID_KEY, FieldValue::String(parent.id.clone()));
                fill_preset_metadata(&mut child);
                children.push(child);
            }
        }

        if !children.is_empty() {
            let child_result = self.vector_store.add_documents(&mut children).await?;
            if !child_result.failed_documents.is_empty() {
                tracing::warn!(
                    failed = child_result.failed_documents.len(),
                    "derived documents failed to store"
                );
            }
        }

        result.merge(batch_result);
        Ok(())
    }
}

#[async_trait]
impl Retriever for MultiVectorRetriever {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        let start = Instant::now();
        let chunks = self.vector_store.search_documents(request).await?;

        // dedup keeps first-occurrence (highest score) order
        let mut parent_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for chunk in &chunks {
            match chunk.parent_doc_id() {
                Some(pid) if !pid.is_empty() => {
                    if seen.insert(pid.to_string()) {
                        parent_ids.push(pid.to_string());
                    }
                }
                _ => tracing::warn!(id = %chunk.id, "matched document has no parent id"),
            }
        }
        if parent_ids.is_empty() {
            tracing::debug!("no parent ids among matched documents");
            return Ok(Vec::new());
        }

        let fetched = self.doc_store.multi_get_documents(&parent_ids).await?;
        let mut by_id: HashMap<String, Document> =
            fetched.into_iter().map(|d| (d.id.clone(), d)).collect();
        let parents: Vec<Document> = parent_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        if parents.len() < parent_ids.len() {
            tracing::warn!(
                missing = parent_ids.len() - parents.len(),
                "some parents referenced by matches no longer exist"
            );
        }
        crate::metrics::record_search(
            start.elapsed().as_secs_f64(),
            self.mode().as_str(),
            parents.len(),
        );
        Ok(parents)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::MultiVector
    }
}

#[async_trait]
impl StatefulRetriever for MultiVectorRetriever {
    async fn ingest(&self, mut docs: Vec<Document>) -> Result<UpdateResult> {
        let mut result = UpdateResult::default();
        if docs.is_empty() {
            return Ok(result);
        }
        for batch in docs.chunks_mut(self.batch_size) {
            self.ingest_batch(batch, &mut result).await?;
        }
        tracing::info!(
            guidance = self.guidance.name(),
            stored = result.affected_rows,
            failed = result.failed_documents.len(),
            "multi-vector ingestion complete"
        );
        Ok(result)
    }
}
