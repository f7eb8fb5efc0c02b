//! Query-expansion retrieval.
//!
//! One question becomes several phrasings; each phrasing runs against the
//! base retriever and the flattened results are deduplicated structurally.
//! Expansion must yield at least two phrasings. Fewer means the expander is
//! broken, and that surfaces as an error instead of quietly degrading into
//! single-query retrieval.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::document::{Document, SearchRequest};
use crate::errors::{EngineError, Result};
use crate::models::{clean_lines, CompletionModel};
use crate::retrieval::{RetrievalMode, Retriever};

/// Turns one query into alternative phrasings.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    async fn expand(&self, query: &str) -> Result<Vec<String>>;
}

const EXPAND_PROMPT: &str = "Rewrite the following question {count} different ways to \
improve document retrieval. Reply with one rewrite per line, nothing else.\n\n\
Question: {question}";

/// Completion-model-backed expander.
pub struct ModelQueryExpander {
    model: Arc<dyn CompletionModel>,
    count: usize,
}

impl ModelQueryExpander {
    pub fn new(model: Arc<dyn CompletionModel>, count: usize) -> Self {
        // fewer than two phrasings can never satisfy the expansion contract
        Self {
            model,
            count: count.max(2),
        }
    }
}

#[async_trait]
impl QueryExpander for ModelQueryExpander {
    async fn expand(&self, query: &str) -> Result<Vec<String>> {
        let prompt = EXPAND_PROMPT
            .replace("{count}", &self.count.to_string())
            .replace("{question}", query);
        let raw = self.model.complete(&prompt).await?;
        Ok(clean_lines(&raw))
    }
}

pub struct MultiQueryRetriever {
    base: Arc<dyn Retriever>,
    expander: Arc<dyn QueryExpander>,
}

impl MultiQueryRetriever {
    pub fn new(base: Arc<dyn Retriever>, expander: Arc<dyn QueryExpander>) -> Self {
        Self { base, expander }
    }

    /// Expansion via a completion model asking for `count` rewrites.
    pub fn with_model(
        base: Arc<dyn Retriever>,
        model: Arc<dyn CompletionModel>,
        count: usize,
    ) -> Self {
        Self::new(base, Arc::new(ModelQueryExpander::new(model, count)))
    }
}

#[async_trait]
impl Retriever for MultiQueryRetriever {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        let start = Instant::now();
        let expansions = self.expander.expand(&request.query).await?;
        if expansions.len() < 2 {
            return Err(EngineError::ContractViolation {
                message: format!(
                    "query expansion produced {} phrasings, need at least 2",
                    expansions.len()
                ),
            });
        }
        tracing::debug!(count = expansions.len(), "expanded query");

        let mut results: Vec<Document> = Vec::new();
        for expansion in &expansions {
            let sub = SearchRequest {
                query: expansion.clone(),
                top_k: request.top_k,
                filter: request.filter.clone(),
            };
            let docs = self.base.retrieve(&sub).await?;
            for doc in docs {
                if !results.contains(&doc) {
                    results.push(doc);
                }
            }
        }
        crate::metrics::record_search(
            start.elapsed().as_secs_f64(),
            self.mode().as_str(),
            results.len(),
        );
        Ok(results)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::MultiQuery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct ScriptedExpander {
        expansions: Vec<String>,
    }

    impl ScriptedExpander {
        fn new(expansions: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                expansions: expansions.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl QueryExpander for ScriptedExpander {
        async fn expand(&self, _query: &str) -> Result<Vec<String>> {
            Ok(self.expansions.clone())
        }
    }

    /// Base retriever answering from a fixed query-to-documents table.
    struct MapRetriever {
        by_query: HashMap<String, Vec<Document>>,
    }

    impl MapRetriever {
        fn new(entries: &[(&str, &[&str])]) -> Arc<Self> {
            Arc::new(Self {
                by_query: entries
                    .iter()
                    .map(|(q, texts)| {
                        let docs = texts
                            .iter()
                            .map(|t| Document::with_id(format!("id-{t}"), *t))
                            .collect();
                        (q.to_string(), docs)
                    })
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl Retriever for MapRetriever {
        async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>> {
            Ok(self.by_query.get(&request.query).cloned().unwrap_or_default())
        }

        fn mode(&self) -> RetrievalMode {
            RetrievalMode::Vector
        }
    }

    struct ScriptedModel {
        reply: String,
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_overlapping_results_deduplicate() {
        let base = MapRetriever::new(&[
            ("q1", &["alpha", "beta"][..]),
            ("q2", &["beta", "gamma"][..]),
        ]);
        let retriever = MultiQueryRetriever::new(base, ScriptedExpander::new(&["q1", "q2"]));

        let hits = retriever
            .retrieve(&SearchRequest::new("original", 10))
            .await
            .unwrap();
        let texts: Vec<&str> = hits.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_single_expansion_fails_loudly() {
        let base = MapRetriever::new(&[("original", &["never returned"][..])]);
        let retriever = MultiQueryRetriever::new(base, ScriptedExpander::new(&["just one"]));

        let err = retriever
            .retrieve(&SearchRequest::new("original", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[tokio::test]
    async fn test_zero_expansions_fail_loudly() {
        let base = MapRetriever::new(&[]);
        let retriever = MultiQueryRetriever::new(base, ScriptedExpander::new(&[]));
        let err = retriever
            .retrieve(&SearchRequest::new("original", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[tokio::test]
    async fn test_original_query_is_not_retrieved() {
        // only the expansions reach the base retriever
        let base = MapRetriever::new(&[
            ("original", &["from-original"][..]),
            ("r1", &["from-r1"][..]),
            ("r2", &["from-r2"][..]),
        ]);
        let retriever = MultiQueryRetriever::new(base, ScriptedExpander::new(&["r1", "r2"]));

        let hits = retriever
            .retrieve(&SearchRequest::new("original", 10))
            .await
            .unwrap();
        let texts: Vec<&str> = hits.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["from-r1", "from-r2"]);
    }

    #[tokio::test]
    async fn test_expander_error_propagates() {
        struct BrokenExpander;

        #[async_trait]
        impl QueryExpander for BrokenExpander {
            async fn expand(&self, _query: &str) -> Result<Vec<String>> {
                Err(EngineError::CompletionError {
                    message: "model offline".into(),
                })
            }
        }

        let base = MapRetriever::new(&[]);
        let retriever = MultiQueryRetriever::new(base, Arc::new(BrokenExpander));
        let err = retriever
            .retrieve(&SearchRequest::new("original", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CompletionError { .. }));
    }

    #[tokio::test]
    async fn test_model_expander_cleans_numbered_output() {
        let model = Arc::new(ScriptedModel {
            reply: "1. where do cats sleep\n2. cat sleeping locations".into(),
        });
        let expander = ModelQueryExpander::new(model, 2);
        let expansions = expander.expand("where do cats nap?").await.unwrap();
        assert_eq!(expansions, vec!["where do cats sleep", "cat sleeping locations"]);
    }
}
