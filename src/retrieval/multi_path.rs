//! Multi-path retrieval.
//!
//! Fans one query out to several child retrievers, pools their results, and
//! reranks the union with a scoring model. Candidate collection is bounded by
//! a deadline; scoring is not, the ranking client carries its own timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::document::{Document, SearchRequest};
use crate::errors::{EngineError, Result};
use crate::models::RankingModel;
use crate::retrieval::{RetrievalMode, Retriever};

pub const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct MultiPathRetriever {
    children: Vec<Arc<dyn Retriever>>,
    ranker: Arc<dyn RankingModel>,
    timeout: Duration,
}

impl std::fmt::Debug for MultiPathRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiPathRetriever")
            .field("children", &self.children.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MultiPathRetriever {
    pub fn new(children: Vec<Arc<dyn Retriever>>, ranker: Arc<dyn RankingModel>) -> Result<Self> {
        if children.is_empty() {
            return Err(EngineError::Configuration {
                message: "multi-path retrieval needs at least one child retriever".into(),
            });
        }
        Ok(Self {
            children,
            ranker,
            timeout: DEFAULT_FANOUT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fan_out(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        let mut tasks: JoinSet<(usize, Result<Vec<Document>>)> = JoinSet::new();
        for (idx, child) in self.children.iter().enumerate() {
            let child = child.clone();
            let req = request.clone();
            tasks.spawn(async move { (idx, child.retrieve(&req).await) });
        }

        let child_count = self.children.len();
        let gather = async move {
            // slots keep candidate groups in child order however tasks finish
            let mut slots: Vec<Option<Vec<Document>>> = vec![None; child_count];
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((idx, Ok(docs))) => slots[idx] = Some(docs),
                    Ok((_, Err(e))) => return Err(e),
                    Err(join_err) => {
                        return Err(EngineError::Internal {
                            message: format!("retrieval task panicked: {join_err}"),
                        })
                    }
                }
            }
            Ok(slots)
        };

        let slots = tokio::time::timeout(self.timeout, gather)
            .await
            .map_err(|_| {
                crate::metrics::record_fanout_timeout();
                EngineError::FanoutTimeout {
                    seconds: self.timeout.as_secs(),
                }
            })??;

        let mut candidates: Vec<Document> = Vec::new();
        for doc in slots.into_iter().flatten().flatten() {
            if !candidates.contains(&doc) {
                candidates.push(doc);
            }
        }
        Ok(candidates)
    }

    async fn rerank(&self, query: &str, candidates: Vec<Document>) -> Result<Vec<Document>> {
        let mut score_tasks: JoinSet<(usize, Result<f32>)> = JoinSet::new();
        for (idx, doc) in candidates.iter().enumerate() {
            let ranker = self.ranker.clone();
            let query = query.to_string();
            let text = doc.text.clone();
            score_tasks.spawn(async move { (idx, ranker.score(&query, &text).await) });
        }

        let mut scores = vec![0.0f32; candidates.len()];
        while let Some(joined) = score_tasks.join_next().await {
            match joined {
                Ok((idx, Ok(score))) => scores[idx] = score,
                Ok((_, Err(e))) => return Err(e),
                Err(join_err) => {
                    return Err(EngineError::Internal {
                        message: format!("scoring task panicked: {join_err}"),
                    })
                }
            }
        }

        let mut scored: Vec<(f32, Document)> = scores.into_iter().zip(candidates).collect();
        // stable sort: equal scores keep their child-order position
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().map(|(_, doc)| doc).collect())
    }
}

#[async_trait]
impl Retriever for MultiPathRetriever {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        if self.children.len() == 1 {
            return self.children[0].retrieve(request).await;
        }

        let start = Instant::now();
        let candidates = self.fan_out(request).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut fused = self.rerank(&request.query, candidates).await?;
        fused.truncate(request.top_k);
        crate::metrics::record_search(
            start.elapsed().as_secs_f64(),
            self.mode().as_str(),
            fused.len(),
        );
        Ok(fused)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::MultiPath
    }
}
