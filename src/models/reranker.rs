//! HTTP reranker client.
//!
//! Speaks the rerank wire shape used by Jina and Cohere style endpoints:
//! one request carrying the query and all candidate documents, a response
//! listing (index, relevance_score) pairs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RankingConfig;
use crate::errors::{EngineError, Result};
use crate::models::RankingModel;

pub struct HttpRanker {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Serialize)]
struct RankRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    query: String,
    documents: Vec<String>,
}

#[derive(Deserialize)]
struct RankResponse {
    results: Vec<RankResult>,
}

#[derive(Deserialize)]
struct RankResult {
    index: usize,
    relevance_score: f32,
}

/// Responses often arrive sorted by score; put them back in document order.
/// Documents the endpoint omitted keep a zero score.
fn scores_in_document_order(results: Vec<RankResult>, len: usize) -> Result<Vec<f32>> {
    let mut scores = vec![0.0f32; len];
    for item in results {
        if item.index >= len {
            return Err(EngineError::RankingError {
                message: format!("result index {} out of range for {len} documents", item.index),
            });
        }
        scores[item.index] = item.relevance_score;
    }
    Ok(scores)
}

impl HttpRanker {
    pub fn new(config: &RankingConfig) -> Result<Self> {
        if config.api_url.is_empty() {
            return Err(EngineError::Configuration {
                message: "ranking api url required".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Score all documents against the query in one round trip.
    pub async fn rank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let request = RankRequest {
            model: self.model.clone(),
            query: query.to_string(),
            documents: documents.to_vec(),
        };

        let mut builder = self.client.post(&self.api_url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder.send().await.map_err(|e| EngineError::RankingError {
            message: format!("request failed: {e}"),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::RankingError {
                message: format!("api error {status}: {body}"),
            });
        }

        let result: RankResponse = response.json().await.map_err(|e| EngineError::RankingError {
            message: format!("failed to parse response: {e}"),
        })?;
        scores_in_document_order(result.results, documents.len())
    }
}

#[async_trait]
impl RankingModel for HttpRanker {
    async fn score(&self, query: &str, document: &str) -> Result<f32> {
        let scores = self.rank(query, &[document.to_string()]).await?;
        scores.into_iter().next().ok_or_else(|| EngineError::RankingError {
            message: "empty ranking response".into(),
        })
    }
}
