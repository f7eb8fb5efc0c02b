//! Keyword search over a document store.
//!
//! An FTS5 external-content table indexes the store's text column and ranks
//! matches with BM25. The index is built and dropped explicitly; writes to
//! the store never reindex on their own, callers decide when to pay that
//! cost via [`FullTextRetriever::build_index`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::document::{Document, SearchRequest};
use crate::errors::{EngineError, Result};
use crate::retrieval::{RetrievalMode, Retriever};
use crate::store::{DocStore, SqliteDocStore};

/// Matched ids are resolved back to documents in groups of this size.
const PAGE_SIZE: usize = 20;

/// Tokenization options for index build and query analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTextOptions {
    /// Stemmer applied by the index tokenizer: "porter" or "none"
    #[serde(default = "default_stemmer")]
    pub stemmer: String,

    /// Words dropped from queries before matching
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,

    /// Characters matching this pattern are treated as token separators in
    /// queries; None keeps whitespace splitting only
    #[serde(default = "default_ignore_pattern")]
    pub ignore_pattern: Option<String>,

    /// Fold diacritics so "café" and "cafe" match
    #[serde(default = "default_true")]
    pub strip_accents: bool,

    /// Lowercase queries before stopword comparison
    #[serde(default = "default_true")]
    pub lowercase: bool,
}

fn default_stemmer() -> String {
    "porter".to_string()
}

fn default_stopwords() -> Vec<String> {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is",
        "it", "of", "on", "or", "that", "the", "to", "was", "with",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

fn default_ignore_pattern() -> Option<String> {
    Some(r"(\.|[^a-z])+".to_string())
}

fn default_true() -> bool {
    true
}

impl Default for FullTextOptions {
    fn default() -> Self {
        Self {
            stemmer: default_stemmer(),
            stopwords: default_stopwords(),
            ignore_pattern: default_ignore_pattern(),
            strip_accents: default_true(),
            lowercase: default_true(),
        }
    }
}

/// BM25 keyword retriever over one [`SqliteDocStore`] table.
#[derive(Debug)]
pub struct FullTextRetriever {
    store: Arc<SqliteDocStore>,
    options: FullTextOptions,
    ignore_regex: Option<Regex>,
    stopword_set: HashSet<String>,
    fts_table: String,
    search_sql: String,
}

impl FullTextRetriever {
    pub fn new(store: Arc<SqliteDocStore>, options: FullTextOptions) -> Result<Self> {
        match options.stemmer.as_str() {
            "porter" | "none" => {}
            other => {
                return Err(EngineError::Configuration {
                    message: format!("unsupported stemmer: {other:?}"),
                })
            }
        }
        let ignore_regex = options
            .ignore_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| EngineError::Configuration {
                message: format!("invalid ignore pattern: {e}"),
            })?;
        let stopword_set = options.stopwords.iter().map(|w| w.to_lowercase()).collect();
        let fts_table = format!("{}_fts", store.table());
        let search_sql = format!(
            "SELECT t.id AS id, -bm25({fts}) AS score FROM {fts} \
             JOIN {table} t ON t.rowid = {fts}.rowid \
             WHERE {fts} MATCH ? ORDER BY score DESC, t.rowid ASC LIMIT ?",
            fts = fts_table,
            table = store.table(),
        );
        Ok(Self {
            store,
            options,
            ignore_regex,
            stopword_set,
            fts_table,
            search_sql,
        })
    }

    fn tokenizer_clause(&self) -> String {
        let mut parts = Vec::new();
        if self.options.stemmer == "porter" {
            parts.push("porter".to_string());
        }
        parts.push("unicode61".to_string());
        parts.push(format!(
            "remove_diacritics {}",
            if self.options.strip_accents { 2 } else { 0 }
        ));
        parts.join(" ")
    }

    /// Create or refresh the index. `overwrite` drops any existing index
    /// first, picking up tokenizer changes; otherwise an existing index is
    /// kept and re-synced with the content table.
    pub async fn build_index(&self, overwrite: bool) -> Result<()> {
        if overwrite {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.fts_table))
                .execute(self.store.pool())
                .await?;
        }
        let create = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(\
             text, content='{table}', content_rowid='rowid', tokenize='{tokenizer}')",
            fts = self.fts_table,
            table = self.store.table(),
            tokenizer = self.tokenizer_clause(),
        );
        sqlx::query(&create).execute(self.store.pool()).await?;
        // external-content tables only see rows present at rebuild time
        sqlx::query(&format!(
            "INSERT INTO {fts}({fts}) VALUES('rebuild')",
            fts = self.fts_table
        ))
        .execute(self.store.pool())
        .await?;
        crate::metrics::record_fulltext_build(self.store.table());
        tracing::info!(table = %self.store.table(), "full-text index built");
        Ok(())
    }

    pub async fn drop_index(&self) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.fts_table))
            .execute(self.store.pool())
            .await?;
        tracing::info!(table = %self.store.table(), "full-text index dropped");
        Ok(())
    }

    fn query_tokens(&self, raw: &str) -> Vec<String> {
        let text = if self.options.lowercase {
            raw.to_lowercase()
        } else {
            raw.to_string()
        };
        let cleaned = match &self.ignore_regex {
            Some(re) => re.replace_all(&text, " ").into_owned(),
            None => text,
        };
        cleaned
            .split_whitespace()
            .filter(|t| !self.stopword_set.contains(*t))
            .map(|t| t.to_string())
            .collect()
    }
}

#[async_trait]
impl Retriever for FullTextRetriever {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        if request.top_k == 0 {
            return Err(EngineError::Validation {
                message: "top_k must be positive".into(),
                field: Some("top_k".into()),
            });
        }
        if request.filter.is_some() {
            return Err(EngineError::Validation {
                message: "metadata filters are not supported by keyword search".into(),
                field: Some("filter".into()),
            });
        }
        let start = Instant::now();
        let tokens = self.query_tokens(&request.query);
        // a query of stopwords and separators never reaches the backend
        if tokens.is_empty() {
            tracing::debug!(query = %request.query, "query reduced to no tokens");
            return Ok(Vec::new());
        }
        let match_expr = tokens
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");

        let rows = sqlx::query(&self.search_sql)
            .bind(&match_expr)
            .bind(request.top_k as i64)
            .fetch_all(self.store.pool())
            .await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<std::result::Result<Vec<String>, sqlx::Error>>()?;

        // resolve ranked ids in fixed-size pages, restoring rank order per page
        let pages = futures::future::try_join_all(
            ids.chunks(PAGE_SIZE)
                .map(|page| self.store.multi_get_documents(page)),
        )
        .await?;
        let mut docs = Vec::with_capacity(ids.len());
        for (page, fetched) in ids.chunks(PAGE_SIZE).zip(pages) {
            let mut by_id: HashMap<String, Document> =
                fetched.into_iter().map(|d| (d.id.clone(), d)).collect();
            for id in page {
                if let Some(doc) = by_id.remove(id) {
                    docs.push(doc);
                }
            }
        }
        crate::metrics::record_search(start.elapsed().as_secs_f64(), self.mode().as_str(), docs.len());
        tracing::debug!(hits = docs.len(), "keyword search complete");
        Ok(docs)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::FullText
    }
}
