//! Text splitting for chunked ingestion.
//!
//! Parent documents are split into retrieval-sized chunks before embedding;
//! the same trait also backs child-chunk derivation during ingestion.

use text_splitter::{Characters, ChunkConfig};

use crate::errors::{EngineError, Result};

/// Splits text into chunks. Implementations must be cheap to call repeatedly;
/// ingestion invokes them once per document.
pub trait TextSplitter: Send + Sync {
    fn split_text(&self, text: &str) -> Vec<String>;
}

/// Character-count splitter that prefers semantic boundaries (paragraphs,
/// then sentences, then words) within the size limit.
#[derive(Debug)]
pub struct CharacterTextSplitter {
    inner: text_splitter::TextSplitter<Characters>,
    chunk_size: usize,
}

impl CharacterTextSplitter {
    pub fn new(chunk_size: usize) -> Result<Self> {
        Self::with_overlap(chunk_size, 0)
    }

    /// `chunk_overlap` characters of each chunk are repeated at the start of
    /// the next one; it must be smaller than `chunk_size`.
    pub fn with_overlap(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(EngineError::Configuration {
                message: "chunk size must be positive".into(),
            });
        }
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| EngineError::Configuration {
                message: format!("invalid chunk overlap: {e}"),
            })?;
        Ok(Self {
            inner: text_splitter::TextSplitter::new(config),
            chunk_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl TextSplitter for CharacterTextSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        let chunks: Vec<String> = self.inner.chunks(text).map(str::to_string).collect();
        tracing::debug!(
            input_len = text.len(),
            chunk_count = chunks.len(),
            chunk_size = self.chunk_size,
            "text split"
        );
        chunks
    }
}
