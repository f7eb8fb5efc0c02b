//! Mock embedder for testing

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::Result;
use crate::models::Embedder;

/// Embedder producing pseudo-random vectors seeded by the input text.
///
/// The same text always maps to the same vector, so equality queries score
/// 1.0 while unrelated texts land near-orthogonal at realistic dimensions.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(64);
        let a = block_on(embedder.embed("same text")).unwrap();
        let b = block_on(embedder.embed("same text")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let c = block_on(embedder.embed("different text")).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_mock_batch_matches_single() {
        let embedder = MockEmbedder::new(16);
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = block_on(embedder.embed_batch(&texts)).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], block_on(embedder.embed("one")).unwrap());
        assert_eq!(batch[1], block_on(embedder.embed("two")).unwrap());
    }
}
