//! Plain similarity-search retriever over one vector store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::document::{Document, SearchRequest, UpdateResult};
use crate::errors::Result;
use crate::retrieval::{RetrievalMode, Retriever, StatefulRetriever};
use crate::store::VectorStore;

pub struct VectorRetriever {
    store: Arc<dyn VectorStore>,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        self.store.search_documents(request).await
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Vector
    }
}

#[async_trait]
impl StatefulRetriever for VectorRetriever {
    async fn ingest(&self, mut docs: Vec<Document>) -> Result<UpdateResult> {
        self.store.add_documents(&mut docs).await
    }
}
