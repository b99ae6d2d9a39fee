//! Semantic search: embed the query, then ask the vector index.

use super::RetrievalTier;
use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::types::ReviewRecord;
use crate::vector_index::VectorIndex;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl RetrievalTier for VectorRetriever {
    fn name(&self) -> &'static str {
        "vector"
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ReviewRecord>, ServiceError> {
        let embedding = self.embedder.embed(query).await?;
        debug!(model = self.embedder.model_name(), dims = embedding.len(), "Query embedded");
        let matches = self.index.query(&embedding, top_k).await?;
        Ok(matches.into_iter().map(|m| m.review).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::{IndexedVector, VectorMatch};
    use std::sync::Mutex;

    struct StaticEmbedder;

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
            Ok(vec![0.1, 0.2, 0.3])
        }

        fn model_name(&self) -> &str {
            "static"
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
            Err(ServiceError::permanent("embedding", "HTTP 401 Unauthorized"))
        }

        fn model_name(&self) -> &str {
            "broken"
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        queries: Mutex<Vec<(Vec<f32>, usize)>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn query(
            &self,
            vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<VectorMatch>, ServiceError> {
            self.queries.lock().unwrap().push((vector.to_vec(), top_k));
            Ok(vec![VectorMatch {
                id: "seed_0".into(),
                score: 0.9,
                review: ReviewRecord::new("A. Smith", "Algorithms", 5.0, "Great explanations"),
            }])
        }

        async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<usize, ServiceError> {
            Ok(vectors.len())
        }
    }

    #[tokio::test]
    async fn test_embeds_then_queries() {
        let index = Arc::new(RecordingIndex::default());
        let retriever = VectorRetriever::new(Arc::new(StaticEmbedder), index.clone());
        let records = retriever.retrieve("algorithms", 5).await.unwrap();
        assert_eq!(records[0].professor, "A. Smith");
        let queries = index.queries.lock().unwrap();
        assert_eq!(queries[0], (vec![0.1, 0.2, 0.3], 5));
    }

    #[tokio::test]
    async fn test_embedding_error_propagates() {
        let index = Arc::new(RecordingIndex::default());
        let retriever = VectorRetriever::new(Arc::new(BrokenEmbedder), index.clone());
        assert!(retriever.retrieve("q", 5).await.is_err());
        assert!(index.queries.lock().unwrap().is_empty());
    }
}
