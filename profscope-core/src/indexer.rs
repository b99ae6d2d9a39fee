//! Keeps the vector index in step with the review corpus.

use crate::embeddings::Embedder;
use crate::error::ServiceError;
use crate::types::ReviewRecord;
use crate::vector_index::{IndexedVector, VectorIndex};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ReviewIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl ReviewIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Re-embed the whole corpus under `seed_<i>` ids. Returns the upserted count.
    pub async fn reindex(&self, reviews: &[ReviewRecord]) -> Result<usize, ServiceError> {
        let upserted = self.embed_and_upsert(reviews, |i| format!("seed_{i}")).await?;
        info!(total = reviews.len(), upserted, "Reindex complete");
        Ok(upserted)
    }

    /// Index freshly uploaded reviews under `rev_<unix_millis>_<i>` ids.
    pub async fn index_new(&self, reviews: &[ReviewRecord]) -> Result<usize, ServiceError> {
        let stamp = chrono::Utc::now().timestamp_millis();
        self.embed_and_upsert(reviews, |i| format!("rev_{stamp}_{i}"))
            .await
    }

    async fn embed_and_upsert(
        &self,
        reviews: &[ReviewRecord],
        id_for: impl Fn(usize) -> String,
    ) -> Result<usize, ServiceError> {
        if let Err(e) = self.index.ensure_index().await {
            warn!(error = %e, "Could not verify vector index, continuing");
        }
        let mut vectors = Vec::with_capacity(reviews.len());
        for (i, review) in reviews.iter().enumerate() {
            match self.embedder.embed(&review.searchable_text()).await {
                Ok(values) => vectors.push(IndexedVector {
                    id: id_for(i),
                    values,
                    metadata: review.clone(),
                }),
                Err(e) => {
                    warn!(
                        index = i,
                        professor = %review.professor,
                        error = %e,
                        "Skipping review, embedding failed"
                    );
                }
            }
        }
        if vectors.is_empty() {
            return Ok(0);
        }
        self.index.upsert(vectors).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::VectorMatch;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Fails for any text mentioning "broken".
    struct PickyEmbedder;

    #[async_trait]
    impl Embedder for PickyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
            if text.contains("broken") {
                Err(ServiceError::permanent("embedding", "HTTP 400"))
            } else {
                Ok(vec![text.len() as f32])
            }
        }

        fn model_name(&self) -> &str {
            "picky"
        }
    }

    #[derive(Default)]
    struct MemoryIndex {
        stored: Mutex<Vec<IndexedVector>>,
        ensured: AtomicBool,
    }

    #[async_trait]
    impl VectorIndex for MemoryIndex {
        async fn query(
            &self,
            _vector: &[f32],
            _top_k: usize,
        ) -> Result<Vec<VectorMatch>, ServiceError> {
            Ok(Vec::new())
        }

        async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<usize, ServiceError> {
            let n = vectors.len();
            self.stored.lock().unwrap().extend(vectors);
            Ok(n)
        }

        async fn ensure_index(&self) -> Result<(), ServiceError> {
            self.ensured.store(true, Ordering::SeqCst);
            Err(ServiceError::transient("vector-index", "control plane down"))
        }
    }

    #[tokio::test]
    async fn test_reindex_uses_seed_ids_and_skips_failures() {
        let index = Arc::new(MemoryIndex::default());
        let indexer = ReviewIndexer::new(Arc::new(PickyEmbedder), index.clone());
        let reviews = vec![
            ReviewRecord::new("A", "Math", 4.0, "good"),
            ReviewRecord::new("B", "Art", 2.0, "broken projector"),
            ReviewRecord::new("C", "Law", 5.0, "great"),
        ];
        let upserted = indexer.reindex(&reviews).await.unwrap();
        assert_eq!(upserted, 2);
        assert!(index.ensured.load(Ordering::SeqCst));
        let ids: Vec<String> = index.stored.lock().unwrap().iter().map(|v| v.id.clone()).collect();
        assert_eq!(ids, vec!["seed_0", "seed_2"]);
    }

    #[tokio::test]
    async fn test_index_new_uses_upload_ids() {
        let index = Arc::new(MemoryIndex::default());
        let indexer = ReviewIndexer::new(Arc::new(PickyEmbedder), index.clone());
        let n = indexer
            .index_new(&[ReviewRecord::new("D", "Bio", 3.0, "fine")])
            .await
            .unwrap();
        assert_eq!(n, 1);
        let stored = index.stored.lock().unwrap();
        assert!(stored[0].id.starts_with("rev_"));
        assert!(stored[0].id.ends_with("_0"));
        assert_eq!(stored[0].metadata.professor, "D");
    }

    #[tokio::test]
    async fn test_nothing_embedded_skips_upsert() {
        let index = Arc::new(MemoryIndex::default());
        let indexer = ReviewIndexer::new(Arc::new(PickyEmbedder), index.clone());
        let n = indexer
            .index_new(&[ReviewRecord::new("E", "X", 1.0, "broken")])
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(index.stored.lock().unwrap().is_empty());
    }
}
