//! Substring keyword search over the corpus snapshot.

use super::RetrievalTier;
use crate::corpus::ReviewCorpus;
use crate::error::ServiceError;
use crate::types::ReviewRecord;
use async_trait::async_trait;
use std::sync::Arc;

/// Reviews whose lower-cased searchable text contains any query token.
///
/// Tokens are the whitespace-separated words of the lower-cased query; an
/// empty query has no tokens and matches nothing. Corpus order is kept and
/// the result is cut to `limit`.
pub fn keyword_matches(query: &str, reviews: &[ReviewRecord], limit: usize) -> Vec<ReviewRecord> {
    let lowered = query.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }
    reviews
        .iter()
        .filter(|r| {
            let text = r.searchable_text().to_lowercase();
            tokens.iter().any(|t| text.contains(t))
        })
        .take(limit)
        .cloned()
        .collect()
}

#[derive(Clone)]
pub struct KeywordRetriever {
    corpus: Arc<dyn ReviewCorpus>,
}

impl KeywordRetriever {
    pub fn new(corpus: Arc<dyn ReviewCorpus>) -> Self {
        Self { corpus }
    }
}

#[async_trait]
impl RetrievalTier for KeywordRetriever {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ReviewRecord>, ServiceError> {
        let snapshot = self.corpus.snapshot();
        Ok(keyword_matches(query, &snapshot, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::InMemoryCorpus;

    fn corpus() -> Vec<ReviewRecord> {
        vec![
            ReviewRecord::new("A. Smith", "Algorithms", 5.0, "Great explanations"),
            ReviewRecord::new("B. Jones", "Biology", 3.0, "Lots of memorization"),
            ReviewRecord::new("C. Wu", "Calculus", 4.0, "Clear algorithms for integrals"),
        ]
    }

    #[test]
    fn test_matches_any_token_case_insensitive() {
        let hits = keyword_matches("Who teaches ALGORITHMS well?", &corpus(), 5);
        let names: Vec<&str> = hits.iter().map(|r| r.professor.as_str()).collect();
        assert_eq!(names, vec!["A. Smith", "C. Wu"]);
    }

    #[test]
    fn test_matches_professor_name() {
        let hits = keyword_matches("jones", &corpus(), 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].subject, "Biology");
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        assert!(keyword_matches("   ", &corpus(), 5).is_empty());
    }

    #[test]
    fn test_limit_applies_after_filter() {
        let hits = keyword_matches("a", &corpus(), 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].professor, "A. Smith");
    }

    #[tokio::test]
    async fn test_retriever_reads_current_snapshot() {
        let store = Arc::new(InMemoryCorpus::new(corpus()));
        let retriever = KeywordRetriever::new(store.clone());
        assert!(retriever.retrieve("physics", 5).await.unwrap().is_empty());
        store
            .append(vec![ReviewRecord::new("D. Park", "Physics", 4.0, "Good labs")])
            .await
            .unwrap();
        assert_eq!(retriever.retrieve("physics", 5).await.unwrap().len(), 1);
    }
}
