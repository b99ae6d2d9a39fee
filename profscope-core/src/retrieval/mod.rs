//! Tiered review retrieval.
//!
//! A [`RetrievalCoordinator`] holds an ordered list of tiers and returns the
//! result of the first tier that succeeds. A tier that errors is logged and
//! skipped; a tier that succeeds with no matches is still final.

pub mod keyword;
pub mod vector;

pub use keyword::{KeywordRetriever, keyword_matches};
pub use vector::VectorRetriever;

use crate::config::Features;
use crate::error::ServiceError;
use crate::types::{RetrievedReview, ReviewRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One strategy for finding reviews relevant to a query.
#[async_trait]
pub trait RetrievalTier: Send + Sync {
    fn name(&self) -> &'static str;

    /// At most `top_k` records, in the tier's own ranking.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ReviewRecord>, ServiceError>;
}

/// Tries each tier in order until one succeeds.
#[derive(Clone)]
pub struct RetrievalCoordinator {
    tiers: Vec<Arc<dyn RetrievalTier>>,
    top_k: usize,
}

impl RetrievalCoordinator {
    pub fn new(tiers: Vec<Arc<dyn RetrievalTier>>, top_k: usize) -> Self {
        Self { tiers, top_k }
    }

    /// Vector search first when the features allow it, then keyword search.
    pub fn with_features(
        features: Features,
        keyword: KeywordRetriever,
        vector: Option<VectorRetriever>,
        top_k: usize,
    ) -> Self {
        let mut tiers: Vec<Arc<dyn RetrievalTier>> = Vec::with_capacity(2);
        if features.vector_search
            && let Some(vector) = vector
        {
            tiers.push(Arc::new(vector));
        }
        tiers.push(Arc::new(keyword));
        Self::new(tiers, top_k)
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub async fn retrieve(&self, query: &str) -> Vec<RetrievedReview> {
        for tier in &self.tiers {
            match tier.retrieve(query, self.top_k).await {
                Ok(mut records) => {
                    records.truncate(self.top_k);
                    info!(tier = tier.name(), results = records.len(), "Retrieval complete");
                    return RetrievedReview::ranked(records);
                }
                Err(e) => {
                    warn!(
                        tier = tier.name(),
                        service = e.service(),
                        error = %e,
                        "Retrieval tier failed, falling back"
                    );
                }
            }
        }
        debug!("No retrieval tier succeeded");
        Vec::new()
    }
}
