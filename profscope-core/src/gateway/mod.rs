//! # HTTP Gateway
//!
//! JSON API in front of the chat pipeline, plus the maintenance endpoints for
//! review upload, vector reindexing, standalone prediction and model training.

mod routes;
mod server;

pub use server::{router, run};

use crate::config::{AppConfig, Features};
use crate::corpus::ReviewCorpus;
use crate::indexer::ReviewIndexer;
use crate::pipeline::{ChatPipeline, ServiceClients};
use crate::prediction::{ModelTrainer, Predictor};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared state handed to every handler.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pipeline: ChatPipeline,
    pub corpus: Arc<dyn ReviewCorpus>,
    pub predictor: Arc<dyn Predictor>,
    pub predict_timeout: Duration,
    pub trainer: ModelTrainer,
    pub indexer: Option<ReviewIndexer>,
    pub features: Features,
    /// Returned by `/api/reindex` when vector search is not configured.
    pub reindex_requirement: String,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        corpus: Arc<dyn ReviewCorpus>,
        clients: &ServiceClients,
    ) -> Self {
        Self {
            pipeline: ChatPipeline::from_clients(config, Arc::clone(&corpus), clients),
            corpus,
            predictor: Arc::clone(&clients.predictor),
            predict_timeout: config.prediction.endpoint_timeout(),
            trainer: clients.trainer.clone(),
            indexer: clients.indexer(),
            features: clients.features(),
            reindex_requirement: format!(
                "{} and {} required",
                config.vector_index.api_key_env, config.embedding.api_key_env
            ),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
