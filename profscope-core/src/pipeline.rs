//! The retrieval-and-synthesis pipeline behind a chat request.
//!
//! retrieve -> extract mentioned professors -> enrich with predictions ->
//! assemble evidence -> generate. Only retrieval can end a request early,
//! with [`NO_RESULTS_REPLY`] when no tier found anything.

use crate::config::{AppConfig, Features, ServiceKeys};
use crate::context::{self, NO_RESULTS_REPLY};
use crate::corpus::ReviewCorpus;
use crate::embeddings::{Embedder, HuggingFaceEmbedder};
use crate::entities;
use crate::error::{ProfscopeError, Result, ServiceError};
use crate::generation::{AnswerGenerator, AnswerSource, GeminiGenerator, Generator, RetryPolicy};
use crate::indexer::ReviewIndexer;
use crate::prediction::{ModelTrainer, PredictionEnricher, Predictor, SubprocessPredictor};
use crate::retrieval::{KeywordRetriever, RetrievalCoordinator, VectorRetriever};
use crate::runtime::ScriptRunner;
use crate::types::{ChatTurn, PredictionSet, QueryContext, last_user_query};
use crate::vector_index::{PineconeIndex, VectorIndex};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// External collaborators, built once at start-up from config and credentials.
#[derive(Clone)]
pub struct ServiceClients {
    pub embedder: Option<Arc<dyn Embedder>>,
    pub index: Option<Arc<dyn VectorIndex>>,
    pub generator: Option<Arc<dyn Generator>>,
    pub predictor: Arc<dyn Predictor>,
    pub trainer: ModelTrainer,
}

impl ServiceClients {
    pub fn from_config(
        config: &AppConfig,
        keys: &ServiceKeys,
        workspace: &Path,
    ) -> std::result::Result<Self, ServiceError> {
        let mut embedder: Option<Arc<dyn Embedder>> = None;
        let mut index: Option<Arc<dyn VectorIndex>> = None;
        if let (Some(embedding_key), Some(index_key)) = (&keys.embedding, &keys.vector_index) {
            embedder = Some(Arc::new(HuggingFaceEmbedder::new(
                &config.embedding,
                embedding_key.clone(),
            )?));
            index = Some(Arc::new(PineconeIndex::new(
                &config.vector_index,
                index_key.clone(),
            )?));
        }

        let mut generator: Option<Arc<dyn Generator>> = None;
        if let Some(key) = &keys.generation {
            generator = Some(Arc::new(GeminiGenerator::new(&config.generation, key.clone())?));
        }

        let working_dir = config
            .prediction
            .working_dir
            .as_deref()
            .map(|dir| AppConfig::resolve_path(workspace, dir))
            .unwrap_or_else(|| workspace.to_path_buf());
        let runner_for = |script: &Path| {
            ScriptRunner::new(
                config.prediction.program.clone(),
                AppConfig::resolve_path(workspace, script),
                working_dir.clone(),
            )
        };

        Ok(Self {
            embedder,
            index,
            generator,
            predictor: Arc::new(SubprocessPredictor::new(runner_for(&config.prediction.script))),
            trainer: ModelTrainer::new(
                runner_for(&config.training.script),
                std::time::Duration::from_secs(config.training.timeout_secs),
            ),
        })
    }

    pub fn features(&self) -> Features {
        Features {
            vector_search: self.embedder.is_some() && self.index.is_some(),
            generation: self.generator.is_some(),
        }
    }

    /// Index maintenance, available only when vector search is configured.
    pub fn indexer(&self) -> Option<ReviewIndexer> {
        match (&self.embedder, &self.index) {
            (Some(embedder), Some(index)) => {
                Some(ReviewIndexer::new(Arc::clone(embedder), Arc::clone(index)))
            }
            _ => None,
        }
    }
}

/// Everything produced while answering one query.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub content: String,
    pub context: QueryContext,
    pub predictions: PredictionSet,
    /// `None` when retrieval found nothing and generation never ran.
    pub source: Option<AnswerSource>,
}

#[derive(Clone)]
pub struct ChatPipeline {
    retrieval: RetrievalCoordinator,
    enricher: PredictionEnricher,
    answerer: AnswerGenerator,
}

impl ChatPipeline {
    pub fn new(
        retrieval: RetrievalCoordinator,
        enricher: PredictionEnricher,
        answerer: AnswerGenerator,
    ) -> Self {
        Self {
            retrieval,
            enricher,
            answerer,
        }
    }

    /// Wire the pipeline from configuration and pre-built clients.
    pub fn from_clients(
        config: &AppConfig,
        corpus: Arc<dyn ReviewCorpus>,
        clients: &ServiceClients,
    ) -> Self {
        let features = clients.features();
        let vector = match (&clients.embedder, &clients.index) {
            (Some(embedder), Some(index)) => {
                Some(VectorRetriever::new(Arc::clone(embedder), Arc::clone(index)))
            }
            _ => None,
        };
        let retrieval = RetrievalCoordinator::with_features(
            features,
            KeywordRetriever::new(corpus),
            vector,
            config.retrieval.top_k,
        );
        let enricher = PredictionEnricher::new(
            Arc::clone(&clients.predictor),
            config.prediction.chat_timeout(),
        );
        let answerer = AnswerGenerator::new(
            clients.generator.clone(),
            RetryPolicy::from_config(&config.generation),
            config.generation.api_key_env.clone(),
        );
        info!(
            tiers = ?retrieval.tier_names(),
            generation = features.generation,
            "Chat pipeline ready"
        );
        Self::new(retrieval, enricher, answerer)
    }

    pub async fn answer(&self, query: &str) -> PipelineOutcome {
        let started = Instant::now();
        let retrieved = self.retrieval.retrieve(query).await;
        if retrieved.is_empty() {
            info!("No relevant reviews found");
            return PipelineOutcome {
                content: NO_RESULTS_REPLY.to_string(),
                context: QueryContext {
                    raw_query: query.to_string(),
                    ..QueryContext::default()
                },
                predictions: PredictionSet::new(),
                source: None,
            };
        }

        let mentioned = entities::extract(query, &retrieved);
        let predictions = self.enricher.enrich_all(&mentioned, &retrieved).await;
        let evidence = context::assemble(&retrieved, &predictions);
        let outcome = self.answerer.answer(query, &evidence).await;
        let context = QueryContext {
            raw_query: query.to_string(),
            retrieved_reviews: retrieved,
            mentioned_professors: mentioned,
        };

        info!(
            reviews = context.retrieved_reviews.len(),
            professors = context.retrieved_professors().len(),
            mentioned = context.mentioned_professors.len(),
            predictions = predictions.len(),
            source = ?outcome.source,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query answered"
        );
        PipelineOutcome {
            content: outcome.answer,
            context,
            predictions,
            source: Some(outcome.source),
        }
    }

    /// Answer the last user turn of a conversation.
    pub async fn answer_conversation(&self, turns: &[ChatTurn]) -> Result<PipelineOutcome> {
        let query = last_user_query(turns).ok_or_else(|| ProfscopeError::InvalidRequest {
            message: "conversation has no user turn".into(),
        })?;
        Ok(self.answer(query).await)
    }
}
