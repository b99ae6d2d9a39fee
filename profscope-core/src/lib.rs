//! # Profscope Core
//!
//! Core library for profscope, a professor recommender built on student reviews.
//! Provides tiered review retrieval, professor-name extraction, prediction
//! enrichment via an external model, evidence assembly, answer generation with
//! retry and fallback, and the HTTP gateway that serves it all.

pub mod config;
pub mod context;
pub mod corpus;
pub mod embeddings;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod generation;
pub mod indexer;
pub mod pipeline;
pub mod prediction;
pub mod retrieval;
pub mod runtime;
pub mod types;
pub mod vector_index;

// Re-export commonly used types at the crate root.
pub use config::{AppConfig, Features, ServiceKeys, load_config};
pub use corpus::{InMemoryCorpus, JsonFileCorpus, ReviewCorpus};
pub use embeddings::{Embedder, HuggingFaceEmbedder};
pub use error::{ConfigError, CorpusError, ProfscopeError, Result, ServiceError};
pub use gateway::{AppState, SharedState};
pub use generation::{AnswerGenerator, AnswerSource, GeminiGenerator, Generator, RetryPolicy};
pub use indexer::ReviewIndexer;
pub use pipeline::{ChatPipeline, PipelineOutcome, ServiceClients};
pub use prediction::{ModelTrainer, PredictionEnricher, PredictionRequest, Predictor};
pub use retrieval::{KeywordRetriever, RetrievalCoordinator, RetrievalTier, VectorRetriever};
pub use runtime::{ScriptError, ScriptRunner};
pub use types::{
    ChatTurn, PredictionResult, PredictionSet, QueryContext, RetrievedReview, ReviewRecord, Role,
};
pub use vector_index::{IndexedVector, PineconeIndex, VectorIndex, VectorMatch};
