//! Configuration system for profscope.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Credentials are
//! never part of the file: each service section names the environment variable
//! that holds its key, and [`ServiceKeys::from_env`] resolves them once at
//! process start.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub corpus: CorpusConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub vector_index: VectorIndexConfig,
    pub prediction: PredictionConfig,
    pub training: TrainingConfig,
    pub generation: GenerationConfig,
    pub server: ServerConfig,
}

/// Location of the review store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Path to the `{ "reviews": [...] }` JSON document, relative to the workspace.
    pub path: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/reviews.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum reviews returned per query.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Hosted embedding model (HuggingFace inference API shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable name containing the API token.
    pub api_key_env: String,
    /// Total attempts while the model reports 503 (warming up).
    pub max_attempts: usize,
    /// Fixed delay between 503 retries.
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-inference.huggingface.co/models".to_string(),
            model: "intfloat/multilingual-e5-large".to_string(),
            api_key_env: "HUGGINGFACE_API_TOKEN".to_string(),
            max_attempts: 5,
            retry_delay_ms: 5000,
            request_timeout_secs: 30,
        }
    }
}

/// Hosted nearest-neighbour index (Pinecone REST shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub api_key_env: String,
    pub control_plane_url: String,
    /// Data-plane host. When absent it is looked up by `index_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub index_name: String,
    pub namespace: String,
    pub dimension: usize,
    pub metric: String,
    pub cloud: String,
    pub region: String,
    pub upsert_batch_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            api_key_env: "PINECONE_API_KEY".to_string(),
            control_plane_url: "https://api.pinecone.io".to_string(),
            host: None,
            index_name: "professors-index".to_string(),
            namespace: "ns1".to_string(),
            dimension: 1024,
            metric: "cosine".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: 100,
            request_timeout_secs: 30,
        }
    }
}

/// External prediction subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Interpreter or executable that runs the scripts.
    pub program: String,
    pub script: PathBuf,
    /// Working directory for the subprocess; defaults to the workspace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Budget per professor on the chat path.
    pub chat_timeout_secs: u64,
    /// Budget for the standalone prediction endpoint.
    pub endpoint_timeout_secs: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: PathBuf::from("predict_professor.py"),
            working_dir: None,
            chat_timeout_secs: 10,
            endpoint_timeout_secs: 30,
        }
    }
}

impl PredictionConfig {
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint_timeout_secs)
    }
}

/// Model training script, run with `prediction.program`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub script: PathBuf,
    pub timeout_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            script: PathBuf::from("train_model.py"),
            timeout_secs: 600,
        }
    }
}

/// Generative language service (Gemini REST shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            max_attempts: 4,
            initial_backoff_ms: 1200,
            backoff_multiplier: 1.8,
            request_timeout_secs: 60,
        }
    }
}

/// HTTP gateway bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid {
                message: "retrieval.top_k must be at least 1".into(),
            });
        }
        if self.embedding.max_attempts == 0 || self.generation.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "max_attempts must be at least 1".into(),
            });
        }
        if self.generation.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                message: "generation.backoff_multiplier must be >= 1.0".into(),
            });
        }
        if self.vector_index.upsert_batch_size == 0 {
            return Err(ConfigError::Invalid {
                message: "vector_index.upsert_batch_size must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Resolve a possibly relative path against the workspace.
    pub fn resolve_path(workspace: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            workspace.join(path)
        }
    }
}

/// Service credentials, read from the environment once at start-up.
#[derive(Clone, Default)]
pub struct ServiceKeys {
    pub embedding: Option<String>,
    pub vector_index: Option<String>,
    pub generation: Option<String>,
}

impl std::fmt::Debug for ServiceKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ServiceKeys")
            .field("embedding", &mask(&self.embedding))
            .field("vector_index", &mask(&self.vector_index))
            .field("generation", &mask(&self.generation))
            .finish()
    }
}

impl ServiceKeys {
    /// Read the keys named by `config`. Empty values count as absent.
    pub fn from_env(config: &AppConfig) -> Self {
        Self::from_lookup(config, |var| std::env::var(var).ok())
    }

    /// Read the keys through an arbitrary lookup function.
    pub fn from_lookup(config: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        Self {
            embedding: read(&config.embedding.api_key_env),
            vector_index: read(&config.vector_index.api_key_env),
            generation: read(&config.generation.api_key_env),
        }
    }

    pub fn features(&self) -> Features {
        Features {
            vector_search: self.embedding.is_some() && self.vector_index.is_some(),
            generation: self.generation.is_some(),
        }
    }
}

/// Immutable feature toggles derived from the configured credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Features {
    /// Both an embedding and a vector-index credential are present.
    pub vector_search: bool,
    /// A generative-service credential is present.
    pub generation: bool,
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `PROFSCOPE_`)
/// 3. Workspace-local config (`.profscope/config.toml`)
/// 4. User config (`~/.config/profscope/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "profscope", "profscope") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".profscope").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // PROFSCOPE_GENERATION__MODEL, PROFSCOPE_SERVER__PORT, etc.
    figment = figment.merge(Env::prefixed("PROFSCOPE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Write a default `.profscope/config.toml` into `workspace`. Returns its path.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, crate::error::ProfscopeError> {
    let dir = workspace.join(".profscope");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("config.toml");
    let body = toml::to_string_pretty(&AppConfig::default()).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    std::fs::write(&path, body)?;
    Ok(path)
}
