//! Nearest-neighbour index over review embeddings.
//!
//! Speaks the Pinecone REST protocol: a control plane that lists, describes and
//! creates indexes, and a per-index data-plane host for `query` and `upsert`.

use crate::config::VectorIndexConfig;
use crate::embeddings::truncate;
use crate::error::ServiceError;
use crate::types::ReviewRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const SERVICE: &str = "vector-index";

/// A scored neighbour returned by [`VectorIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub review: ReviewRecord,
}

/// A vector to store, with review metadata attached.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ReviewRecord,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-`top_k` neighbours of `vector`, most similar first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, ServiceError>;

    /// Insert or overwrite vectors. Returns the number stored.
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<usize, ServiceError>;

    /// Create the index if it does not exist yet.
    async fn ensure_index(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Pinecone-compatible REST client.
pub struct PineconeIndex {
    client: Client,
    api_key: String,
    config: VectorIndexConfig,
    host: OnceCell<String>,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RawMatch>,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    #[serde(default)]
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<ReviewRecord>,
}

impl PineconeIndex {
    pub fn new(config: &VectorIndexConfig, api_key: String) -> Result<Self, ServiceError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ServiceError::permanent(SERVICE, format!("Failed to build HTTP client: {e}"))
            })?;
        let host = OnceCell::new();
        if let Some(configured) = &config.host {
            let _ = host.set(normalize_host(configured));
        }
        Ok(Self {
            client,
            api_key,
            config: config.clone(),
            host,
            request_timeout,
        })
    }

    /// Data-plane base URL, looked up by index name on first use.
    async fn data_host(&self) -> Result<&str, ServiceError> {
        self.host
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/indexes/{}",
                    self.config.control_plane_url.trim_end_matches('/'),
                    self.config.index_name
                );
                let json = self.send(self.client.get(&url)).await?;
                let host = json
                    .get("host")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ServiceError::parse(SERVICE, "index description has no host"))?;
                debug!(index = %self.config.index_name, host, "Resolved index host");
                Ok(normalize_host(host))
            })
            .await
            .map(String::as_str)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
        let response = request
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", "2024-07")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::timeout(SERVICE, self.request_timeout)
                } else {
                    ServiceError::permanent(SERVICE, format!("Request failed: {e}"))
                }
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ServiceError::parse(SERVICE, format!("Failed to read response body: {e}"))
        })?;
        if !status.is_success() {
            let message = format!("HTTP {status}: {}", truncate(&body, 200));
            return Err(match status.as_u16() {
                429 | 500..=599 => ServiceError::transient(SERVICE, message),
                _ => ServiceError::permanent(SERVICE, message),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ServiceError::parse(SERVICE, format!("Invalid JSON: {e}")))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Turn a query response body into matches; absent metadata fields default.
fn parse_query_response(json: Value) -> Result<Vec<VectorMatch>, ServiceError> {
    let response: QueryResponse = serde_json::from_value(json)
        .map_err(|e| ServiceError::parse(SERVICE, format!("Unexpected query response: {e}")))?;
    Ok(response
        .matches
        .into_iter()
        .map(|m| VectorMatch {
            id: m.id,
            score: m.score,
            review: m.metadata.unwrap_or_else(|| ReviewRecord::new("", "", 0.0, "")),
        })
        .collect())
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>, ServiceError> {
        let url = format!("{}/query", self.data_host().await?);
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "namespace": self.config.namespace,
        });
        let json = self.send(self.client.post(&url).json(&body)).await?;
        let matches = parse_query_response(json)?;
        debug!(matches = matches.len(), "Vector query complete");
        Ok(matches)
    }

    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<usize, ServiceError> {
        let url = format!("{}/vectors/upsert", self.data_host().await?);
        let mut stored = 0;
        for batch in vectors.chunks(self.config.upsert_batch_size.max(1)) {
            let body = serde_json::json!({
                "vectors": batch,
                "namespace": self.config.namespace,
            });
            self.send(self.client.post(&url).json(&body)).await?;
            stored += batch.len();
        }
        info!(stored, index = %self.config.index_name, "Vectors upserted");
        Ok(stored)
    }

    async fn ensure_index(&self) -> Result<(), ServiceError> {
        let base = self.config.control_plane_url.trim_end_matches('/');
        let listing = self.send(self.client.get(format!("{base}/indexes"))).await?;
        let exists = listing
            .get("indexes")
            .and_then(Value::as_array)
            .is_some_and(|indexes| {
                indexes
                    .iter()
                    .any(|i| i.get("name").and_then(Value::as_str) == Some(&self.config.index_name))
            });
        if exists {
            return Ok(());
        }

        warn!(index = %self.config.index_name, "Index missing, creating it");
        let body = serde_json::json!({
            "name": self.config.index_name,
            "dimension": self.config.dimension,
            "metric": self.config.metric,
            "spec": { "serverless": { "cloud": self.config.cloud, "region": self.config.region } },
        });
        self.send(self.client.post(format!("{base}/indexes")).json(&body))
            .await?;
        Ok(())
    }
}
