//! Text embedding via a hosted inference API.
//!
//! The hosted model answers HTTP 503 while it is warming up. Those responses
//! are retried with a fixed delay; every other non-2xx status fails at once so
//! the retrieval coordinator can fall back without waiting.

use crate::config::EmbeddingConfig;
use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const SERVICE: &str = "embedding";

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;

    /// Return the provider/model name.
    fn model_name(&self) -> &str;
}

/// Embedder backed by the HuggingFace inference endpoint.
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_attempts: usize,
    retry_delay: Duration,
    request_timeout: Duration,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, ServiceError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ServiceError::permanent(SERVICE, format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            endpoint: format!("{}/{}", config.base_url.trim_end_matches('/'), config.model),
            api_key,
            model: config.model.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            request_timeout,
        })
    }

    /// One request/response exchange, without retries.
    async fn request_once(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "inputs": text }))
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

        if status.as_u16() == 503 {
            return Err(ServiceError::transient(
                SERVICE,
                format!("HTTP 503: model is loading ({})", truncate(&body, 200)),
            ));
        }
        if !status.is_success() {
            return Err(ServiceError::permanent(
                SERVICE,
                format!("HTTP {status}: {}", truncate(&body, 200)),
            ));
        }

        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ServiceError::parse(SERVICE, format!("Invalid JSON: {e}")))?;
        parse_embedding(&json)
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let mut attempt = 1;
        loop {
            match self.request_once(text).await {
                Ok(vector) => {
                    debug!(attempt, dims = vector.len(), "Embedding received");
                    return Ok(vector);
                }
                Err(e @ ServiceError::Transient { .. }) if attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        "Embedding model loading, retrying"
                    );
                    debug!(error = %e, "Embedding attempt failed");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extract the vector from `[{ "embedding": [...] }, ...]`.
pub fn parse_embedding(json: &Value) -> Result<Vec<f32>, ServiceError> {
    let values = json
        .get(0)
        .and_then(|first| first.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::parse(SERVICE, "missing [0].embedding array"))?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ServiceError::parse(SERVICE, "non-numeric embedding component"))
        })
        .collect()
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::post};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config_for(base_url: String) -> EmbeddingConfig {
        EmbeddingConfig {
            base_url,
            model: "test-model".into(),
            max_attempts: 5,
            retry_delay_ms: 5,
            request_timeout_secs: 5,
            ..EmbeddingConfig::default()
        }
    }

    /// Serve `/test-model`, answering with `statuses[n]` for the n-th call
    /// (the last status repeats) and a vector body on 200.
    async fn spawn_stub(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let app = Router::new().route(
            "/test-model",
            post(move || {
                let counter = Arc::clone(&counter);
                let statuses = statuses.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let code = statuses[n.min(statuses.len() - 1)];
                    let status = StatusCode::from_u16(code).unwrap();
                    if status.is_success() {
                        (status, r#"[{"embedding":[0.5,-0.25,1.0]}]"#.to_string())
                    } else {
                        (status, r#"{"error":"stub"}"#.to_string())
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), calls)
    }

    #[test]
    fn test_parse_embedding() {
        let json = serde_json::json!([{ "embedding": [1.0, 2.5] }]);
        assert_eq!(parse_embedding(&json).unwrap(), vec![1.0, 2.5]);
    }

    #[test]
    fn test_parse_embedding_malformed() {
        let err = parse_embedding(&serde_json::json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, ServiceError::Parse { .. }));
        let err = parse_embedding(&serde_json::json!([{ "embedding": ["a"] }])).unwrap_err();
        assert!(matches!(err, ServiceError::Parse { .. }));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_embed_success() {
        let (url, calls) = spawn_stub(vec![200]).await;
        let embedder = HuggingFaceEmbedder::new(&config_for(url), "hf_test".into()).unwrap();
        let v = embedder.embed("hello").await.unwrap();
        assert_eq!(v, vec![0.5, -0.25, 1.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_embed_retries_on_503_then_succeeds() {
        let (url, calls) = spawn_stub(vec![503, 503, 200]).await;
        let embedder = HuggingFaceEmbedder::new(&config_for(url), "hf_test".into()).unwrap();
        let v = embedder.embed("hello").await.unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embed_gives_up_after_max_attempts() {
        let (url, calls) = spawn_stub(vec![503]).await;
        let embedder = HuggingFaceEmbedder::new(&config_for(url), "hf_test".into()).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::Transient { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_embed_other_status_fails_immediately() {
        let (url, calls) = spawn_stub(vec![401]).await;
        let embedder = HuggingFaceEmbedder::new(&config_for(url), "bad".into()).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::Permanent { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
