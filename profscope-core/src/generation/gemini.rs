//! Google Gemini `generateContent` client.

use super::Generator;
use crate::config::GenerationConfig;
use crate::embeddings::truncate;
use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "generation";

pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    request_timeout: Duration,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self, ServiceError> {
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
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            request_timeout,
        })
    }

    /// The key travels as a `?key=` query parameter. Transport errors must be
    /// reported without their URL.
    fn endpoint_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn build_request_body(prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        })
    }

    /// Map an HTTP status code to the matching `ServiceError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> ServiceError {
        let body = truncate(body_text, 300);
        match status.as_u16() {
            401 | 403 => {
                ServiceError::permanent(SERVICE, format!("authentication failed (HTTP {status})"))
            }
            429 => ServiceError::transient(SERVICE, format!("HTTP 429: quota exceeded: {body}")),
            503 => {
                ServiceError::transient(SERVICE, format!("HTTP 503 Service Unavailable: {body}"))
            }
            _ => {
                ServiceError::permanent(SERVICE, format!("HTTP {status} from Gemini API: {body}"))
            }
        }
    }

    /// Concatenated text parts of the first candidate.
    fn parse_response(body: &Value) -> Result<String, ServiceError> {
        let candidate = body
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .ok_or_else(|| ServiceError::parse(SERVICE, "no candidates in response"))?;
        let text: String = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ServiceError::parse(SERVICE, "empty response text"));
        }
        Ok(text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        debug!(model = self.model.as_str(), prompt_len = prompt.len(), "Sending Gemini request");

        let response = self
            .client
            .post(self.endpoint_url())
            .header("content-type", "application/json")
            .json(&Self::build_request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::timeout(SERVICE, self.request_timeout)
                } else {
                    let e = e.without_url();
                    ServiceError::permanent(SERVICE, format!("Request to Gemini API failed: {e}"))
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| {
            let e = e.without_url();
            ServiceError::parse(SERVICE, format!("Failed to read response body: {e}"))
        })?;
        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value = serde_json::from_str(&body_text)
            .map_err(|e| ServiceError::parse(SERVICE, format!("Invalid JSON in response: {e}")))?;
        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
