//! Answer generation over a generative language service.
//!
//! [`AnswerGenerator`] drives a small state machine: with no credential it
//! returns the templated answer at once; otherwise it calls the service,
//! waits with exponential backoff between retryable failures, and ends in
//! either the generated text or the degraded template.

pub mod gemini;

pub use gemini::GeminiGenerator;

use crate::config::GenerationConfig;
use crate::context::{FallbackReason, build_prompt, fallback_answer};
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Single-shot prompt-in, text-out generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;

    fn model_name(&self) -> &str;
}

/// Failure messages that indicate a temporary condition.
const RETRYABLE_MARKERS: [&str; 4] = ["503", "unavailable", "quota", "timeout"];

/// Whether a generation failure is worth another attempt.
pub fn is_retryable(err: &ServiceError) -> bool {
    if err.is_transient() {
        return true;
    }
    let message = err.to_string().to_lowercase();
    RETRYABLE_MARKERS.iter().any(|m| message.contains(m))
}

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1200),
            multiplier: 1.8,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier.max(1.0),
        }
    }

    /// Delay after failed attempt `attempt` (1-based) before the next one.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.round() as u64)
    }
}

/// How the final answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Generated,
    NoKeyFallback,
    DegradedFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub answer: String,
    pub source: AnswerSource,
    /// Generation calls made; zero when generation is disabled.
    pub attempts: usize,
}

enum GenerationState {
    NoKeyFallback,
    Generating { attempt: usize },
    RetryWait { attempt: usize, delay: Duration },
    Success { text: String, attempts: usize },
    DegradedFallback { attempts: usize },
}

/// Turns a query and its evidence block into the user-visible answer.
#[derive(Clone)]
pub struct AnswerGenerator {
    generator: Option<Arc<dyn Generator>>,
    policy: RetryPolicy,
    key_env: String,
}

impl AnswerGenerator {
    pub fn new(
        generator: Option<Arc<dyn Generator>>,
        policy: RetryPolicy,
        key_env: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            policy,
            key_env: key_env.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn answer(&self, query: &str, context: &str) -> GenerationOutcome {
        let prompt = build_prompt(query, context);
        let mut state = match self.generator {
            Some(_) => GenerationState::Generating { attempt: 1 },
            None => GenerationState::NoKeyFallback,
        };

        loop {
            state = match state {
                GenerationState::NoKeyFallback => {
                    info!("Generation disabled, returning review summary");
                    let reason = FallbackReason::Disabled {
                        key_env: self.key_env.clone(),
                    };
                    return GenerationOutcome {
                        answer: fallback_answer(query, context, &reason),
                        source: AnswerSource::NoKeyFallback,
                        attempts: 0,
                    };
                }
                GenerationState::Generating { attempt } => match &self.generator {
                    None => GenerationState::NoKeyFallback,
                    Some(generator) => match generator.generate(&prompt).await {
                        Ok(text) if !text.trim().is_empty() => GenerationState::Success {
                            text,
                            attempts: attempt,
                        },
                        Ok(_) => {
                            warn!(attempt, "Generation returned empty text");
                            GenerationState::DegradedFallback { attempts: attempt }
                        }
                        Err(e) if is_retryable(&e) && attempt < self.policy.max_attempts => {
                            let delay = self.policy.delay_for(attempt);
                            warn!(
                                attempt,
                                max_attempts = self.policy.max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Generation failed, retrying"
                            );
                            GenerationState::RetryWait { attempt, delay }
                        }
                        Err(e) => {
                            warn!(attempt, error = %e, "Generation failed, using review summary");
                            GenerationState::DegradedFallback { attempts: attempt }
                        }
                    },
                },
                GenerationState::RetryWait { attempt, delay } => {
                    tokio::time::sleep(delay).await;
                    GenerationState::Generating {
                        attempt: attempt + 1,
                    }
                }
                GenerationState::Success { text, attempts } => {
                    info!(attempts, "Answer generated");
                    return GenerationOutcome {
                        answer: text,
                        source: AnswerSource::Generated,
                        attempts,
                    };
                }
                GenerationState::DegradedFallback { attempts } => {
                    return GenerationOutcome {
                        answer: fallback_answer(query, context, &FallbackReason::ServiceIssue),
                        source: AnswerSource::DegradedFallback,
                        attempts,
                    };
                }
            };
        }
    }
}
