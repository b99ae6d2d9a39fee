//! Error types for the profscope core library.
//!
//! Uses `thiserror` for public API error types. `ServiceError` models every
//! failure of an external collaborator (embedding service, vector index,
//! prediction subprocess, generative service) and carries the name of the
//! service so log lines and fallbacks can attribute it.

use std::path::PathBuf;

/// Top-level error type for the profscope core library.
#[derive(Debug, thiserror::Error)]
pub enum ProfscopeError {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of external collaborators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Retryable condition: 503, model loading, quota, unavailable.
    #[error("{service} temporarily unavailable: {message}")]
    Transient { service: String, message: String },

    /// Non-retryable failure such as bad credentials or a rejected request.
    #[error("{service} request failed: {message}")]
    Permanent { service: String, message: String },

    /// The response did not have the expected shape.
    #[error("{service} returned an unexpected response: {message}")]
    Parse { service: String, message: String },

    /// The call exceeded its wall-clock budget.
    #[error("{service} timeout after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },
}

impl ServiceError {
    pub fn transient(service: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(service: &str, message: impl Into<String>) -> Self {
        Self::Permanent {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(service: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn timeout(service: &str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            service: service.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Name of the collaborator that failed.
    pub fn service(&self) -> &str {
        match self {
            Self::Transient { service, .. }
            | Self::Permanent { service, .. }
            | Self::Parse { service, .. }
            | Self::Timeout { service, .. } => service,
        }
    }

    /// Whether the variant itself marks the failure as transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the review store.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Failed to read review store {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to write review store {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Malformed review store {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// A type alias for results using the top-level `ProfscopeError`.
pub type Result<T> = std::result::Result<T, ProfscopeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display_service() {
        let err = ProfscopeError::Service(ServiceError::permanent("gemini", "HTTP 400"));
        assert_eq!(
            err.to_string(),
            "Service error: gemini request failed: HTTP 400"
        );
    }

    #[test]
    fn test_timeout_display_mentions_timeout() {
        let err = ServiceError::timeout("prediction", Duration::from_secs(10));
        assert_eq!(err.to_string(), "prediction timeout after 10000ms");
        assert!(err.to_string().to_lowercase().contains("timeout"));
    }

    #[test]
    fn test_service_name_accessor() {
        assert_eq!(ServiceError::transient("embedding", "503").service(), "embedding");
        assert_eq!(ServiceError::parse("vector-index", "no matches").service(), "vector-index");
    }

    #[test]
    fn test_is_transient() {
        assert!(ServiceError::transient("x", "busy").is_transient());
        assert!(ServiceError::timeout("x", Duration::from_millis(5)).is_transient());
        assert!(!ServiceError::permanent("x", "bad key").is_transient());
        assert!(!ServiceError::parse("x", "not json").is_transient());
    }

    #[test]
    fn test_error_display_config() {
        let err = ProfscopeError::Config(ConfigError::Invalid {
            message: "retrieval.top_k must be positive".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: retrieval.top_k must be positive"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProfscopeError = io_err.into();
        assert!(matches!(err, ProfscopeError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: ProfscopeError = serde_err.into();
        assert!(matches!(err, ProfscopeError::Serialization(_)));
    }
}
