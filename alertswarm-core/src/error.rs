//! Error types for the Alertswarm core library.
//!
//! Uses `thiserror` for public API error types. Only [`SwarmError`] ever
//! escapes an investigation; everything below it is converted into a failed
//! finding or an empty result before it reaches the orchestrator loop.

/// Top-level error type for the Alertswarm core library.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from threat-intel enrichment lookups.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("Rate limit exceeded for {provider}: {capacity} requests per {window_ms}ms")]
    RateLimitExceeded {
        provider: String,
        capacity: usize,
        window_ms: u64,
    },

    #[error("{provider} request failed: {message}")]
    Http { provider: String, message: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} response parse error: {message}")]
    Parse { provider: String, message: String },

    #[error("{provider} has no record for {subject}")]
    NotFound { provider: String, subject: String },
}

/// Errors from the relational, analytics, and similarity collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Write failed: {message}")]
    Write { message: String },

    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },
}

/// Result type alias for Alertswarm operations.
pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = SwarmError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_rate_limit() {
        let err = EnrichmentError::RateLimitExceeded {
            provider: "virustotal".into(),
            capacity: 4,
            window_ms: 60_000,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded for virustotal: 4 requests per 60000ms"
        );
    }

    #[test]
    fn test_error_display_store() {
        let err = SwarmError::Store(StoreError::Write {
            message: "disk full".into(),
        });
        assert_eq!(err.to_string(), "Store error: Write failed: disk full");
    }

    #[test]
    fn test_error_from_serde() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: SwarmError = parse.unwrap_err().into();
        assert!(matches!(err, SwarmError::Serialization(_)));
    }
}
