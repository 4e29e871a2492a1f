use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for jobscout.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP client could not be built or a request could not be sent.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The site answered with HTTP 429 or an equivalent throttle signal.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The site served an anti-bot challenge instead of content.
    #[error("Blocked by site: {0}")]
    Blocked(String),

    /// Every proxy is quarantined and none has finished its cooldown.
    #[error("Proxy pool exhausted, earliest proxy available in {}ms", retry_after.as_millis())]
    PoolExhausted { retry_after: Duration },

    /// A page could not be turned into the expected structure.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// A query is missing required fields or has an invalid limit.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Configuration could not be interpreted.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimited
        )
    }

    /// Returns true if this error ends the whole pipeline invocation.
    ///
    /// These point at configuration or environment problems rather than
    /// transient scraping conditions.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::PoolExhausted { .. } | AppError::InvalidQuery(_) | AppError::ConfigError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimited.is_retryable());
        assert!(!AppError::Blocked("captcha".into()).is_retryable());
        assert!(!AppError::ParseFailure("no title".into()).is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(
            AppError::PoolExhausted {
                retry_after: Duration::from_secs(5)
            }
            .is_fatal()
        );
        assert!(AppError::InvalidQuery("empty keywords".into()).is_fatal());
        assert!(!AppError::Blocked("captcha".into()).is_fatal());
        assert!(!AppError::Timeout(20).is_fatal());
    }

    #[test]
    fn test_pool_exhausted_message_includes_wait() {
        let err = AppError::PoolExhausted {
            retry_after: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("1500ms"));
    }
}
