//! Error taxonomy for the retrieval core.
//!
//! Every fallible operation in this crate returns [`CoreError`]. Variants are
//! chosen so that callers can tell at a glance whether a failure is worth
//! retrying, worth surfacing to a user, or simply the result of a deadline
//! expiring. Display impls never interpolate API keys or response bodies.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy for the retrieval core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or invalid configuration; fatal at startup.
    #[error("config error: {message}")]
    ConfigError { message: String },

    /// 429/5xx/timeout from the backend; already retried and still failing.
    #[error("backend transient error: {status} on {method} {path} (attempt {attempt})")]
    BackendTransientError {
        status: u16,
        method: String,
        path: String,
        attempt: u32,
    },

    /// 4xx (other than 429); never retried.
    #[error("backend permanent error: {status} on {method} {path}")]
    BackendPermanentError {
        status: u16,
        method: String,
        path: String,
    },

    /// Malformed input, returned synchronously with a human-readable reason.
    #[error("validation error: {reason}")]
    ValidationError { reason: String },

    /// Deadline expired or the caller explicitly cancelled. Not logged at
    /// error level.
    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// Failure talking to the embedding provider.
    #[error("embedding failed: {cause}")]
    EmbeddingFailed { cause: String },

    /// Unexpected internal failure. Never carries secrets or response
    /// bodies; only a short, sanitized cause.
    #[error("internal error: {cause}")]
    Internal { cause: String },
}

impl CoreError {
    /// True for errors the gateway retry loop should retry.
    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationError {
            reason: reason.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn internal(cause: impl Into<String>) -> Self {
        Self::Internal {
            cause: cause.into(),
        }
    }

    /// Whether this variant should be logged at `error` level. Cancellation
    /// is an expected outcome of a deadline and is logged at `debug`.
    pub fn is_error_level(&self) -> bool {
        !matches!(self, CoreError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_matches_taxonomy() {
        for status in [429, 500, 502, 503, 504] {
            assert!(CoreError::is_retryable_status(status));
        }
        for status in [400, 401, 403, 404, 409] {
            assert!(!CoreError::is_retryable_status(status));
        }
    }

    #[test]
    fn cancelled_is_not_error_level() {
        let err = CoreError::cancelled("deadline exceeded");
        assert!(!err.is_error_level());
        let err = CoreError::internal("boom");
        assert!(err.is_error_level());
    }

    #[test]
    fn display_never_includes_placeholder_secrets() {
        let err = CoreError::config("INDEX_API_KEY is required");
        let text = err.to_string();
        assert!(text.contains("INDEX_API_KEY"));
        assert!(!text.to_lowercase().contains("bearer "));
    }
}
