//! Deterministic error classification.

use crate::error::ModelError;

/// Category of a failed external call, derived from HTTP status and
/// message patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 429-like throttling.
    RateLimit,
    /// A deadline expired.
    Timeout,
    /// 401/403; never retried.
    Authentication,
    /// Other 4xx; not retried.
    ClientError,
    /// 5xx or transport-level failure; retried.
    ServerError,
    /// Nothing recognizable.
    Unknown,
}

impl ErrorCategory {
    /// Classify a model error. Status codes win over message patterns.
    #[must_use]
    pub fn classify(error: &ModelError) -> Self {
        if let Some(status) = error.status {
            return match status {
                429 => Self::RateLimit,
                401 | 403 => Self::Authentication,
                408 => Self::Timeout,
                400..=499 => Self::ClientError,
                500..=599 => Self::ServerError,
                _ => Self::classify_message(&error.message),
            };
        }
        if error.retry_after_secs.is_some() {
            return Self::RateLimit;
        }
        Self::classify_message(&error.message)
    }

    /// Classify from a bare message, for errors with no status attached.
    #[must_use]
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("too many requests") {
            Self::RateLimit
        } else if lower.contains("timed out") || lower.contains("timeout") {
            Self::Timeout
        } else if lower.contains("unauthorized")
            || lower.contains("invalid api key")
            || lower.contains("forbidden")
            || lower.contains("authentication")
        {
            Self::Authentication
        } else if lower.contains("connection")
            || lower.contains("unavailable")
            || lower.contains("transport")
            || lower.contains("broken pipe")
            || lower.contains("reset by peer")
        {
            Self::ServerError
        } else {
            Self::Unknown
        }
    }

    /// Whether the retry policy applies to this category.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServerError)
    }
}
