//! # pwakit Common
//!
//! Shared error type, logging setup, and retry helpers used by every pwakit crate.
//!
//! ## Features
//!
//! - Unified error type with backtrace support for internal failures
//! - Logging configuration and setup
//! - Retry and timeout utilities
//! - `Option` extension trait

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig};

/// Unified error type for pwakit.
#[derive(Error, Debug)]
pub enum PwaError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cache storage errors.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A cache write was refused because the entry is over the size limit.
    #[error("Entry of {size} bytes exceeds the {limit} byte limit of cache {cache}")]
    QuotaExceeded {
        cache: String,
        size: usize,
        limit: usize,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker lifecycle errors (operation not valid in the current state).
    #[error("State error: {0}")]
    State(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse errors.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl PwaError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PwaError::Network { .. } | PwaError::Timeout(_) | PwaError::Io(_)
        )
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            PwaError::Network { .. } => "network",
            PwaError::Cache(_) => "cache",
            PwaError::QuotaExceeded { .. } => "quota",
            PwaError::Config { .. } => "config",
            PwaError::State(_) => "state",
            PwaError::Io(_) => "io",
            PwaError::Json(_) => "json",
            PwaError::Url(_) => "url",
            PwaError::Timeout(_) => "timeout",
            PwaError::NotFound(_) => "not_found",
            PwaError::InvalidArgument(_) => "invalid_argument",
            PwaError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for pwakit operations.
pub type Result<T> = std::result::Result<T, PwaError>;

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| PwaError::NotFound(resource.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(PwaError::network("test").category(), "network");
        assert_eq!(PwaError::cache("test").category(), "cache");
        assert_eq!(
            PwaError::Timeout(Duration::from_secs(1)).category(),
            "timeout"
        );
        assert_eq!(
            PwaError::QuotaExceeded {
                cache: "v1-images".into(),
                size: 10,
                limit: 5
            }
            .category(),
            "quota"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(PwaError::network("test").is_retryable());
        assert!(PwaError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!PwaError::cache("test").is_retryable());
        assert!(!PwaError::config("bad").is_retryable());
    }

    #[test]
    fn test_quota_message() {
        let err = PwaError::QuotaExceeded {
            cache: "v1-images".into(),
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Entry of 2048 bytes exceeds the 1024 byte limit of cache v1-images"
        );
    }

    #[test]
    fn test_option_ext() {
        let some: Option<i32> = Some(42);
        assert_eq!(some.ok_or_not_found("test").unwrap(), 42);

        let none: Option<i32> = None;
        assert!(matches!(
            none.ok_or_not_found("test"),
            Err(PwaError::NotFound(_))
        ));
    }
}
