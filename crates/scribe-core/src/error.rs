//! Unified error types for Scribe

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Unified error type for all Scribe operations
#[derive(Error, Debug)]
pub enum ScribeError {
    // Transient remote failures
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Timeout reported by the server or the HTTP stack, limit unknown
    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    // Fatal remote failures
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error: {0}")]
    Api(String),

    // Local policy decisions
    #[error("Circuit '{name}' is open, retry in {}s", retry_after.as_secs())]
    CircuitOpen { name: String, retry_after: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration and local I/O
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`ScribeError`]
///
/// Retry policies are configured in terms of kinds rather than concrete
/// errors, so the set can live in `.scribe/config.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    ServiceUnavailable,
    Network,
    Auth,
    InvalidRequest,
    Api,
    CircuitOpen,
    Cancelled,
    Config,
    Io,
    Serialization,
    Other,
}

impl ErrorKind {
    /// Kinds retried when no explicit set is configured
    pub const TRANSIENT: [ErrorKind; 4] = [
        ErrorKind::Timeout,
        ErrorKind::RateLimited,
        ErrorKind::ServiceUnavailable,
        ErrorKind::Network,
    ];

    /// Stable name used in log fields and config files
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Api => "api",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Other => "other",
        }
    }

    /// Whether this kind belongs to the default transient set
    pub fn is_transient(&self) -> bool {
        Self::TRANSIENT.contains(self)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScribeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScribeError::Timeout(_) | ScribeError::RequestTimeout(_) => ErrorKind::Timeout,
            ScribeError::RateLimited(_) => ErrorKind::RateLimited,
            ScribeError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            ScribeError::Network(_) => ErrorKind::Network,
            ScribeError::Auth(_) => ErrorKind::Auth,
            ScribeError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ScribeError::Api(_) => ErrorKind::Api,
            ScribeError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ScribeError::Cancelled => ErrorKind::Cancelled,
            ScribeError::Config(_) => ErrorKind::Config,
            ScribeError::Io(_) => ErrorKind::Io,
            ScribeError::Serialization(_) => ErrorKind::Serialization,
            ScribeError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether this error is transient under the default classification
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

/// Result type alias using ScribeError
pub type Result<T> = std::result::Result<T, ScribeError>;
