//! Error handling for the Judge SDK
//!
//! Two layers of errors live here:
//! - `ProviderError`: a raw failure reported by one judge backend
//! - `JudgeError`: what callers of the evaluator actually see
//!
//! Raw failures are mapped to a `FailureKind` by [`classify`], which drives
//! retry, circuit breaking and fallback decisions.

use std::time::Duration;
use thiserror::Error;

use crate::util::sanitize_for_logging;

pub mod classify;
pub mod mapping;

pub use classify::{classify, FailureKind};

/// Result type for Judge SDK operations
pub type Result<T> = std::result::Result<T, JudgeError>;

/// A raw failure from a judge provider, before classification
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The provider answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The connection could not be established or was reset
    #[error("Connection error: {0}")]
    Connection(String),

    /// The transport or the timeout guard gave up waiting
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The provider answered but the body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Anything else, classified by its message
    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Create an HTTP status error
    pub fn http(status: u16, message: impl AsRef<str>) -> Self {
        ProviderError::Http {
            status,
            message: sanitize_for_logging(message.as_ref()),
            retry_after: None,
        }
    }

    /// Create an HTTP status error carrying a `Retry-After` hint
    pub fn http_with_retry_after(
        status: u16,
        message: impl AsRef<str>,
        retry_after: Option<Duration>,
    ) -> Self {
        ProviderError::Http {
            status,
            message: sanitize_for_logging(message.as_ref()),
            retry_after,
        }
    }

    /// Create a connection error
    pub fn connection(message: impl AsRef<str>) -> Self {
        ProviderError::Connection(sanitize_for_logging(message.as_ref()))
    }

    /// Create a timeout error
    pub fn timeout(message: impl AsRef<str>) -> Self {
        ProviderError::Timeout(sanitize_for_logging(message.as_ref()))
    }

    /// Create a decode error
    pub fn decode(message: impl AsRef<str>) -> Self {
        ProviderError::Decode(sanitize_for_logging(message.as_ref()))
    }

    /// Create an unstructured error
    pub fn other(message: impl AsRef<str>) -> Self {
        ProviderError::Other(sanitize_for_logging(message.as_ref()))
    }

    /// HTTP status code if the provider returned one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Delay suggested by the provider before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> FailureKind {
        classify(self)
    }
}

/// Convert reqwest errors to ProviderError
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ProviderError::connection(format!("Connection error: {}", err))
        } else if err.is_decode() {
            ProviderError::decode(format!("Response decode error: {}", err))
        } else if let Some(status) = err.status() {
            ProviderError::http(status.as_u16(), err.to_string())
        } else if err.is_request() || err.is_builder() {
            ProviderError::http(400, format!("Invalid request: {}", err))
        } else {
            ProviderError::other(format!("HTTP client error: {}", err))
        }
    }
}

/// Convert serde_json errors to ProviderError
impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::decode(format!("JSON error: {}", err))
    }
}

/// Caller-visible error type for the Judge SDK
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JudgeError {
    /// A provider rejected our credentials or permissions
    #[error("Authentication error from provider '{provider}': {message}")]
    Authentication { provider: String, message: String },

    /// A provider rejected the request itself
    #[error("Validation error from provider '{provider}': {message}")]
    Validation { provider: String, message: String },

    /// No provider could serve the request and nothing was cached
    #[error("All providers exhausted: {}", attempted.join(", "))]
    ProvidersExhausted { attempted: Vec<String> },

    /// The criteria set failed validation
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request was cancelled before it completed
    #[error("Request cancelled")]
    Cancelled,

    /// The evaluator has been closed
    #[error("Evaluator is closed")]
    Closed,
}

impl JudgeError {
    /// Build the caller-visible error for a fatal provider failure
    pub fn fatal(kind: FailureKind, provider: impl Into<String>, error: &ProviderError) -> Self {
        let provider = provider.into();
        let message = sanitize_for_logging(&error.to_string());
        match kind {
            FailureKind::Authentication => JudgeError::Authentication { provider, message },
            _ => JudgeError::Validation { provider, message },
        }
    }

    /// Create an invalid criteria error
    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        JudgeError::InvalidCriteria(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        JudgeError::Configuration(message.into())
    }

    /// Check if this error came from a provider refusing the request outright
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JudgeError::Authentication { .. } | JudgeError::Validation { .. }
        )
    }
}
