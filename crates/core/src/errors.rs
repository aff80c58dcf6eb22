//! Error types and retry classification for inflation fetching.
//!
//! This module provides:
//! - [`FetchError`]: The main error enum for all fetch operations
//! - [`RetryClass`]: Classification deciding how the orchestrator reacts to an error

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::fetch::SourceAttempt;

/// Type alias for Result using our error type.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Errors that can occur while fetching, validating or bookkeeping inflation data.
///
/// The type is `Clone` so that a single in-flight outcome can be handed to every
/// caller waiting on the same period.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// An operation referenced a source id that is not registered.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// A fetch session id is unknown to both memory and the store.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Fetched data failed quality checks.
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Joined error messages from the validator
        message: String,
    },

    /// Source discovery or registration failed.
    #[error("Auto-configuration failed: {0}")]
    AutoConfigFailed(String),

    /// Every ranked source was tried and none produced an accepted value.
    #[error("All sources failed for {period}: {summary}")]
    AllSourcesFailed {
        /// Period key of the request
        period: String,
        /// Human readable attempt chain
        summary: String,
        /// Attempts made during the failed run
        attempts: Vec<SourceAttempt>,
    },

    /// The provider signalled throttling, or the local budget is exhausted.
    #[error("Rate limit exceeded: {source_name}")]
    RateLimitExceeded {
        /// Source that throttled the request
        source_name: String,
        /// When the provider allows requests again, if known
        retry_after: Option<DateTime<Utc>>,
    },

    /// An attempt exceeded its time bound.
    #[error("Timeout: {source_name} after {timeout_ms}ms")]
    Timeout {
        /// Source that timed out
        source_name: String,
        /// The bound that was exceeded
        timeout_ms: u64,
    },

    /// An illegal session transition or a conflicting concurrent request.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// The session was cancelled before a value was accepted.
    #[error("Session cancelled: {0}")]
    Cancelled(String),

    /// A provider-specific error occurred (bad status, malformed payload...).
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message
        message: String,
    },

    /// The source requires a credential and none is configured.
    #[error("Missing credential for source: {0}")]
    MissingCredential(String),

    /// The provider cannot serve this kind of period (e.g. monthly from an annual series).
    #[error("Provider {provider} does not serve period {period}")]
    UnsupportedPeriod {
        /// The provider that rejected the period
        provider: String,
        /// Period key
        period: String,
    },

    /// A network error occurred while talking to a provider.
    #[error("Network error: {0}")]
    Network(String),

    /// Input rejected by a validating constructor.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The persistent store failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Classification for retry policy.
///
/// | Class | Try next source? | Record `mark_source_failed`? |
/// |-------|------------------|------------------------------|
/// | `Never` | No | No |
/// | `FailoverWithPenalty` | Yes | Yes |
/// | `NextSource` | Yes | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Terminal for the whole session: storage failures, state conflicts.
    Never,

    /// Transient source failure: timeout, throttling, transport, bad payload.
    /// The failure counts against the source's health.
    FailoverWithPenalty,

    /// This source cannot serve the request but is not at fault.
    NextSource,
}

impl FetchError {
    /// Returns the retry classification for this error.
    ///
    /// ```
    /// use tufe_core::errors::{FetchError, RetryClass};
    ///
    /// let error = FetchError::Timeout { source_name: "EVDS".to_string(), timeout_ms: 500 };
    /// assert_eq!(error.retry_class(), RetryClass::FailoverWithPenalty);
    ///
    /// let error = FetchError::Storage("disk full".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. }
            | Self::RateLimitExceeded { .. }
            | Self::ProviderError { .. }
            | Self::Network(_)
            | Self::ValidationFailed { .. } => RetryClass::FailoverWithPenalty,

            Self::MissingCredential(_) | Self::UnsupportedPeriod { .. } => RetryClass::NextSource,

            Self::SourceNotFound(_)
            | Self::SessionNotFound(_)
            | Self::AutoConfigFailed(_)
            | Self::AllSourcesFailed { .. }
            | Self::StateConflict(_)
            | Self::Cancelled(_)
            | Self::InvalidInput(_)
            | Self::Storage(_) => RetryClass::Never,
        }
    }

    /// Builds a provider error from any displayable message.
    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ProviderError {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Converts a transport error raised while talking to `provider`.
    pub fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                source_name: provider.to_string(),
                timeout_ms: 0,
            };
        }
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            return Self::RateLimitExceeded {
                source_name: provider.to_string(),
                retry_after: None,
            };
        }
        if err.is_decode() {
            return Self::provider(provider, format!("malformed payload: {}", err));
        }
        Self::Network(format!("{}: {}", provider, err))
    }
}
