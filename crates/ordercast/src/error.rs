//! Error types for the order synchronization pipeline
//!
//! Includes error classification so the capture loop can decide between
//! retrying a transient failure and skipping a bad event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories for metrics and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Change feed errors (subscription, delivery, protocol)
    Feed,
    /// Record store errors (reachability, counting queries)
    Store,
    /// Client transport errors (unknown connection, closed channel)
    Transport,
    /// Notification channel errors
    Notification,
    /// Configuration errors (invalid settings)
    Configuration,
    /// Serialization errors (JSON)
    Serialization,
    /// Other/unknown errors
    Other,
}

/// Errors produced by the capture pipeline and its collaborators
#[derive(Error, Debug)]
pub enum SyncError {
    /// Change feed delivery or protocol error
    #[error("Feed error: {0}")]
    Feed(String),

    /// Change feed ended without an error
    #[error("Change feed closed")]
    StreamClosed,

    /// Record store unreachable or query failed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Event could not be classified or was missing required fields
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Command referenced a connection that is not registered
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Notification channel failure
    #[error("Notification error: {0}")]
    Notification(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// All resubscribe attempts were consumed without success
    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made before giving up
        attempts: u32,
    },
}

impl SyncError {
    /// Create a new feed error
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }

    /// Create a new store error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a new malformed event error
    pub fn malformed_event(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    /// Create a new unknown connection error
    pub fn unknown_connection(msg: impl Into<String>) -> Self {
        Self::UnknownConnection(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Check if this error is retriable.
    ///
    /// Returns true for transient errors where reopening the change feed
    /// may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Feed(_) | Self::StreamClosed | Self::StoreUnavailable(_) | Self::Timeout(_)
        )
    }

    /// Get the error category for metrics and alerting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Feed(_) => ErrorCategory::Feed,
            Self::StreamClosed => ErrorCategory::Feed,
            Self::RetriesExhausted { .. } => ErrorCategory::Feed,
            Self::StoreUnavailable(_) => ErrorCategory::Store,
            Self::UnknownConnection(_) => ErrorCategory::Transport,
            Self::Notification(_) => ErrorCategory::Notification,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::MalformedEvent(_) => ErrorCategory::Serialization,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Timeout(_) => ErrorCategory::Other,
        }
    }

    /// Get a metric-safe error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Feed(_) => "feed_error",
            Self::StreamClosed => "stream_closed",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::MalformedEvent(_) => "malformed_event",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::Config(_) => "config_error",
            Self::Json(_) => "json_error",
            Self::Notification(_) => "notification_error",
            Self::Timeout(_) => "timeout",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, SyncError>;
