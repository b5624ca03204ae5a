//! Error types for the HomeyPro MCP query core
//!
//! Two families live here:
//!
//! - [`FetchError`] is what a [`Fetcher`](crate::client::Fetcher) reports when the
//!   upstream controller cannot produce a value. It is data for the cache: a failed
//!   refresh over an existing entry becomes a stale read, not a fault.
//! - [`HomeyError`] is what callers of the query facade see. Only three variants end
//!   a query without a value: [`HomeyError::InvalidCursor`],
//!   [`HomeyError::UnknownResourceKey`] and [`HomeyError::UpstreamUnreachableNoCache`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for HomeyPro operations
pub type Result<T> = std::result::Result<T, HomeyError>;

/// Errors surfaced to query callers and by configuration/setup code
#[derive(Error, Debug)]
pub enum HomeyError {
    /// Malformed or out-of-range pagination cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// No fetcher registered for the requested resource
    #[error("Unknown resource: {0}")]
    UnknownResourceKey(String),

    /// First fetch for a resource failed and there is nothing cached to fall back on
    #[error("HomeyPro unreachable and no cached data for '{resource}': {source}")]
    UpstreamUnreachableNoCache {
        resource: String,
        #[source]
        source: Arc<FetchError>,
        failed_at: DateTime<Utc>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HomeyError {
    /// Create an invalid cursor error
    pub fn invalid_cursor<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCursor(msg.into())
    }

    /// Create an unknown resource error
    pub fn unknown_resource<S: Into<String>>(key: S) -> Self {
        Self::UnknownResourceKey(key.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::UnknownResourceKey(_) => "unknown_resource",
            Self::UpstreamUnreachableNoCache { .. } => "upstream_unreachable",
            Self::Config(_) => "configuration",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }

    /// Whether the caller supplied bad input (never worth retrying)
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidCursor(_) | Self::UnknownResourceKey(_))
    }

    /// Render as a JSON error object for tool/resource handlers
    pub fn to_api_error(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "error_type": self.code(),
            "fallback_available": false,
            "suggested_action": self.suggested_action(),
        });

        if let Self::UpstreamUnreachableNoCache {
            resource,
            source,
            failed_at,
        } = self
        {
            let detail = ErrorDetail::from_fetch_error(resource, source, *failed_at);
            body["details"] = serde_json::to_value(detail).unwrap_or(serde_json::Value::Null);
        }

        body
    }

    fn suggested_action(&self) -> &'static str {
        match self {
            Self::InvalidCursor(_) => "Check cursor parameter format or omit it to start over",
            Self::UnknownResourceKey(_) => {
                "List the available resources and retry with one of them"
            }
            Self::UpstreamUnreachableNoCache { source, .. } => match source.as_ref() {
                FetchError::Timeout(_) => "HomeyPro may be overloaded, try again in a few moments",
                FetchError::Authentication(_) => "Check the HomeyPro API token",
                _ => "Check HomeyPro connectivity and network settings",
            },
            Self::Config(_) => "Check HOMEY_* environment variables",
            Self::Io(_) | Self::Json(_) => "Inspect the server logs",
        }
    }
}

/// Failure reported by a fetcher
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Controller could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request did not complete in time
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Controller rejected the credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Controller answered with a non-success status
    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Response body could not be interpreted
    #[error("Decode error: {0}")]
    Decode(String),

    /// Circuit breaker refused the call
    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),

    /// Fetcher misbehaved (panicked, task aborted)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Connection,
    Timeout,
    Authentication,
    Upstream,
    Decode,
    CircuitOpen,
    Internal,
}

impl FetchErrorKind {
    /// Lowercase name used in logs and error details
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::Upstream => "upstream",
            Self::Decode => "decode",
            Self::CircuitOpen => "circuit_open",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FetchError {
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn upstream<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Upstream {
            status,
            message: msg.into(),
        }
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Connection(_) => FetchErrorKind::Connection,
            Self::Timeout(_) => FetchErrorKind::Timeout,
            Self::Authentication(_) => FetchErrorKind::Authentication,
            Self::Upstream { .. } => FetchErrorKind::Upstream,
            Self::Decode(_) => FetchErrorKind::Decode,
            Self::CircuitOpen(_) => FetchErrorKind::CircuitOpen,
            Self::Internal(_) => FetchErrorKind::Internal,
        }
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Failures that count against a circuit breaker. Client errors (4xx) say
    /// nothing about controller health and are excluded.
    pub fn is_network_failure(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Observability detail attached to stale reads and hard failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Failure class
    pub kind: FetchErrorKind,
    /// Human-readable message
    pub message: String,
    /// Resource whose refresh failed
    pub resource: String,
    /// When the failure was observed
    pub occurred_at: DateTime<Utc>,
    /// Whether the failure is considered transient
    pub retryable: bool,
}

impl ErrorDetail {
    /// Build a detail record from a fetch failure observed at `occurred_at`
    pub fn from_fetch_error(
        resource: &str,
        error: &FetchError,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            resource: resource.to_string(),
            occurred_at,
            retryable: error.is_retryable(),
        }
    }
}
