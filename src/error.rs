//! Error types for session loading and analysis.
//!
//! Errors fall into two families with different propagation rules:
//!
//! - [`SessionError`]: anything that prevents a [`Session`](crate::Session) from
//!   being produced. These are fatal to a pipeline request, since no analysis is
//!   possible without a session.
//! - [`AnalyzerError`]: anything raised while one analyzer runs. These are always
//!   confined to that analyzer's result slot.
//!
//! Both map onto a flat, serializable [`ErrorKind`] which the HTTP layer uses to
//! pick a status code.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use paddock::SessionError;
//!
//! let error = SessionError::source_unavailable("timing feed returned 503");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

type SharedSource = Arc<dyn std::error::Error + Send + Sync>;

/// Errors raised while fetching, normalizing or caching a session.
///
/// `Clone` so a single failed load can be handed to every waiter that
/// joined it.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum SessionError {
    #[error("Session source unavailable: {reason}")]
    SourceUnavailable {
        reason: String,
        #[source]
        source: Option<SharedSource>,
    },

    #[error("Session not found: {key}")]
    NotFound { key: String },

    #[error("Malformed session data in {context}: {details}")]
    MalformedData { context: String, details: String },

    #[error("Invalid session key '{input}': {reason}")]
    InvalidKey { input: String, reason: String },

    #[error("Session storage error: {path}")]
    Storage {
        path: PathBuf,
        #[source]
        source: SharedSource,
    },
}

impl SessionError {
    /// Returns whether a later retry could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::SourceUnavailable { .. } => true,
            SessionError::Storage { .. } => true,
            SessionError::NotFound { .. } => false,
            SessionError::MalformedData { .. } => false,
            SessionError::InvalidKey { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            SessionError::SourceUnavailable { .. } => vec![
                "Retry the request after a short delay",
                "Check connectivity to the timing data source",
                "Increase the source fetch timeout",
            ],
            SessionError::NotFound { .. } => vec![
                "Check the season, event and session type",
                "Verify the session has already taken place",
            ],
            SessionError::MalformedData { .. } => vec![
                "Inspect the upstream records for the reported context",
                "Invalidate the session once the source has been corrected",
            ],
            SessionError::InvalidKey { .. } => vec![
                "Use a session type such as FP1, Qualifying, Sprint or Race",
                "Use an event name or a round number",
            ],
            SessionError::Storage { .. } => vec![
                "Check the cache directory exists and is writable",
                "Ensure sufficient disk space",
            ],
        }
    }

    /// Flat classification used in envelopes and for HTTP status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            SessionError::NotFound { .. } => ErrorKind::NotFound,
            SessionError::MalformedData { .. } => ErrorKind::MalformedData,
            SessionError::InvalidKey { .. } => ErrorKind::InvalidParameters,
            SessionError::Storage { .. } => ErrorKind::Internal,
        }
    }

    /// Helper constructor for an unreachable source.
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        SessionError::SourceUnavailable { reason: reason.into(), source: None }
    }

    /// Helper constructor for an unreachable source with the underlying cause.
    pub fn source_unavailable_with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let source: SharedSource = Arc::new(source);
        SessionError::SourceUnavailable { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for a fetch that exceeded its deadline.
    pub fn timed_out(duration: Duration) -> Self {
        SessionError::SourceUnavailable {
            reason: format!("fetch timed out after {:?}", duration),
            source: None,
        }
    }

    /// Helper constructor for a key with no matching session.
    pub fn not_found(key: impl std::fmt::Display) -> Self {
        SessionError::NotFound { key: key.to_string() }
    }

    /// Helper constructor for structurally invalid records.
    pub fn malformed(context: impl Into<String>, details: impl Into<String>) -> Self {
        SessionError::MalformedData { context: context.into(), details: details.into() }
    }

    /// Helper constructor for unparseable key components.
    pub fn invalid_key(input: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::InvalidKey { input: input.into(), reason: reason.into() }
    }

    /// Helper constructor for disk tier failures.
    pub fn storage(path: PathBuf, source: std::io::Error) -> Self {
        SessionError::Storage { path, source: Arc::new(source) }
    }
}

/// Errors raised by a single analyzer invocation.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnalyzerError {
    #[error("Insufficient data for {analyzer}: {details}")]
    InsufficientData { analyzer: String, details: String },

    #[error("Invalid parameters: {details}")]
    InvalidParameters { details: String },

    #[error("Unknown analyzer '{name}'")]
    UnknownAnalyzer { name: String },

    #[error("Analyzer fault: {details}")]
    Internal { details: String },
}

impl AnalyzerError {
    /// Helper constructor for unmet data preconditions.
    pub fn insufficient(analyzer: impl Into<String>, details: impl Into<String>) -> Self {
        AnalyzerError::InsufficientData { analyzer: analyzer.into(), details: details.into() }
    }

    /// Helper constructor for selectors that do not resolve.
    pub fn invalid_parameters(details: impl Into<String>) -> Self {
        AnalyzerError::InvalidParameters { details: details.into() }
    }

    /// Helper constructor for unregistered analyzer names.
    pub fn unknown(name: impl Into<String>) -> Self {
        AnalyzerError::UnknownAnalyzer { name: name.into() }
    }

    /// Helper constructor for unexpected faults.
    pub fn internal(details: impl Into<String>) -> Self {
        AnalyzerError::Internal { details: details.into() }
    }

    /// Flat classification used in envelopes and for HTTP status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalyzerError::InsufficientData { .. } => ErrorKind::InsufficientData,
            AnalyzerError::InvalidParameters { .. } => ErrorKind::InvalidParameters,
            AnalyzerError::UnknownAnalyzer { .. } => ErrorKind::UnknownAnalyzer,
            AnalyzerError::Internal { .. } => ErrorKind::Internal,
        }
    }
}

/// Serializable error classification shared by both error families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SourceUnavailable,
    NotFound,
    MalformedData,
    InsufficientData,
    InvalidParameters,
    UnknownAnalyzer,
    Internal,
}

impl ErrorKind {
    /// Suggested HTTP status for a request-level error of this kind.
    ///
    /// Analyzer-local failures inside a loaded session are still reported with
    /// a 200 `PartialSuccess` envelope; this mapping applies when the kind is
    /// the reason the whole request failed.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::SourceUnavailable => 503,
            ErrorKind::UnknownAnalyzer | ErrorKind::InvalidParameters => 400,
            ErrorKind::MalformedData => 502,
            ErrorKind::InsufficientData | ErrorKind::Internal => 500,
        }
    }
}

/// Wire form of an error: its kind plus a human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SessionError> for ErrorDetail {
    fn from(err: &SessionError) -> Self {
        ErrorDetail { kind: err.kind(), message: err.to_string() }
    }
}

impl From<&AnalyzerError> for ErrorDetail {
    fn from(err: &AnalyzerError) -> Self {
        ErrorDetail { kind: err.kind(), message: err.to_string() }
    }
}
