//! Centralized error types for the voice orchestrator core library.
//!
//! This module provides a unified error handling system that defines
//! structured error types using `thiserror` and maps them to machine-readable
//! codes for API responses, independent of any particular transport.

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the voice orchestrator.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum VoiceError {
    /// Requested session ID does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Reasoning adapter (upstream provider) failed.
    #[error("Reasoning adapter error: {0}")]
    Reasoning(String),

    /// Knowledge catalog failed to load.
    #[error("Knowledge load error: {0}")]
    KnowledgeLoad(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing or invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VoiceError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::Reasoning(_) => "reasoning_error",
            Self::KnowledgeLoad(_) => "knowledge_load_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

/// Convenient Result alias for library-wide operations.
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors surfaced by the [`crate::reasoning::ReasoningAdapter`] collaborator.
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// The adapter is not connected to the upstream provider.
    #[error("not connected")]
    NotConnected,

    /// The upstream provider rejected or failed a request.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// `commitAudio` was called with less than `MIN_BUFFER_DURATION_MS` buffered.
    #[error("buffer too small")]
    BufferTooSmall,
}

impl ErrorCode for ReasoningError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "reasoning_not_connected",
            Self::Upstream(_) => "reasoning_upstream_error",
            Self::BufferTooSmall => "reasoning_buffer_too_small",
        }
    }
}

impl From<ReasoningError> for VoiceError {
    fn from(err: ReasoningError) -> Self {
        Self::Reasoning(err.to_string())
    }
}

/// Errors surfaced while loading the knowledge catalogs (facts, disclaimers,
/// approved claims) at startup.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// The catalog file could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The catalog file could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<KnowledgeError> for VoiceError {
    fn from(err: KnowledgeError) -> Self {
        Self::KnowledgeLoad(err.to_string())
    }
}
