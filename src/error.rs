//! Crate-wide error type for lab operations.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by lab handles, settings editors and the HTTP transport.
#[derive(Debug, Error)]
pub enum LabError {
    /// A caller-supplied argument was rejected before any request was sent.
    #[error("Invalid argument: {0}")]
    Validation(String),
    /// The feature is not part of `preprocessing.per_feature`.
    #[error("Feature {0} doesn't exist in this ML task")]
    UnknownFeature(String),
    /// The algorithm has no entry in `modeling`.
    #[error("Algorithm {0} doesn't exist in this ML task")]
    UnknownAlgorithm(String),
    /// A key the operation relies on is absent from the server payload.
    #[error("Missing key in payload: {0}")]
    MissingKey(String),
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Server-provided error message, or the raw body.
        message: String,
    },
    /// The request never produced a response.
    #[error("HTTP transport error: {0}")]
    Transport(String),
    /// The response body could not be read or decoded.
    #[error("JSON error: {0}")]
    Json(String),
    /// A polling wait exceeded its deadline.
    #[error("Gave up waiting after {waited:?}")]
    WaitTimeout {
        /// Time spent polling before giving up.
        waited: Duration,
    },
    /// A polling wait was cancelled by the caller.
    #[error("Wait cancelled")]
    Cancelled,
    /// Client configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LabError {
    pub(crate) fn missing(path: impl Into<String>) -> Self {
        Self::MissingKey(path.into())
    }
}

/// Result alias used across the crate.
pub type LabResult<T> = Result<T, LabError>;
