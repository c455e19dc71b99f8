//! Error types for the evoworld_io crate.
//!
//! Structured error handling for checkpoint encoding, file access and
//! integrity checks.

use evoworld_core::FacetError;
use thiserror::Error;

/// Main error type for evoworld_io operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File system errors
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Stored digest does not match the payload
    #[error("Integrity check failed: expected {expected}, found {found}")]
    Integrity { expected: String, found: String },

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// World or facet serialization/restore errors
    #[error("Facet error: {0}")]
    Facet(#[from] FacetError),

    /// A checkpoint required to be complete was missing facets
    #[error("Incomplete checkpoint: facets failed to serialize: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    /// Generic error with context
    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<IoError>,
    },
}

/// Result type alias for evoworld_io operations.
pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    #[must_use]
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }

    #[must_use]
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    #[must_use]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    #[must_use]
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound(resource.into())
    }

    /// Wraps an error with additional context.
    #[must_use]
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
