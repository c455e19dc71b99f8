//! Error types for the world core.
//!
//! Attachment conflicts and archive problems are reported through these
//! values; nothing in the core panics on bad input.

use evoworld_data::FacetId;
use thiserror::Error;

/// Why a facet could not be attached to a world.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("facet identifier must not be empty")]
    EmptyIdentifier,

    #[error("facet `{0}` is already attached")]
    Duplicate(FacetId),

    /// The before/after constraints leave no legal position (`min > max`).
    #[error("facet `{id}` has unsatisfiable ordering constraints (window {min}..{max})")]
    Unsatisfiable { id: FacetId, min: usize, max: usize },
}

/// Main error type for facet serialization and restore.
#[derive(Error, Debug)]
pub enum FacetError {
    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Missing archive property `{0}`")]
    MissingProperty(String),

    #[error("Missing archive sub-object `{0}`")]
    MissingSubObject(String),

    #[error("Archive object type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("Unsupported archive version {found} for `{object_type}` (supported up to {supported})")]
    UnsupportedVersion {
        object_type: String,
        found: u32,
        supported: u32,
    },

    #[error("Facet type `{0}` is not registered")]
    UnregisteredType(String),

    #[error("Facet `{0}` does not support serialization")]
    Unsupported(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, FacetError>;

impl FacetError {
    #[must_use]
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    #[must_use]
    pub fn missing_property<S: Into<String>>(key: S) -> Self {
        Self::MissingProperty(key.into())
    }
}
