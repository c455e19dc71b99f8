//! # Evoworld IO
//!
//! Persistence layer for evoworld runs.
//!
//! This crate provides:
//! - Structured error handling with custom error types
//! - JSON and gzip helpers with atomic file writes
//! - Checkpoint files wrapping a serialized world archive

/// Checkpoint save, load and world restore
pub mod checkpoint;
/// Error types and result aliases for I/O operations
pub mod error;
/// Validated serialization helpers for JSON and gzip
pub mod serialization;

pub use checkpoint::{
    load_checkpoint, read_checkpoint_header, restore_world, save_checkpoint, CheckpointHeader,
    SerializePolicy,
};
pub use error::{IoError, Result};
pub use serialization::{from_json, gunzip, gzip, to_json, write_atomic};
