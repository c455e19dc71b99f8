//! Serialization utilities with robust error handling.
//!
//! JSON encoding of archives and other serde values, gzip framing, and
//! atomic file writes.

use crate::error::{IoError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Serializes data to compact JSON.
pub fn to_json<T>(data: &T) -> Result<String>
where
    T: Serialize,
{
    serde_json::to_string(data)
        .map_err(|e| IoError::serialization(format!("JSON serialization failed: {}", e)))
}

/// Deserializes data from a JSON string. Empty input is a validation error.
pub fn from_json<T>(json: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    if json.trim().is_empty() {
        return Err(IoError::validation("Empty JSON string"));
    }

    serde_json::from_str(json)
        .map_err(|e| IoError::serialization(format!("JSON deserialization failed: {}", e)))
}

/// Gzip-compresses `bytes`.
pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| IoError::compression(format!("gzip write failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| IoError::compression(format!("gzip finish failed: {}", e)))
}

/// Decompresses a gzip stream.
pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| IoError::compression(format!("gzip read failed: {}", e)))?;
    Ok(out)
}

/// Writes `bytes` to a sibling temp file, then renames it over `path`, so a
/// reader never observes a half-written file.
pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let result = write_then_rename(&tmp_path, path, bytes);
    if result.is_err() && tmp_path.exists() {
        if let Err(e) = std::fs::remove_file(&tmp_path) {
            tracing::warn!(path = ?tmp_path, error = %e, "failed to remove temp file");
        }
    }
    result
}

fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    {
        let file = File::create(tmp_path).map_err(|e| {
            IoError::FileSystem(e).with_context(format!("creating {:?}", tmp_path))
        })?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
    }
    std::fs::rename(tmp_path, path)
        .map_err(|e| IoError::FileSystem(e).with_context(format!("renaming to {:?}", path)))?;
    Ok(())
}
