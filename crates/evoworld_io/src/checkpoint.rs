//! Checkpoint files.
//!
//! A checkpoint is a gzip stream holding two lines: a JSON [`CheckpointHeader`]
//! and the compact JSON of the world's [`MemoryArchive`]. The header carries a
//! SHA-256 digest of the exact archive bytes, checked on load. Files are
//! written atomically.

use crate::error::{IoError, Result};
use crate::serialization::{from_json, gunzip, gzip, to_json, write_atomic};
use chrono::{DateTime, Utc};
use evoworld_core::facets::ensure_builtin_facet_types;
use evoworld_core::{MemoryArchive, RestoreReport, World};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

pub const CHECKPOINT_FORMAT: &str = "evoworld-checkpoint";
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// What to do when some facets fail to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializePolicy {
    /// Write whatever serialized; failed facets are listed in the header.
    #[default]
    BestEffort,
    /// Refuse to write a checkpoint missing any facet.
    RequireComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub format: String,
    pub format_version: u32,
    pub run_id: Uuid,
    pub update: i32,
    pub created_at: DateTime<Utc>,
    /// Facets present in the archive, in attach order.
    pub facets: Vec<String>,
    /// Facets that failed to serialize and are absent from the archive.
    #[serde(default)]
    pub failed: Vec<String>,
    /// Hex SHA-256 of the archive JSON.
    pub digest: String,
}

impl CheckpointHeader {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Serializes `world` and writes it to `path`.
pub fn save_checkpoint<P: AsRef<Path>>(
    world: &World,
    path: P,
    run_id: Uuid,
    update: i32,
    policy: SerializePolicy,
) -> Result<CheckpointHeader> {
    let path = path.as_ref();
    let mut archive = MemoryArchive::new("world");
    let report = world.serialize(&mut archive)?;

    let failed: Vec<String> = report.failed_ids().map(|id| id.to_string()).collect();
    if policy == SerializePolicy::RequireComplete && !failed.is_empty() {
        return Err(IoError::Incomplete(failed));
    }
    if !failed.is_empty() {
        tracing::warn!(?failed, "writing checkpoint without some facets");
    }

    let body = to_json(&archive)?;
    let header = CheckpointHeader {
        format: CHECKPOINT_FORMAT.to_string(),
        format_version: CHECKPOINT_FORMAT_VERSION,
        run_id,
        update,
        created_at: Utc::now(),
        facets: report.serialized.iter().map(|id| id.to_string()).collect(),
        failed,
        digest: digest(body.as_bytes()),
    };

    let mut payload = to_json(&header)?;
    payload.push('\n');
    payload.push_str(&body);
    write_atomic(path, &gzip(payload.as_bytes())?)
        .map_err(|e| e.with_context(format!("saving checkpoint {:?}", path)))?;

    tracing::debug!(path = ?path, update, facets = header.facets.len(), "checkpoint saved");
    Ok(header)
}

fn read_payload(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(IoError::not_found(path.display().to_string()));
    }
    let raw = std::fs::read(path)?;
    let bytes = gunzip(&raw).map_err(|e| e.with_context(format!("reading {:?}", path)))?;
    String::from_utf8(bytes)
        .map_err(|e| IoError::validation(format!("checkpoint is not UTF-8: {}", e)))
}

fn split_payload(payload: &str) -> Result<(CheckpointHeader, &str)> {
    let (head, body) = payload
        .split_once('\n')
        .ok_or_else(|| IoError::validation("checkpoint has no archive section"))?;
    let header: CheckpointHeader = from_json(head)?;
    if header.format != CHECKPOINT_FORMAT {
        return Err(IoError::validation(format!(
            "unknown checkpoint format `{}`",
            header.format
        )));
    }
    if header.format_version > CHECKPOINT_FORMAT_VERSION {
        return Err(IoError::validation(format!(
            "checkpoint format version {} is newer than supported {}",
            header.format_version, CHECKPOINT_FORMAT_VERSION
        )));
    }
    Ok((header, body))
}

/// Reads only the header; the digest is not checked.
pub fn read_checkpoint_header<P: AsRef<Path>>(path: P) -> Result<CheckpointHeader> {
    let payload = read_payload(path.as_ref())?;
    split_payload(&payload).map(|(header, _)| header)
}

/// Reads a checkpoint and verifies its digest.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<(CheckpointHeader, MemoryArchive)> {
    let payload = read_payload(path.as_ref())?;
    let (header, body) = split_payload(&payload)?;
    let found = digest(body.as_bytes());
    if found != header.digest {
        return Err(IoError::Integrity {
            expected: header.digest,
            found,
        });
    }
    let archive: MemoryArchive = from_json(body)?;
    Ok((header, archive))
}

/// Loads a checkpoint and rebuilds its world. The built-in facet types are
/// registered first; application facet types must already be registered.
pub fn restore_world<P: AsRef<Path>>(path: P) -> Result<(CheckpointHeader, World, RestoreReport)> {
    ensure_builtin_facet_types();
    let (header, archive) = load_checkpoint(path)?;
    let (world, report) = World::deserialize(&archive)?;
    Ok((header, world, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use evoworld_core::facets::{EnvironmentManager, SystematicsManager};
    use evoworld_core::{reserved, Archive, Facet};
    use std::sync::Arc;

    struct Broken;

    impl Facet for Broken {
        fn facet_type(&self) -> &str {
            "test.io.broken"
        }

        fn serialize(&self, archive: &mut dyn Archive) -> evoworld_core::Result<()> {
            archive.put("partial", 1i64)?;
            Err(evoworld_core::FacetError::Unsupported("broken".into()))
        }
    }

    fn sample_world() -> World {
        let mut world = World::new();
        let env = Arc::new(EnvironmentManager::new());
        env.define_resource("glucose", 12.5, 1.0, 0.1);
        let sys = Arc::new(SystematicsManager::default());
        sys.classify("abc", None);
        world.attach_facet(reserved::ENVIRONMENT, env).unwrap();
        world.attach_facet(reserved::SYSTEMATICS, sys).unwrap();
        world
    }

    #[test]
    fn test_save_load_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.ckpt");
        let run_id = Uuid::new_v4();
        let header =
            save_checkpoint(&sample_world(), &path, run_id, 7, SerializePolicy::BestEffort)
                .unwrap();
        assert!(header.is_complete());
        assert_eq!(header.facets, vec!["environment", "systematics"]);

        let read = read_checkpoint_header(&path).unwrap();
        assert_eq!(read, header);

        let (_, archive) = load_checkpoint(&path).unwrap();
        assert_eq!(archive.object_type(), "core.world");

        let (loaded, world, report) = restore_world(&path).unwrap();
        assert_eq!(loaded.run_id, run_id);
        assert_eq!(loaded.update, 7);
        assert!(report.is_complete());
        assert!(report.order_matches);
        let env = world
            .facet_as::<EnvironmentManager>(reserved::ENVIRONMENT)
            .unwrap();
        assert_eq!(env.amount("glucose"), Some(12.5));
        assert!(world.systematics().is_some());
    }

    #[test]
    fn test_policy_controls_incomplete_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = sample_world();
        world.attach_facet("broken", Arc::new(Broken)).unwrap();

        let strict = dir.path().join("strict.ckpt");
        let err = save_checkpoint(
            &world,
            &strict,
            Uuid::new_v4(),
            1,
            SerializePolicy::RequireComplete,
        )
        .unwrap_err();
        assert!(matches!(err, IoError::Incomplete(ref ids) if ids == &["broken".to_string()]));
        assert!(!strict.exists());

        let lenient = dir.path().join("lenient.ckpt");
        let header =
            save_checkpoint(&world, &lenient, Uuid::new_v4(), 1, SerializePolicy::BestEffort)
                .unwrap();
        assert_eq!(header.failed, vec!["broken"]);
        let (_, archive) = load_checkpoint(&lenient).unwrap();
        assert!(archive.sub_object("broken").is_none());
        assert_eq!(archive.sub_object_ids().len(), 2);
    }

    #[test]
    fn test_tampered_body_fails_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.ckpt");
        save_checkpoint(
            &sample_world(),
            &path,
            Uuid::new_v4(),
            0,
            SerializePolicy::BestEffort,
        )
        .unwrap();

        let payload = String::from_utf8(gunzip(&std::fs::read(&path).unwrap()).unwrap()).unwrap();
        let tampered = payload.replace("glucose", "fructose");
        std::fs::write(&path, gzip(tampered.as_bytes()).unwrap()).unwrap();

        assert!(matches!(
            load_checkpoint(&path),
            Err(IoError::Integrity { .. })
        ));
        assert!(read_checkpoint_header(&path).is_ok());
    }

    #[test]
    fn test_missing_and_garbage_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_checkpoint(dir.path().join("absent.ckpt")),
            Err(IoError::NotFound(_))
        ));

        let garbage = dir.path().join("garbage.ckpt");
        std::fs::write(&garbage, gzip(b"no newline here").unwrap()).unwrap();
        assert!(matches!(
            load_checkpoint(&garbage),
            Err(IoError::Validation(_))
        ));
    }
}
