//! The world: owner of every attached facet and authority on update order.
//!
//! Facets declare soft ordering constraints by name ("update before X",
//! "update after Y"). Each attach re-runs a positional scan over the current
//! order to find the window the newcomer may occupy, then inserts it at the
//! low end of that window. Only the newcomer's own constraints and the
//! constraints existing facets declare *on the newcomer* are consulted; facets
//! that were placed earlier are never moved. Constraints naming a facet that
//! is not attached yet are ignored until that facet arrives.

use crate::archive::Archive;
use crate::context::Context;
use crate::error::{AttachError, FacetError, Result};
use crate::facet::{downcast_facet, Facet, FacetPtr};
use crate::registry::deserialize_facet;
use evoworld_data::{reserved, FacetId, Update};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub const WORLD_OBJECT_TYPE: &str = "core.world";
pub const WORLD_ARCHIVE_VERSION: u32 = 1;

const COUNT_KEY: &str = "facets.count";
const ATTACH_PREFIX: &str = "attach";
const ORDER_PREFIX: &str = "order";

/// Outcome of [`World::serialize`]. Facets are serialized best-effort: a
/// failing facet is dropped from the archive and listed here.
#[derive(Debug, Default)]
pub struct SerializeReport {
    pub serialized: Vec<FacetId>,
    pub failed: Vec<(FacetId, FacetError)>,
}

impl SerializeReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &FacetId> {
        self.failed.iter().map(|(id, _)| id)
    }
}

/// Outcome of [`World::deserialize`].
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<FacetId>,
    pub skipped: Vec<(FacetId, FacetError)>,
    /// Whether the re-solved order equals the recorded one (restricted to the
    /// facets that were restored).
    pub order_matches: bool,
}

impl RestoreReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Default)]
pub struct World {
    facets: HashMap<FacetId, FacetPtr>,
    order: Vec<(FacetId, FacetPtr)>,
    attach_sequence: Vec<FacetId>,
    data_manager: Option<FacetPtr>,
    environment: Option<FacetPtr>,
    output_manager: Option<FacetPtr>,
    systematics: Option<FacetPtr>,
}

impl World {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `facet` under `id` at a position satisfying every constraint
    /// visible at this moment. On error the world is unchanged.
    pub fn attach_facet(
        &mut self,
        id: impl Into<FacetId>,
        facet: FacetPtr,
    ) -> std::result::Result<(), AttachError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AttachError::EmptyIdentifier);
        }
        if self.facets.contains_key(&id) {
            warn!(facet = %id, "rejected duplicate facet identifier");
            return Err(AttachError::Duplicate(id));
        }

        let (min, max) = self.insertion_window(&id, facet.as_ref());
        if min > max {
            warn!(facet = %id, min, max, "rejected facet with unsatisfiable ordering");
            return Err(AttachError::Unsatisfiable { id, min, max });
        }

        self.order.insert(min, (id.clone(), Arc::clone(&facet)));
        self.attach_sequence.push(id.clone());

        let slot = match id.as_str() {
            reserved::DATA_MANAGER => Some(&mut self.data_manager),
            reserved::ENVIRONMENT => Some(&mut self.environment),
            reserved::OUTPUT_MANAGER => Some(&mut self.output_manager),
            reserved::SYSTEMATICS => Some(&mut self.systematics),
            _ => None,
        };
        if let Some(slot) = slot {
            *slot = Some(Arc::clone(&facet));
        }

        debug!(
            facet = %id,
            facet_type = facet.facet_type(),
            position = min,
            "attached facet"
        );
        self.facets.insert(id, facet);
        Ok(())
    }

    /// Computes the `[min, max]` insertion window for a newcomer.
    fn insertion_window(&self, id: &FacetId, facet: &dyn Facet) -> (usize, usize) {
        let mut min = 0;
        let mut max = self.order.len();

        if let Some(after) = facet.update_after().non_empty() {
            if let Some(p) = self.position(&after) {
                min = p + 1;
            }
        }
        if let Some(before) = facet.update_before().non_empty() {
            if let Some(q) = self.position(&before) {
                max = q;
            }
        }

        for (i, (_, placed)) in self.order.iter().enumerate() {
            if i < max && placed.update_after() == *id {
                max = i;
            }
            // `>=` so that a facet sitting exactly at `min` that must run
            // before the newcomer pushes it past itself.
            if i >= min && placed.update_before() == *id {
                min = i + 1;
            }
        }

        (min, max)
    }

    fn position(&self, id: &FacetId) -> Option<usize> {
        self.order.iter().position(|(placed, _)| placed == id)
    }

    /// Looks a facet up by identifier. A miss is not an error.
    #[must_use]
    pub fn facet(&self, id: &str) -> Option<FacetPtr> {
        self.facets.get(id).cloned()
    }

    /// Looks a facet up and downcasts it to its concrete type.
    #[must_use]
    pub fn facet_as<T: Facet>(&self, id: &str) -> Option<Arc<T>> {
        self.facets.get(id).and_then(downcast_facet::<T>)
    }

    #[must_use]
    pub fn data_manager(&self) -> Option<FacetPtr> {
        self.data_manager.clone()
    }

    #[must_use]
    pub fn environment(&self) -> Option<FacetPtr> {
        self.environment.clone()
    }

    #[must_use]
    pub fn output_manager(&self) -> Option<FacetPtr> {
        self.output_manager.clone()
    }

    #[must_use]
    pub fn systematics(&self) -> Option<FacetPtr> {
        self.systematics.clone()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.facets.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Identifiers in solved execution order.
    #[must_use]
    pub fn update_order(&self) -> Vec<FacetId> {
        self.order.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Every attached identifier, sorted.
    #[must_use]
    pub fn facet_ids(&self) -> Vec<FacetId> {
        let mut ids: Vec<FacetId> = self.facets.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Identifiers in the order they were attached.
    #[must_use]
    pub fn attach_sequence(&self) -> &[FacetId] {
        &self.attach_sequence
    }

    /// Runs every facet's update once, front to back, on the calling thread.
    pub fn perform_update(&self, ctx: &mut Context, update: Update) {
        for (id, facet) in &self.order {
            let _span = tracing::trace_span!("facet_update", facet = %id).entered();
            facet.perform_update(ctx, update);
        }
        trace!(update = %update, facets = self.order.len(), "world update complete");
    }

    /// Writes the world and every facet into `archive`.
    ///
    /// Errors only when the world's own bookkeeping cannot be written. A facet
    /// whose `serialize` fails has its sub-object discarded and is reported in
    /// the returned [`SerializeReport`].
    pub fn serialize(&self, archive: &mut dyn Archive) -> Result<SerializeReport> {
        archive.set_object_type(WORLD_OBJECT_TYPE);
        archive.set_version(WORLD_ARCHIVE_VERSION);
        archive.put(COUNT_KEY, self.order.len())?;
        for (i, id) in self.attach_sequence.iter().enumerate() {
            archive.put(&format!("{ATTACH_PREFIX}.{i}"), id.as_str())?;
        }
        for (i, (id, _)) in self.order.iter().enumerate() {
            archive.put(&format!("{ORDER_PREFIX}.{i}"), id.as_str())?;
        }

        let mut report = SerializeReport::default();
        for id in &self.attach_sequence {
            let Some(facet) = self.facets.get(id) else {
                continue;
            };
            let outcome = match archive.define_sub_object(id.as_str()) {
                Some(child) => {
                    child.set_object_type(facet.facet_type());
                    facet.serialize(child)
                }
                None => Err(FacetError::archive(format!(
                    "sub-object `{id}` already defined"
                ))),
            };
            match outcome {
                Ok(()) => report.serialized.push(id.clone()),
                Err(err) => {
                    warn!(facet = %id, error = %err, "facet serialization failed, skipping");
                    archive.discard_sub_object(id.as_str());
                    report.failed.push((id.clone(), err));
                }
            }
        }
        Ok(report)
    }

    /// Rebuilds a world from an archive written by [`World::serialize`].
    ///
    /// Facets are re-attached in their recorded attach order, so the solver
    /// reproduces the recorded update order. A facet whose type is not
    /// registered, whose factory fails, or whose attach is rejected is skipped
    /// with a warning; the rest of the world is still restored.
    pub fn deserialize(archive: &dyn Archive) -> Result<(World, RestoreReport)> {
        archive.expect_type(WORLD_OBJECT_TYPE, WORLD_ARCHIVE_VERSION)?;

        let count = archive
            .property(COUNT_KEY)
            .and_then(|v| v.as_int())
            .and_then(|n| usize::try_from(n).ok());
        let sequence = count
            .and_then(|n| read_id_list(archive, ATTACH_PREFIX, n))
            .unwrap_or_else(|| {
                archive
                    .sub_object_ids()
                    .into_iter()
                    .map(FacetId::from)
                    .collect()
            });
        let recorded_order = count.and_then(|n| read_id_list(archive, ORDER_PREFIX, n));

        let mut world = World::new();
        let mut report = RestoreReport::default();
        for id in sequence {
            let facet = match archive
                .sub_object(id.as_str())
                .ok_or_else(|| FacetError::MissingSubObject(id.to_string()))
                .and_then(deserialize_facet)
            {
                Ok(facet) => facet,
                Err(err) => {
                    warn!(facet = %id, error = %err, "skipping facet during restore");
                    report.skipped.push((id, err));
                    continue;
                }
            };
            if let Err(err) = world.attach_facet(id.clone(), facet) {
                warn!(facet = %id, error = %err, "restored facet could not be attached");
                report.skipped.push((id, err.into()));
                continue;
            }
            report.restored.push(id);
        }

        let solved = world.update_order();
        report.order_matches = match recorded_order {
            Some(recorded) => {
                let expected: Vec<FacetId> = recorded
                    .into_iter()
                    .filter(|id| world.contains(id.as_str()))
                    .collect();
                expected == solved
            }
            None => true,
        };
        if !report.order_matches {
            warn!(?solved, "restored update order differs from the recorded order");
        }

        info!(
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            "world restored"
        );
        Ok((world, report))
    }
}

fn read_id_list(archive: &dyn Archive, prefix: &str, count: usize) -> Option<Vec<FacetId>> {
    (0..count)
        .map(|i| {
            archive
                .property(&format!("{prefix}.{i}"))
                .and_then(|v| v.as_str())
                .map(FacetId::from)
        })
        .collect()
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("order", &self.update_order())
            .field("attach_sequence", &self.attach_sequence)
            .finish()
    }
}
