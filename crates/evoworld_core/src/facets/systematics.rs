//! Systematics facet: groups organisms into genotypes by genome sequence.
//!
//! A genotype lives while at least one organism carries it. Extinct genotypes
//! are kept for a retention window so lineages can still be traced, then
//! pruned.

use crate::archive::Archive;
use crate::context::Context;
use crate::error::{FacetError, Result};
use crate::facet::{Facet, FacetType};
use crate::facets::data::Provider;
use evoworld_data::{PropertyValue, Update};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

pub const SYSTEMATICS_TYPE: &str = "core.systematics";
const SYSTEMATICS_VERSION: u32 = 1;

pub const DATA_ACTIVE: &str = "core.systematics.genotypes.active";
pub const DATA_TOTAL: &str = "core.systematics.genotypes.total";
pub const DATA_THRESHOLD: &str = "core.systematics.genotypes.threshold";
pub const DATA_DOMINANT_ABUNDANCE: &str = "core.systematics.dominant.abundance";
pub const DATA_DOMINANT_SEQUENCE: &str = "core.systematics.dominant.sequence";

pub type GenotypeId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genotype {
    pub id: GenotypeId,
    pub sequence: String,
    pub parent: Option<GenotypeId>,
    pub abundance: u64,
    pub births: u64,
    pub deaths: u64,
    pub born_update: i32,
    pub extinct_update: Option<i32>,
    /// Set once abundance has reached the manager's threshold.
    pub threshold: bool,
}

impl Genotype {
    #[must_use]
    pub fn is_extinct(&self) -> bool {
        self.extinct_update.is_some()
    }
}

#[derive(Debug, Default)]
struct Arbiter {
    genotypes: BTreeMap<GenotypeId, Genotype>,
    active_by_sequence: HashMap<String, GenotypeId>,
    next_id: GenotypeId,
    current_update: i32,
}

impl Arbiter {
    fn dominant(&self) -> Option<&Genotype> {
        // lowest id wins ties
        self.genotypes
            .values()
            .filter(|g| !g.is_extinct())
            .fold(None, |best: Option<&Genotype>, g| match best {
                Some(b) if b.abundance >= g.abundance => Some(b),
                _ => Some(g),
            })
    }
}

pub struct SystematicsManager {
    state: Mutex<Arbiter>,
    threshold: u64,
    retention: i32,
}

impl Default for SystematicsManager {
    fn default() -> Self {
        Self::new(3, 100)
    }
}

impl SystematicsManager {
    /// `threshold` is the abundance at which a genotype counts as
    /// established; extinct genotypes are pruned `retention` updates after
    /// their last organism died.
    #[must_use]
    pub fn new(threshold: u64, retention: i32) -> Self {
        Self {
            state: Mutex::new(Arbiter::default()),
            threshold: threshold.max(1),
            retention: retention.max(0),
        }
    }

    /// Records the birth of an organism with genome `sequence` and returns its
    /// genotype. A sequence matching a living genotype joins it; a novel one
    /// founds a new genotype descending from `parent`.
    pub fn classify(&self, sequence: &str, parent: Option<GenotypeId>) -> GenotypeId {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let existing = state.active_by_sequence.get(sequence).copied();
        let id = match existing {
            Some(id) => id,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                let born_update = state.current_update;
                state.genotypes.insert(
                    id,
                    Genotype {
                        id,
                        sequence: sequence.to_string(),
                        parent,
                        abundance: 0,
                        births: 0,
                        deaths: 0,
                        born_update,
                        extinct_update: None,
                        threshold: false,
                    },
                );
                state.active_by_sequence.insert(sequence.to_string(), id);
                tracing::trace!(genotype = id, ?parent, "new genotype");
                id
            }
        };
        if let Some(genotype) = state.genotypes.get_mut(&id) {
            genotype.abundance += 1;
            genotype.births += 1;
            if genotype.abundance >= self.threshold {
                genotype.threshold = true;
            }
        }
        id
    }

    /// Records the death of an organism. Returns `false` for an unknown or
    /// already-extinct genotype.
    pub fn remove_organism(&self, id: GenotypeId) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let update = state.current_update;
        let Some(genotype) = state.genotypes.get_mut(&id) else {
            return false;
        };
        if genotype.is_extinct() || genotype.abundance == 0 {
            return false;
        }
        genotype.abundance -= 1;
        genotype.deaths += 1;
        if genotype.abundance == 0 {
            genotype.extinct_update = Some(update);
            let sequence = genotype.sequence.clone();
            state.active_by_sequence.remove(&sequence);
        }
        true
    }

    /// Drops extinct genotypes whose retention window has passed. Returns the
    /// number removed.
    pub fn prune(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = state.current_update;
        let retention = self.retention;
        let before = state.genotypes.len();
        state.genotypes.retain(|_, g| match g.extinct_update {
            Some(at) => now.saturating_sub(at) <= retention,
            None => true,
        });
        before - state.genotypes.len()
    }

    #[must_use]
    pub fn genotype(&self, id: GenotypeId) -> Option<Genotype> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .genotypes
            .get(&id)
            .cloned()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .active_by_sequence
            .len()
    }

    /// Genotypes ever created, including pruned ones.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).next_id
    }

    #[must_use]
    pub fn threshold_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .genotypes
            .values()
            .filter(|g| g.threshold && !g.is_extinct())
            .count()
    }

    /// Most abundant living genotype.
    #[must_use]
    pub fn dominant(&self) -> Option<Genotype> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .dominant()
            .cloned()
    }

    /// Every retained genotype, extinct ones included, in id order.
    #[must_use]
    pub fn genotypes(&self) -> Vec<Genotype> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .genotypes
            .values()
            .cloned()
            .collect()
    }
}

impl Facet for SystematicsManager {
    fn facet_type(&self) -> &str {
        SYSTEMATICS_TYPE
    }

    fn perform_update(&self, _ctx: &mut Context, update: Update) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .current_update = update.discrete;
        let pruned = self.prune();
        if pruned > 0 {
            tracing::debug!(pruned, update = %update, "pruned extinct genotypes");
        }
    }

    fn serialize(&self, archive: &mut dyn Archive) -> Result<()> {
        archive.set_version(SYSTEMATICS_VERSION);
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        archive.put("threshold", self.threshold)?;
        archive.put("retention", self.retention)?;
        archive.put("next_id", state.next_id)?;
        archive.put("current_update", state.current_update)?;
        archive.put("genotypes", state.genotypes.len())?;
        for genotype in state.genotypes.values() {
            let child = archive.child(&genotype.id.to_string())?;
            child.set_object_type("core.systematics.genotype");
            child.put("sequence", genotype.sequence.as_str())?;
            if let Some(parent) = genotype.parent {
                child.put("parent", parent)?;
            }
            child.put("abundance", genotype.abundance)?;
            child.put("births", genotype.births)?;
            child.put("deaths", genotype.deaths)?;
            child.put("born_update", genotype.born_update)?;
            if let Some(at) = genotype.extinct_update {
                child.put("extinct_update", at)?;
            }
            child.put("threshold", genotype.threshold)?;
        }
        Ok(())
    }
}

fn to_u64(value: i64, key: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| FacetError::archive(format!("`{key}` is negative")))
}

fn to_i32(value: i64, key: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| FacetError::archive(format!("`{key}` is out of range")))
}

impl FacetType for SystematicsManager {
    const TYPE_NAME: &'static str = SYSTEMATICS_TYPE;

    fn restore(archive: &dyn Archive) -> Result<Self> {
        archive.expect_type(SYSTEMATICS_TYPE, SYSTEMATICS_VERSION)?;
        let manager = Self::new(
            to_u64(archive.require_int("threshold")?, "threshold")?,
            to_i32(archive.require_int("retention")?, "retention")?,
        );
        let mut arbiter = Arbiter {
            next_id: to_u64(archive.require_int("next_id")?, "next_id")?,
            current_update: to_i32(archive.require_int("current_update")?, "current_update")?,
            ..Default::default()
        };

        for key in archive.sub_object_ids() {
            let child = archive.require_sub_object(&key)?;
            let id: GenotypeId = key
                .parse()
                .map_err(|_| FacetError::archive(format!("bad genotype id `{key}`")))?;
            let parent = match child.property("parent").and_then(PropertyValue::as_int) {
                Some(p) => Some(to_u64(p, "parent")?),
                None => None,
            };
            let extinct_update = match child
                .property("extinct_update")
                .and_then(PropertyValue::as_int)
            {
                Some(at) => Some(to_i32(at, "extinct_update")?),
                None => None,
            };
            let genotype = Genotype {
                id,
                sequence: child.require_str("sequence")?.to_string(),
                parent,
                abundance: to_u64(child.require_int("abundance")?, "abundance")?,
                births: to_u64(child.require_int("births")?, "births")?,
                deaths: to_u64(child.require_int("deaths")?, "deaths")?,
                born_update: to_i32(child.require_int("born_update")?, "born_update")?,
                extinct_update,
                threshold: child.require("threshold")?.as_bool().unwrap_or(false),
            };
            if !genotype.is_extinct() {
                arbiter
                    .active_by_sequence
                    .insert(genotype.sequence.clone(), id);
            }
            arbiter.genotypes.insert(id, genotype);
        }

        let expected = archive.require_int("genotypes")?;
        if usize::try_from(expected).ok() != Some(arbiter.genotypes.len()) {
            return Err(FacetError::archive(format!(
                "systematics lists {expected} genotypes but archive holds {}",
                arbiter.genotypes.len()
            )));
        }
        *manager.state.lock().unwrap_or_else(|e| e.into_inner()) = arbiter;
        Ok(manager)
    }
}

impl Provider for SystematicsManager {
    fn provides(&self) -> Vec<String> {
        [
            DATA_ACTIVE,
            DATA_TOTAL,
            DATA_THRESHOLD,
            DATA_DOMINANT_ABUNDANCE,
            DATA_DOMINANT_SEQUENCE,
        ]
        .iter()
        .map(|id| (*id).to_string())
        .collect()
    }

    fn provided_value(&self, data_id: &str) -> Option<PropertyValue> {
        match data_id {
            DATA_ACTIVE => Some(self.active_count().into()),
            DATA_TOTAL => Some(self.total_count().into()),
            DATA_THRESHOLD => Some(self.threshold_count().into()),
            DATA_DOMINANT_ABUNDANCE => Some(
                self.dominant()
                    .map_or(PropertyValue::Int(0), |g| g.abundance.into()),
            ),
            DATA_DOMINANT_SEQUENCE => Some(
                self.dominant()
                    .map_or(PropertyValue::Str(String::new()), |g| g.sequence.into()),
            ),
            _ => None,
        }
    }

    fn describe_provided_value(&self, data_id: &str) -> String {
        match data_id {
            DATA_ACTIVE => "Number of living genotypes",
            DATA_TOTAL => "Number of genotypes ever created",
            DATA_THRESHOLD => "Number of living genotypes at or above threshold",
            DATA_DOMINANT_ABUNDANCE => "Abundance of the dominant genotype",
            DATA_DOMINANT_SEQUENCE => "Genome of the dominant genotype",
            _ => "",
        }
        .to_string()
    }

    fn supports_concurrent_update(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;

    #[test]
    fn test_classify_groups_identical_sequences() {
        let sys = SystematicsManager::new(2, 10);
        let a = sys.classify("aaaa", None);
        let b = sys.classify("aaaa", None);
        let c = sys.classify("aaab", Some(a));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(sys.genotype(a).unwrap().abundance, 2);
        assert!(sys.genotype(a).unwrap().threshold);
        assert_eq!(sys.genotype(c).unwrap().parent, Some(a));
        assert_eq!(sys.active_count(), 2);
        assert_eq!(sys.total_count(), 2);
        assert_eq!(sys.threshold_count(), 1);
        assert_eq!(sys.dominant().unwrap().id, a);
    }

    #[test]
    fn test_extinction_and_rebirth() {
        let sys = SystematicsManager::default();
        let a = sys.classify("x", None);
        assert!(sys.remove_organism(a));
        assert!(!sys.remove_organism(a));
        assert!(sys.genotype(a).unwrap().is_extinct());
        assert_eq!(sys.active_count(), 0);

        let again = sys.classify("x", None);
        assert_ne!(again, a);
        assert_eq!(sys.total_count(), 2);
    }

    #[test]
    fn test_prune_after_retention() {
        let sys = SystematicsManager::new(3, 2);
        let mut ctx = Context::default();
        let a = sys.classify("x", None);
        sys.remove_organism(a);
        sys.perform_update(&mut ctx, Update::new(2));
        assert!(sys.genotype(a).is_some());
        sys.perform_update(&mut ctx, Update::new(3));
        assert!(sys.genotype(a).is_none());
        assert_eq!(sys.total_count(), 1);
    }

    #[test]
    fn test_provided_values() {
        let sys = SystematicsManager::default();
        assert_eq!(
            sys.provided_value(DATA_DOMINANT_ABUNDANCE),
            Some(PropertyValue::Int(0))
        );
        sys.classify("gg", None);
        assert_eq!(sys.provided_value(DATA_ACTIVE), Some(PropertyValue::Int(1)));
        assert_eq!(
            sys.provided_value(DATA_DOMINANT_SEQUENCE),
            Some(PropertyValue::Str("gg".to_string()))
        );
        assert_eq!(sys.provided_value("core.other"), None);
    }

    #[test]
    fn test_serialize_restore() {
        let sys = SystematicsManager::new(2, 5);
        let a = sys.classify("aa", None);
        let b = sys.classify("ab", Some(a));
        sys.classify("ab", Some(a));
        sys.remove_organism(a);

        let mut archive = MemoryArchive::new("systematics");
        archive.set_object_type(SYSTEMATICS_TYPE);
        sys.serialize(&mut archive).unwrap();

        let restored = SystematicsManager::restore(&archive).unwrap();
        assert_eq!(restored.genotypes(), sys.genotypes());
        assert_eq!(restored.total_count(), 2);
        assert_eq!(restored.classify("ab", None), b);
        assert_ne!(restored.classify("aa", None), a);
    }
}
