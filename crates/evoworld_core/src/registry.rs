//! Process-wide facet-type registry used during checkpoint restore.
//!
//! Each facet type registers a factory under its type tag once; restore looks
//! the tag up in the archive and calls the factory. Names are never
//! overwritten, and the registry lives for the life of the process.

use crate::archive::Archive;
use crate::error::{FacetError, Result};
use crate::facet::FacetPtr;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// Constructor that rebuilds a facet from its archive.
pub type FacetFactory = Arc<dyn Fn(&dyn Archive) -> Result<FacetPtr> + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, FacetFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, FacetFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Records `factory` under `type_name`. Returns `false` when the name is
/// empty or already registered; the existing factory is kept.
pub fn register_facet_type<F>(type_name: &str, factory: F) -> bool
where
    F: Fn(&dyn Archive) -> Result<FacetPtr> + Send + Sync + 'static,
{
    if type_name.is_empty() {
        return false;
    }
    let mut map = registry().write().unwrap_or_else(|e| e.into_inner());
    if map.contains_key(type_name) {
        tracing::debug!(facet_type = type_name, "facet type already registered");
        return false;
    }
    map.insert(type_name.to_string(), Arc::new(factory));
    true
}

#[must_use]
pub fn is_facet_type_registered(type_name: &str) -> bool {
    registry()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .contains_key(type_name)
}

/// Sorted list of every registered type tag.
#[must_use]
pub fn registered_facet_types() -> Vec<String> {
    let mut names: Vec<String> = registry()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Builds a facet from `archive` using the factory registered for its type.
pub fn deserialize_facet(archive: &dyn Archive) -> Result<FacetPtr> {
    let factory = registry()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(archive.object_type())
        .cloned()
        .ok_or_else(|| FacetError::UnregisteredType(archive.object_type().to_string()))?;
    // the lock is released before running facet code
    factory(archive)
}
