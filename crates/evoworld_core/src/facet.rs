//! The contract every pluggable world subsystem implements.
//!
//! A facet declares at most one "update before" and one "update after"
//! neighbour by identifier, does its per-update work, and writes its state
//! into an archive. Facets are shared (`Arc`) between the world's identifier
//! map, its solved order and the reserved slots, so any mutable state lives
//! behind the facet's own locks.

use crate::archive::Archive;
use crate::context::Context;
use crate::error::Result;
use crate::registry::register_facet_type;
use evoworld_data::{FacetId, Update};
use std::any::Any;
use std::sync::Arc;

/// Shared handle to an attached facet.
pub type FacetPtr = Arc<dyn Facet>;

/// Type-erasure helpers, implemented for every facet automatically.
pub trait AsAny: Any + Send + Sync {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub trait Facet: AsAny {
    /// Type tag written to the facet's archive and used to find its factory.
    fn facet_type(&self) -> &str;

    /// The facet this one must run strictly earlier than, or empty.
    fn update_before(&self) -> FacetId {
        FacetId::empty()
    }

    /// The facet this one must run strictly later than, or empty.
    fn update_after(&self) -> FacetId {
        FacetId::empty()
    }

    /// One update's worth of work. Called exactly once per world update, in
    /// solved order.
    fn perform_update(&self, _ctx: &mut Context, _update: Update) {}

    fn serialize(&self, archive: &mut dyn Archive) -> Result<()>;
}

/// Recovers the concrete type behind a shared facet handle.
pub fn downcast_facet<T: Facet>(facet: &FacetPtr) -> Option<Arc<T>> {
    Arc::clone(facet).into_any_arc().downcast::<T>().ok()
}

/// Type-level side of the contract: a name and a constructor from an archive.
pub trait FacetType: Facet + Sized {
    const TYPE_NAME: &'static str;

    /// Rebuilds a facet, including its internal state, from its archive.
    fn restore(archive: &dyn Archive) -> Result<Self>;

    /// Registers [`FacetType::restore`] with the process-wide registry.
    /// Returns `false` if the name was already taken.
    fn register() -> bool {
        register_facet_type(Self::TYPE_NAME, |archive| {
            Self::restore(archive).map(|facet| Arc::new(facet) as FacetPtr)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;

    struct Marker(u32);

    impl Facet for Marker {
        fn facet_type(&self) -> &str {
            "test.marker"
        }

        fn serialize(&self, archive: &mut dyn Archive) -> Result<()> {
            archive.put("value", i64::from(self.0))
        }
    }

    struct Other;

    impl Facet for Other {
        fn facet_type(&self) -> &str {
            "test.other"
        }

        fn serialize(&self, _archive: &mut dyn Archive) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_constraints_are_empty() {
        let marker = Marker(1);
        assert!(marker.update_before().is_empty());
        assert!(marker.update_after().is_empty());
    }

    #[test]
    fn test_downcast_keeps_instance() {
        let ptr: FacetPtr = Arc::new(Marker(7));
        let marker = downcast_facet::<Marker>(&ptr).unwrap();
        assert_eq!(marker.0, 7);
        assert!(downcast_facet::<Other>(&ptr).is_none());
        assert_eq!(Arc::strong_count(&ptr), 2);
    }

    #[test]
    fn test_serialize_through_trait_object() {
        let ptr: FacetPtr = Arc::new(Marker(3));
        let mut archive = MemoryArchive::new("marker");
        ptr.serialize(&mut archive).unwrap();
        assert_eq!(
            archive.property("value").and_then(|v| v.as_int()),
            Some(3)
        );
    }
}
