//! Reference facets filling the world's reserved slots.

pub mod data;
pub mod environment;
pub mod output;
pub mod systematics;

pub use data::{
    data_manager_of, DataError, DataFileRecorder, DataManager, Provider, ProviderPtr, Recorder,
    RecorderPtr, TimeSeriesRecorder,
};
pub use environment::EnvironmentManager;
pub use output::{OutputFile, OutputManager};
pub use systematics::{Genotype, GenotypeId, SystematicsManager};

use crate::facet::FacetType;
use crate::world::World;
use evoworld_data::reserved;
use std::sync::{Arc, Once};

/// Registers restore factories for every facet in this module. Safe to call
/// any number of times.
pub fn ensure_builtin_facet_types() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        DataManager::register();
        EnvironmentManager::register();
        OutputManager::register();
        SystematicsManager::register();
    });
}

#[must_use]
pub fn environment_of(world: &World) -> Option<Arc<EnvironmentManager>> {
    world.facet_as::<EnvironmentManager>(reserved::ENVIRONMENT)
}

#[must_use]
pub fn output_manager_of(world: &World) -> Option<Arc<OutputManager>> {
    world.facet_as::<OutputManager>(reserved::OUTPUT_MANAGER)
}

#[must_use]
pub fn systematics_of(world: &World) -> Option<Arc<SystematicsManager>> {
    world.facet_as::<SystematicsManager>(reserved::SYSTEMATICS)
}
