pub mod biota;
pub mod config {
    pub use evoworld_core::config::*;
}
pub mod facets {
    pub use evoworld_core::facets::*;
}

pub use biota::Biota;

use evoworld_core::facets::ensure_builtin_facet_types;
use evoworld_core::FacetType;
use std::sync::Once;

/// Registers restore factories for the built-in facets and the biota.
pub fn register_facet_types() {
    static REGISTER: Once = Once::new();
    ensure_builtin_facet_types();
    REGISTER.call_once(|| {
        Biota::register();
    });
}
