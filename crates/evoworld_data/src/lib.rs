//! # Evoworld Data
//!
//! Plain data shared by every evoworld crate: facet identifiers, the reserved
//! identifier set, the update clock value and typed archive properties.
//! Nothing in here knows about facets or worlds; it only describes values.

pub mod data;

pub use data::facet_id::{reserved, FacetId};
pub use data::property::PropertyValue;
pub use data::update::Update;
