//! # Evoworld Core
//!
//! The world container of an artificial-life simulation and the facets that
//! plug into it.
//!
//! A [`World`] owns a set of named facets (data manager, environment, output
//! manager, systematics and any others the application adds), solves an
//! execution order from the soft "update before"/"update after" constraints
//! each facet declares, runs them once per update in that order, and
//! serializes itself and every facet into a hierarchical [`Archive`].
//!
//! ## Example
//!
//! ```
//! use evoworld_core::facets::EnvironmentManager;
//! use evoworld_core::{Context, World};
//! use evoworld_data::{reserved, Update};
//! use std::sync::Arc;
//!
//! let mut world = World::new();
//! let env = Arc::new(EnvironmentManager::new());
//! env.define_resource("glucose", 100.0, 5.0, 0.0);
//! world.attach_facet(reserved::ENVIRONMENT, env.clone()).unwrap();
//!
//! let mut ctx = Context::new(42);
//! world.perform_update(&mut ctx, Update::new(0));
//! assert_eq!(env.amount("glucose"), Some(105.0));
//! ```

/// Hierarchical archives and the in-memory backend
pub mod archive;
/// Configuration management for world runs
pub mod config;
/// Per-update context: random stream and diagnostics
pub mod context;
/// Error types for attach, serialize and restore
pub mod error;
/// The facet contract
pub mod facet;
/// Reference facets for the reserved slots
pub mod facets;
/// Run metrics and logging setup
pub mod metrics;
/// Process-wide facet-type registry
pub mod registry;
/// The world container and its update-order solver
pub mod world;

pub use archive::{Archive, MemoryArchive};
pub use context::{Context, Feedback};
pub use error::{AttachError, FacetError, Result};
pub use evoworld_data::{reserved, FacetId, PropertyValue, Update};
pub use facet::{downcast_facet, Facet, FacetPtr, FacetType};
pub use metrics::{init_logging, Metrics};
pub use registry::{deserialize_facet, register_facet_type};
pub use world::{RestoreReport, SerializeReport, World, WORLD_ARCHIVE_VERSION, WORLD_OBJECT_TYPE};
