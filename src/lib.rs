//! # Evoworld
//!
//! Headless evolving-population simulation built on `evoworld_core`.
//!
//! - [`model`] holds the biota facet and re-exports the core configuration
//!   and reference facets.
//! - [`app`] assembles worlds, drives updates and writes checkpoints.

pub mod app;
pub mod model;

pub use app::Simulation;
