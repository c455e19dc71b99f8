//! Core data structures for the evoworld simulation.

pub mod facet_id;
pub mod property;
pub mod update;
