//! Shared type definitions for the population restorator.
//!
//! This crate is the single source of truth for the vocabulary used across
//! the workspace: sexes, social group identifiers and descriptors, cohort
//! keys, and the flat row format a population snapshot is stored as.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe integer wrappers for identifiers
//! - [`enums`] -- Enumeration types (sex, group filters)
//! - [`structs`] -- Social groups, cohort keys, rows, and aggregate totals

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{GroupFilter, Sex};
pub use ids::SocialGroupId;
pub use structs::{CohortKey, PopulationRow, SexTotals, SocialGroup};
