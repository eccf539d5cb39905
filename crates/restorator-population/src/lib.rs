//! Population snapshot store for the population restorator.
//!
//! A snapshot is one simulated year of population: head-counts broken down
//! by age, sex, and social group, together with the catalog that says which
//! groups partition the population and which merely annotate it.
//!
//! # Architecture
//!
//! ```text
//! Balancers / Driver
//!     |
//!     +-- PopulationStore (trait)  read_cohort / write_cohort / age_shift / total
//!             |
//!             +-- Snapshot         in-memory cohort table + SocialGroupCatalog
//!                     |
//!                     +-- JSON     { "social_groups": [...], "rows": [...] }
//! ```
//!
//! # Modules
//!
//! - [`catalog`] -- [`SocialGroupCatalog`]: validated set of social groups
//! - [`store`] -- [`PopulationStore`]: the contract the engine consumes
//! - [`snapshot`] -- [`Snapshot`]: in-memory store and its JSON form
//! - [`error`] -- Shared error types

pub mod catalog;
pub mod error;
pub mod snapshot;
pub mod store;

// Re-export primary types for convenience.
pub use catalog::SocialGroupCatalog;
pub use error::PopulationError;
pub use snapshot::{Snapshot, SnapshotFile};
pub use store::{CohortCounts, PopulationStore};
