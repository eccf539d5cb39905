//! Error types for the population store.
//!
//! All fallible operations in this crate return [`PopulationError`].

use restorator_types::{CohortKey, SocialGroupId};

/// Errors that can occur while building, reading, or updating a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PopulationError {
    /// A row or cohort references a group that is not in the catalog.
    #[error("unknown social group: {0}")]
    UnknownSocialGroup(SocialGroupId),

    /// Two catalog entries share the same id.
    #[error("duplicate social group id: {0}")]
    DuplicateSocialGroup(SocialGroupId),

    /// A group names a parent that is not in the catalog, or itself.
    #[error("social group {group} has invalid parent {parent}")]
    InvalidParent {
        /// The group declaring the parent.
        group: SocialGroupId,
        /// The parent reference.
        parent: SocialGroupId,
    },

    /// A default share is negative.
    #[error("social group {0} has a negative default share")]
    NegativeShare(SocialGroupId),

    /// The catalog defines no primary groups, so cohorts cannot be
    /// partitioned.
    #[error("social group catalog defines no primary groups")]
    NoPrimaryGroups,

    /// The same (cohort, group) pair appears more than once in the input rows.
    #[error("duplicate row for cohort {key} and social group {group}")]
    DuplicateRow {
        /// The cohort of the duplicated row.
        key: CohortKey,
        /// The social group of the duplicated row.
        group: SocialGroupId,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// What was being computed.
        context: &'static str,
    },

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a snapshot file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
