//! Age-sex and social group balancing for the population restorator.
//!
//! Every simulated year the driver asks this crate to bring each cohort to
//! its forecast head-count and then to repair the social group breakdown
//! around the new totals. All reallocation is integer-exact: counts are
//! whole people, and rounding leftovers are settled with an injected random
//! source so that no group is favoured year after year.
//!
//! # Architecture
//!
//! - [`allocation`] -- Largest-remainder apportionment and stochastic scaling.
//! - [`age_sex`] -- Bring one (age, sex) cohort to a target head-count.
//! - [`primary`] -- Force primary groups to partition every cohort exactly.
//! - [`additional`] -- Rescale overlapping groups to the new baselines.
//! - [`conservation`] -- Post-year verification of the snapshot invariants.
//!
//! # Conservation Law
//!
//! For every cohort C resolved in a year:
//!
//! ```text
//! sum(primary group counts in C) == resolved total of C
//! every additional group count in C <= resolved total of C
//! ```
//!
//! A violation produces a [`PopulationAnomaly`]. Balancers never panic; they
//! return errors.
//!
//! # Usage
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use rand::SeedableRng;
//! use rand::rngs::SmallRng;
//! use restorator_balancing::{age_sex, conservation, ConservationResult, YearLedger};
//! use restorator_population::{PopulationStore, Snapshot, SocialGroupCatalog};
//! use restorator_types::{CohortKey, PopulationRow, Sex, SocialGroup, SocialGroupId};
//! use rust_decimal::Decimal;
//!
//! let catalog = SocialGroupCatalog::new([SocialGroup {
//!     id: SocialGroupId::new(1),
//!     name: "everyone".to_owned(),
//!     is_primary: true,
//!     parent: None,
//!     default_share: Decimal::ONE,
//! }])
//! .ok();
//! let mut snapshot = catalog
//!     .and_then(|catalog| {
//!         Snapshot::from_rows(
//!             catalog,
//!             [PopulationRow {
//!                 age: 5,
//!                 sex: Sex::Men,
//!                 social_group_id: SocialGroupId::new(1),
//!                 count: 40,
//!             }],
//!         )
//!         .ok()
//!     })
//!     .unwrap_or_else(|| Snapshot::new(SocialGroupCatalog::default()));
//!
//! let mut rng = SmallRng::seed_from_u64(7);
//! let mut ledger = YearLedger::new();
//! if let Ok(change) = age_sex::balance_year_age_sex(&mut snapshot, 5, Sex::Men, 55, &mut rng) {
//!     ledger.record(change);
//! }
//!
//! assert_eq!(
//!     snapshot.read_cohort(CohortKey::new(5, Sex::Men)).get(&SocialGroupId::new(1)),
//!     Some(&55)
//! );
//! assert_eq!(
//!     conservation::verify_conservation(1, &snapshot, &ledger),
//!     ConservationResult::Balanced
//! );
//! ```

pub mod additional;
pub mod age_sex;
pub mod allocation;
pub mod conservation;
pub mod primary;

// Re-export primary types at crate root.
pub use additional::balance_year_additional_social_groups;
pub use age_sex::balance_year_age_sex;
pub use conservation::ConservationResult;
pub use primary::balance_year_primary_social_groups;

use std::collections::BTreeMap;

use restorator_population::PopulationError;
use restorator_types::{CohortKey, SocialGroupId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while balancing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum BalanceError {
    /// A cohort was asked to reach a negative head-count.
    #[error("cohort {key} cannot be balanced to negative target {needed}")]
    NegativeTarget {
        /// The cohort being balanced.
        key: CohortKey,
        /// The rejected target.
        needed: i64,
    },

    /// The catalog has no primary groups, so a cohort total cannot be
    /// partitioned.
    #[error("no primary social groups to partition cohorts into")]
    NoPrimaryGroups,

    /// Apportionment was asked to split a count over zero total weight.
    #[error("cannot apportion {needed} over groups with zero total weight")]
    EmptyWeights {
        /// The count that could not be split.
        needed: u64,
    },

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// What was being computed.
        context: &'static str,
    },

    /// The underlying store rejected a read or write.
    #[error("population store error: {source}")]
    Population {
        /// The underlying store error.
        #[from]
        source: PopulationError,
    },
}

// ---------------------------------------------------------------------------
// Year ledger
// ---------------------------------------------------------------------------

/// How one cohort's head-count moved during a year's balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CohortChange {
    /// The cohort.
    pub key: CohortKey,
    /// Primary head-count after the age shift, before balancing.
    pub baseline: u64,
    /// Forecast head-count the cohort was brought to.
    pub resolved: u64,
}

/// Every cohort change recorded while resolving one simulated year.
///
/// The age-sex balancer produces the entries; the primary and additional
/// balancers and the conservation check read them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearLedger {
    changes: BTreeMap<CohortKey, CohortChange>,
}

impl YearLedger {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }

    /// Record a cohort change, replacing any earlier entry for the cohort.
    pub fn record(&mut self, change: CohortChange) {
        self.changes.insert(change.key, change);
    }

    /// Look up the change recorded for a cohort.
    pub fn get(&self, key: CohortKey) -> Option<&CohortChange> {
        self.changes.get(&key)
    }

    /// The resolved head-count of a cohort, if it was balanced this year.
    pub fn resolved(&self, key: CohortKey) -> Option<u64> {
        self.changes.get(&key).map(|change| change.resolved)
    }

    /// Iterate over recorded changes in cohort order.
    pub fn iter(&self) -> impl Iterator<Item = &CohortChange> {
        self.changes.values()
    }

    /// Number of recorded cohorts.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A conservation law violation detected after a year was balanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationAnomaly {
    /// Year offset where the anomaly was detected.
    pub year_offset: usize,
    /// Per-cohort mismatch: (`expected_total`, `primary_total`).
    pub imbalances: BTreeMap<CohortKey, (u64, u64)>,
    /// Additional groups whose count exceeds the cohort total:
    /// (`count`, `cohort_total`).
    pub overfull: BTreeMap<(CohortKey, SocialGroupId), (u64, u64)>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for PopulationAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
