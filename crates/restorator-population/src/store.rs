//! The population store contract consumed by the balancing engine.
//!
//! The engine never reaches into a snapshot's representation. Everything
//! it needs -- reading and replacing one cohort, relabelling ages, and
//! computing aggregates -- goes through [`PopulationStore`]. Cloning a
//! store into the next year's slot is expressed by the `Clone` bound the
//! driver places on it.

use std::collections::BTreeMap;

use restorator_types::{CohortKey, GroupFilter, SexTotals, SocialGroupId};

use crate::catalog::SocialGroupCatalog;
use crate::error::PopulationError;

/// Head-count per social group within one cohort.
pub type CohortCounts = BTreeMap<SocialGroupId, u64>;

/// A tabular store of one population snapshot.
pub trait PopulationStore {
    /// The social group catalog the snapshot is partitioned by.
    fn catalog(&self) -> &SocialGroupCatalog;

    /// All cohorts that currently hold at least one row, in ascending order.
    fn cohort_keys(&self) -> Vec<CohortKey>;

    /// Read the per-group counts of one cohort. Missing cohorts read as empty.
    fn read_cohort(&self, key: CohortKey) -> CohortCounts;

    /// Replace every row of one cohort with `counts`.
    ///
    /// Zero counts are not stored; writing an empty (or all-zero) mapping
    /// removes the cohort.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::UnknownSocialGroup`] if a key of `counts`
    /// is not in the catalog. The store is left unchanged on error.
    fn write_cohort(&mut self, key: CohortKey, counts: CohortCounts)
    -> Result<(), PopulationError>;

    /// Add `delta` to every cohort's age, then discard cohorts older than
    /// `max_age`.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::ArithmeticOverflow`] if an age overflows.
    fn age_shift(&mut self, delta: u32, max_age: u32) -> Result<(), PopulationError>;

    /// Sum counts over the groups selected by `filter`, split by sex.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::ArithmeticOverflow`] if the sum overflows.
    fn total(&self, filter: GroupFilter) -> Result<SexTotals, PopulationError>;

    /// Sum of every row (primary and additional, both sexes) at one age.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::ArithmeticOverflow`] if the sum overflows.
    fn age_total(&self, age: u32) -> Result<u64, PopulationError>;

    /// The oldest age holding any row, or `None` for an empty store.
    fn max_age(&self) -> Option<u32>;

    /// Sum one cohort's counts over the groups selected by `filter`.
    ///
    /// For [`GroupFilter::Primary`] this is the cohort's head-count.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::UnknownSocialGroup`] for rows outside the
    /// catalog, or [`PopulationError::ArithmeticOverflow`].
    fn cohort_total(&self, key: CohortKey, filter: GroupFilter) -> Result<u64, PopulationError> {
        let catalog = self.catalog();
        let mut total: u64 = 0;
        for (id, count) in self.read_cohort(key) {
            if filter.accepts(catalog.is_primary(id)?) {
                total = total
                    .checked_add(count)
                    .ok_or(PopulationError::ArithmeticOverflow {
                        context: "cohort total",
                    })?;
            }
        }
        Ok(total)
    }
}
