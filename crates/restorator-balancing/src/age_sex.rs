//! Age-sex balancing: bring one cohort to its forecast head-count.
//!
//! The cohort's head-count is the sum of its primary group counts. The
//! balancer re-splits the forecast head-count over the primary groups in
//! proportion to their current sizes, so the breakdown survives the change
//! in size. A cohort with no one in it yet (the newborn cohort right after
//! the age shift) has no proportions to preserve and is split by the
//! catalog's default profile instead.
//!
//! Additional group rows are left alone here. They are rescaled once all
//! cohorts are resolved, by [`crate::additional`], using the change
//! recorded in the returned [`CohortChange`].

use rand::Rng;
use tracing::debug;

use restorator_population::{CohortCounts, PopulationStore};
use restorator_types::{CohortKey, Sex};

use crate::allocation::{self, Direction};
use crate::{BalanceError, CohortChange};

/// Bring the cohort `(age, sex)` to exactly `needed` people.
///
/// - `needed == current`: nothing is written, so proportions stay exactly
///   as they were.
/// - `needed == 0`: every row of the cohort, primary and additional, is
///   removed.
/// - `current == 0`: `needed` is split by the catalog's primary default
///   profile.
/// - otherwise `needed` is split over the existing primary counts with
///   [`allocation::apportion`].
///
/// # Errors
///
/// - [`BalanceError::NegativeTarget`] if `needed` is negative.
/// - [`BalanceError::NoPrimaryGroups`] if a new cohort must be split and the
///   catalog has no primary group.
/// - [`BalanceError::Population`] if the cohort holds rows outside the
///   catalog.
pub fn balance_year_age_sex<S, R>(
    store: &mut S,
    age: u32,
    sex: Sex,
    needed: i64,
    rng: &mut R,
) -> Result<CohortChange, BalanceError>
where
    S: PopulationStore + ?Sized,
    R: Rng + ?Sized,
{
    let key = CohortKey::new(age, sex);
    let needed = u64::try_from(needed).map_err(|_err| BalanceError::NegativeTarget { key, needed })?;

    let (primary, additional) = split_cohort(store, key)?;
    let current = primary
        .values()
        .try_fold(0_u64, |acc, count| acc.checked_add(*count))
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "cohort primary total",
        })?;
    let change = CohortChange {
        key,
        baseline: current,
        resolved: needed,
    };

    if needed == current {
        debug!(%key, total = current, "Cohort already at forecast");
        return Ok(change);
    }

    if needed == 0 {
        debug!(%key, removed = current, "Cohort emptied");
        store.write_cohort(key, CohortCounts::new())?;
        return Ok(change);
    }

    let weights = if current == 0 {
        allocation::share_weights(&store.catalog().primary_profile())?
    } else {
        allocation::count_weights(&primary)
    };
    let mut balanced = allocation::apportion(&weights, needed, Direction::of(current, needed), rng)?;
    balanced.extend(additional);
    store.write_cohort(key, balanced)?;

    debug!(%key, from = current, to = needed, "Balanced cohort");
    Ok(change)
}

/// Split a cohort's rows into (primary, additional) counts.
pub(crate) fn split_cohort<S>(
    store: &S,
    key: CohortKey,
) -> Result<(CohortCounts, CohortCounts), BalanceError>
where
    S: PopulationStore + ?Sized,
{
    let catalog = store.catalog();
    let mut primary = CohortCounts::new();
    let mut additional = CohortCounts::new();
    for (id, count) in store.read_cohort(key) {
        if catalog.is_primary(id)? {
            primary.insert(id, count);
        } else {
            additional.insert(id, count);
        }
    }
    Ok((primary, additional))
}
