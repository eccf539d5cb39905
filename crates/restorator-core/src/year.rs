//! Resolution of one simulated year.
//!
//! Each year runs through these phases:
//!
//! 1. **Clone** -- copy the previous resolved snapshot. The copy is owned
//!    here until the year resolves, so no caller ever sees it half-built.
//! 2. **Age shift** -- everyone becomes one year older. The newborn cohort
//!    must be populated beforehand and empty afterwards; cohorts past the
//!    oldest starting age are dropped.
//! 3. **Age-sex balancing** -- every forecast cohort is brought to its
//!    target, ages ascending, men before women. Each change is recorded in
//!    the [`YearLedger`].
//! 4. **Primary balancing** -- primary groups are forced to partition every
//!    cohort.
//! 5. **Additional balancing** -- overlapping groups follow their cohorts.
//! 6. **Conservation** -- the resolved snapshot is checked against the
//!    ledger.
//! 7. **Summary** -- head-counts by sex and additional memberships.

use rand::RngCore;
use serde::Serialize;
use tracing::{debug, error, info};

use restorator_balancing::conservation::{self, ConservationResult};
use restorator_balancing::{
    BalanceError, YearLedger, balance_year_additional_social_groups, balance_year_age_sex,
    balance_year_primary_social_groups,
};
use restorator_population::PopulationStore;
use restorator_types::{GroupFilter, Sex};

use crate::driver::DriverError;
use crate::forecast::ForecastedAges;

/// Summary of one resolved year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearSummary {
    /// Forecast row the year was resolved against (1 for the first
    /// simulated year).
    pub year_offset: usize,
    /// Calendar year, when the slot carries one.
    pub year: Option<i32>,
    /// Men across all primary groups.
    pub men: u64,
    /// Women across all primary groups.
    pub women: u64,
    /// Memberships across all additional groups, both sexes.
    pub additional: u64,
    /// Cohorts brought to a forecast target.
    pub cohorts_balanced: usize,
    /// Cohorts the primary pass had to repair.
    pub cohorts_repaired: usize,
}

/// Resolve the year at `year_offset` from its predecessor.
///
/// `max_age` is the oldest age kept after the age shift.
///
/// # Errors
///
/// - [`DriverError::Consistency`] if the newborn cohort is empty before the
///   shift or populated after it, a forecast target is negative or
///   missing, or the conservation check fails.
/// - [`DriverError::Balance`] if a balancer fails.
/// - [`DriverError::Population`] if the store rejects an operation.
pub fn resolve_year<S>(
    previous: &S,
    year_offset: usize,
    year: Option<i32>,
    forecast: &ForecastedAges,
    max_age: u32,
    rng: &mut dyn RngCore,
) -> Result<(S, YearSummary), DriverError>
where
    S: PopulationStore + Clone,
{
    // --- Phase 1: Clone ---
    debug!(year_offset, "Cloning year 0+{year_offset}");
    let mut store = previous.clone();

    // --- Phase 2: Age shift ---
    if store.age_total(0)? == 0 {
        return Err(DriverError::Consistency {
            year_offset,
            reason: String::from("age 0 cohort is empty before the age shift"),
        });
    }
    store.age_shift(1, max_age)?;
    if store.age_total(0)? != 0 {
        return Err(DriverError::Consistency {
            year_offset,
            reason: String::from("age 0 cohort is still populated after the age shift"),
        });
    }
    debug!(year_offset, max_age, "Age shift applied");

    // --- Phase 3: Age-sex balancing ---
    let mut ledger = YearLedger::new();
    for age in forecast.ages() {
        for sex in Sex::ALL {
            let needed =
                forecast
                    .target(year_offset, *age, sex)
                    .map_err(|err| DriverError::Consistency {
                        year_offset,
                        reason: err.to_string(),
                    })?;
            let change = balance_year_age_sex(&mut store, *age, sex, needed, &mut *rng)
                .map_err(|err| balance_error(year_offset, err))?;
            ledger.record(change);
        }
    }
    debug!(year_offset, cohorts = ledger.len(), "Age-sex balancing complete");

    // --- Phase 4: Primary balancing ---
    let cohorts_repaired = balance_year_primary_social_groups(&mut store, &ledger, &mut *rng)
        .map_err(|err| balance_error(year_offset, err))?;

    // --- Phase 5: Additional balancing ---
    balance_year_additional_social_groups(&mut store, &ledger, &mut *rng)
        .map_err(|err| balance_error(year_offset, err))?;

    // --- Phase 6: Conservation ---
    if let ConservationResult::Anomaly(anomaly) =
        conservation::verify_conservation(year_offset, &store, &ledger)
    {
        error!(
            year_offset,
            imbalances = anomaly.imbalances.len(),
            overfull = anomaly.overfull.len(),
            "{anomaly}"
        );
        return Err(DriverError::Consistency {
            year_offset,
            reason: anomaly.message,
        });
    }

    // --- Phase 7: Summary ---
    let primary = store.total(GroupFilter::Primary)?;
    let additional = store
        .total(GroupFilter::Additional)?
        .combined()
        .ok_or(DriverError::Consistency {
            year_offset,
            reason: String::from("additional membership total overflows"),
        })?;
    let summary = YearSummary {
        year_offset,
        year,
        men: primary.men,
        women: primary.women,
        additional,
        cohorts_balanced: ledger.len(),
        cohorts_repaired,
    };
    info!(
        year_offset,
        year = ?summary.year,
        men = summary.men,
        women = summary.women,
        additional = summary.additional,
        cohorts_repaired,
        "Year resolved"
    );

    Ok((store, summary))
}

/// Negative targets are faults of the forecast; everything else is a
/// balancer failure.
fn balance_error(year_offset: usize, err: BalanceError) -> DriverError {
    match err {
        BalanceError::NegativeTarget { .. } => DriverError::Consistency {
            year_offset,
            reason: err.to_string(),
        },
        other => DriverError::Balance {
            year_offset,
            source: other,
        },
    }
}
