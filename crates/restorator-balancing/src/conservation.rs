//! Conservation law verification for a balanced year.
//!
//! Balancing moves people between groups and resizes cohorts, but it must
//! never lose track of anyone. Once a year has been resolved, every cohort
//! recorded in the [`YearLedger`] must have a primary head-count equal to
//! its resolved total, and no additional group anywhere in the snapshot may
//! hold more people than its cohort:
//!
//! ```text
//! sum(primary counts in C) == ledger.resolved(C)
//! count(additional group G in C) <= sum(primary counts in C)
//! ```
//!
//! The balancers guarantee both by construction. A violation means a bug or
//! a corrupted store and is reported as a [`PopulationAnomaly`].

use std::collections::{BTreeMap, BTreeSet};

use restorator_population::PopulationStore;
use restorator_types::{CohortKey, SocialGroupId};

use crate::{PopulationAnomaly, YearLedger};

/// The result of a conservation check for a single year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConservationResult {
    /// Every cohort satisfies the conservation law.
    Balanced,
    /// One or more cohorts are inconsistent.
    Anomaly(PopulationAnomaly),
}

/// Verify the conservation law for the snapshot of one resolved year.
pub fn verify_conservation<S>(
    year_offset: usize,
    store: &S,
    ledger: &YearLedger,
) -> ConservationResult
where
    S: PopulationStore + ?Sized,
{
    let catalog = store.catalog();
    let keys: BTreeSet<CohortKey> = store
        .cohort_keys()
        .into_iter()
        .chain(ledger.iter().map(|change| change.key))
        .collect();

    let mut imbalances: BTreeMap<CohortKey, (u64, u64)> = BTreeMap::new();
    let mut overfull: BTreeMap<(CohortKey, SocialGroupId), (u64, u64)> = BTreeMap::new();

    for key in keys {
        let counts = store.read_cohort(key);

        let mut primary_total: u64 = 0;
        for (id, count) in &counts {
            match catalog.is_primary(*id) {
                Ok(true) => {
                    primary_total = match primary_total.checked_add(*count) {
                        Some(val) => val,
                        None => return overflow_anomaly(year_offset, key),
                    };
                }
                Ok(false) => {}
                Err(_) => return unknown_group_anomaly(year_offset, key, *id),
            }
        }

        if let Some(expected) = ledger.resolved(key) {
            if expected != primary_total {
                imbalances.insert(key, (expected, primary_total));
            }
        }

        for (id, count) in &counts {
            if matches!(catalog.is_primary(*id), Ok(false)) && *count > primary_total {
                overfull.insert((key, *id), (*count, primary_total));
            }
        }
    }

    if imbalances.is_empty() && overfull.is_empty() {
        ConservationResult::Balanced
    } else {
        let cohorts = imbalances.len();
        let groups = overfull.len();
        ConservationResult::Anomaly(PopulationAnomaly {
            year_offset,
            imbalances,
            overfull,
            message: format!(
                "POPULATION_ANOMALY at year offset {year_offset}: {cohorts} cohort total(s) \
                 mismatched, {groups} additional group(s) exceed their cohort",
            ),
        })
    }
}

/// Construct an anomaly result for arithmetic overflow during summation.
fn overflow_anomaly(year_offset: usize, key: CohortKey) -> ConservationResult {
    let mut imbalances = BTreeMap::new();
    imbalances.insert(key, (0, 0));
    ConservationResult::Anomaly(PopulationAnomaly {
        year_offset,
        imbalances,
        overfull: BTreeMap::new(),
        message: format!(
            "POPULATION_ANOMALY at year offset {year_offset}: arithmetic overflow while summing cohort {key}",
        ),
    })
}

/// Construct an anomaly result for a row outside the catalog.
fn unknown_group_anomaly(
    year_offset: usize,
    key: CohortKey,
    id: SocialGroupId,
) -> ConservationResult {
    let mut imbalances = BTreeMap::new();
    imbalances.insert(key, (0, 0));
    ConservationResult::Anomaly(PopulationAnomaly {
        year_offset,
        imbalances,
        overfull: BTreeMap::new(),
        message: format!(
            "POPULATION_ANOMALY at year offset {year_offset}: cohort {key} holds unknown social group {id}",
        ),
    })
}
