//! Primary social group balancing.
//!
//! Primary groups partition every cohort: each person is in exactly one.
//! After the age-sex pass every forecast cohort already satisfies this, but
//! cohorts the forecast does not cover, cohorts whose primary rows went
//! missing upstream, and cohorts carried in from an inconsistent starting
//! snapshot may not. This pass walks the whole snapshot once and
//! re-apportions any cohort whose primary counts do not add up to its
//! resolved total.

use std::collections::BTreeSet;

use rand::Rng;
use tracing::{debug, warn};

use restorator_population::{CohortCounts, PopulationStore};
use restorator_types::CohortKey;

use crate::age_sex::split_cohort;
use crate::allocation::{self, Direction};
use crate::{BalanceError, YearLedger};

/// Make every cohort's primary counts sum to its resolved total.
///
/// The resolved total is the ledger entry when the cohort was balanced this
/// year, otherwise the cohort's current primary sum (which makes those
/// cohorts a no-op). Mismatched cohorts are re-split over their existing
/// primary shares, or over the catalog default profile when they have no
/// primary rows. Additional rows are preserved.
///
/// Returns the number of cohorts that had to be repaired.
///
/// # Errors
///
/// - [`BalanceError::NoPrimaryGroups`] if the catalog has no primary group.
/// - [`BalanceError::Population`] if a cohort holds rows outside the
///   catalog.
pub fn balance_year_primary_social_groups<S, R>(
    store: &mut S,
    ledger: &YearLedger,
    rng: &mut R,
) -> Result<usize, BalanceError>
where
    S: PopulationStore + ?Sized,
    R: Rng + ?Sized,
{
    if store.catalog().ensure_primary().is_err() {
        return Err(BalanceError::NoPrimaryGroups);
    }

    let keys: BTreeSet<CohortKey> = store
        .cohort_keys()
        .into_iter()
        .chain(ledger.iter().map(|change| change.key))
        .collect();

    let mut repaired: usize = 0;
    for key in keys {
        let (primary, additional) = split_cohort(store, key)?;
        let found = primary
            .values()
            .try_fold(0_u64, |acc, count| acc.checked_add(*count))
            .ok_or(BalanceError::ArithmeticOverflow {
                context: "cohort primary total",
            })?;
        let expected = ledger.resolved(key).unwrap_or(found);
        if found == expected {
            continue;
        }

        warn!(%key, expected, found, "Primary groups do not partition cohort, repairing");

        let mut balanced = if expected == 0 {
            CohortCounts::new()
        } else if found == 0 {
            let weights = allocation::share_weights(&store.catalog().primary_profile())?;
            allocation::apportion(&weights, expected, Direction::Grow, rng)?
        } else {
            let weights = allocation::count_weights(&primary);
            allocation::apportion(&weights, expected, Direction::of(found, expected), rng)?
        };
        balanced.extend(additional);
        store.write_cohort(key, balanced)?;
        repaired = repaired.saturating_add(1);
    }

    debug!(repaired, "Primary social groups balanced");
    Ok(repaired)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rust_decimal_macros::dec;

    use restorator_population::{Snapshot, SocialGroupCatalog};
    use restorator_types::{GroupFilter, PopulationRow, Sex, SocialGroup, SocialGroupId};

    use super::*;
    use crate::CohortChange;

    const GROUP_A: SocialGroupId = SocialGroupId(1);
    const GROUP_B: SocialGroupId = SocialGroupId(2);
    const STUDENTS: SocialGroupId = SocialGroupId(3);

    fn catalog() -> SocialGroupCatalog {
        SocialGroupCatalog::new([
            SocialGroup {
                id: GROUP_A,
                name: "employed".to_owned(),
                is_primary: true,
                parent: None,
                default_share: dec!(3),
            },
            SocialGroup {
                id: GROUP_B,
                name: "unemployed".to_owned(),
                is_primary: true,
                parent: None,
                default_share: dec!(1),
            },
            SocialGroup {
                id: STUDENTS,
                name: "students".to_owned(),
                is_primary: false,
                parent: None,
                default_share: dec!(0.2),
            },
        ])
        .unwrap()
    }

    fn row(age: u32, sex: Sex, id: SocialGroupId, count: u64) -> PopulationRow {
        PopulationRow {
            age,
            sex,
            social_group_id: id,
            count,
        }
    }

    fn primary_total(store: &Snapshot, key: CohortKey) -> u64 {
        store.cohort_total(key, GroupFilter::Primary).unwrap()
    }

    #[test]
    fn consistent_snapshot_is_untouched() {
        let mut store = Snapshot::from_rows(
            catalog(),
            [
                row(1, Sex::Men, GROUP_A, 5),
                row(1, Sex::Men, GROUP_B, 5),
                row(1, Sex::Men, STUDENTS, 2),
            ],
        )
        .unwrap();
        let before = store.clone();
        let mut ledger = YearLedger::new();
        ledger.record(CohortChange {
            key: CohortKey::new(1, Sex::Men),
            baseline: 8,
            resolved: 10,
        });
        let mut rng = SmallRng::seed_from_u64(1);

        let repaired = balance_year_primary_social_groups(&mut store, &ledger, &mut rng).unwrap();
        assert_eq!(repaired, 0);
        assert_eq!(store, before);
    }

    #[test]
    fn mismatched_cohort_is_reapportioned() {
        let key = CohortKey::new(4, Sex::Women);
        let mut store = Snapshot::from_rows(
            catalog(),
            [
                row(4, Sex::Women, GROUP_A, 30),
                row(4, Sex::Women, GROUP_B, 10),
                row(4, Sex::Women, STUDENTS, 7),
            ],
        )
        .unwrap();
        let mut ledger = YearLedger::new();
        ledger.record(CohortChange {
            key,
            baseline: 40,
            resolved: 60,
        });
        let mut rng = SmallRng::seed_from_u64(2);

        let repaired = balance_year_primary_social_groups(&mut store, &ledger, &mut rng).unwrap();
        assert_eq!(repaired, 1);
        let counts = store.read_cohort(key);
        assert_eq!(counts.get(&GROUP_A), Some(&45));
        assert_eq!(counts.get(&GROUP_B), Some(&15));
        assert_eq!(counts.get(&STUDENTS), Some(&7));
    }

    #[test]
    fn cohort_without_primary_rows_uses_default_profile() {
        let key = CohortKey::new(0, Sex::Men);
        let mut store = Snapshot::from_rows(catalog(), [row(0, Sex::Men, STUDENTS, 1)]).unwrap();
        let mut ledger = YearLedger::new();
        ledger.record(CohortChange {
            key,
            baseline: 0,
            resolved: 8,
        });
        let mut rng = SmallRng::seed_from_u64(3);

        balance_year_primary_social_groups(&mut store, &ledger, &mut rng).unwrap();
        let counts = store.read_cohort(key);
        assert_eq!(counts.get(&GROUP_A), Some(&6));
        assert_eq!(counts.get(&GROUP_B), Some(&2));
        assert_eq!(primary_total(&store, key), 8);
    }

    #[test]
    fn ledger_cohort_missing_from_store_is_created() {
        let key = CohortKey::new(12, Sex::Women);
        let mut store = Snapshot::new(catalog());
        let mut ledger = YearLedger::new();
        ledger.record(CohortChange {
            key,
            baseline: 0,
            resolved: 4,
        });
        let mut rng = SmallRng::seed_from_u64(4);

        let repaired = balance_year_primary_social_groups(&mut store, &ledger, &mut rng).unwrap();
        assert_eq!(repaired, 1);
        assert_eq!(primary_total(&store, key), 4);
    }

    #[test]
    fn catalog_without_primary_groups_fails() {
        let catalog = SocialGroupCatalog::new([SocialGroup {
            id: STUDENTS,
            name: "students".to_owned(),
            is_primary: false,
            parent: None,
            default_share: dec!(0.2),
        }])
        .unwrap();
        let mut store = Snapshot::new(catalog);
        let mut rng = SmallRng::seed_from_u64(5);

        let result = balance_year_primary_social_groups(&mut store, &YearLedger::new(), &mut rng);
        assert!(matches!(result, Err(BalanceError::NoPrimaryGroups)));
    }
}
