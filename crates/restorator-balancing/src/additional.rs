//! Additional social group balancing.
//!
//! Additional groups overlap the primary partition and do not have to cover
//! the cohort. When a cohort is resized, each additional count follows the
//! cohort by the same ratio, rounded stochastically so that the expected
//! count is exact. A cohort that was empty before balancing has nothing to
//! scale from and receives each group's default share of its new total.
//!
//! After scaling, every additional count in the snapshot is clamped to its
//! cohort's head-count and, for groups with a parent, to the parent's count
//! in the same cohort.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rust_decimal::Decimal;
use tracing::debug;

use restorator_population::{CohortCounts, PopulationStore};
use restorator_types::{CohortKey, SocialGroupId};

use crate::age_sex::split_cohort;
use crate::allocation;
use crate::{BalanceError, CohortChange, YearLedger};

/// What the balancer needs to know about one additional group.
#[derive(Debug, Clone, Copy)]
struct AdditionalGroup {
    id: SocialGroupId,
    default_share: Decimal,
}

/// Rescale additional group counts after the year's cohorts were resolved.
///
/// For every ledger entry whose total changed:
///
/// - `baseline > 0`: each additional count becomes
///   `count * resolved / baseline`, rounded stochastically.
/// - `baseline == 0`: each additional group receives
///   `resolved * default_share`, rounded the same way.
///
/// Every cohort is then clamped so no additional count exceeds the cohort's
/// primary head-count or its parent group's count.
///
/// # Errors
///
/// - [`BalanceError::Population`] if a cohort holds rows outside the
///   catalog.
/// - [`BalanceError::ArithmeticOverflow`] if scaling overflows.
pub fn balance_year_additional_social_groups<S, R>(
    store: &mut S,
    ledger: &YearLedger,
    rng: &mut R,
) -> Result<(), BalanceError>
where
    S: PopulationStore + ?Sized,
    R: Rng + ?Sized,
{
    let groups: Vec<AdditionalGroup> = store
        .catalog()
        .additional()
        .map(|group| AdditionalGroup {
            id: group.id,
            default_share: group.default_share,
        })
        .collect();
    if groups.is_empty() {
        debug!("No additional social groups to balance");
        return Ok(());
    }
    let parents: BTreeMap<SocialGroupId, SocialGroupId> = store
        .catalog()
        .groups()
        .filter_map(|group| group.parent.map(|parent| (group.id, parent)))
        .collect();
    let max_passes = store.catalog().len().saturating_add(1);

    let keys: BTreeSet<CohortKey> = store
        .cohort_keys()
        .into_iter()
        .chain(ledger.iter().map(|change| change.key))
        .collect();

    let mut rewritten: usize = 0;
    for key in keys {
        let (primary, additional) = split_cohort(store, key)?;
        let total = primary
            .values()
            .try_fold(0_u64, |acc, count| acc.checked_add(*count))
            .ok_or(BalanceError::ArithmeticOverflow {
                context: "cohort primary total",
            })?;

        let mut scaled = match ledger.get(key) {
            Some(change) if change.baseline != change.resolved => {
                rescale(&additional, &groups, change, rng)?
            }
            _ => additional.clone(),
        };
        clamp(&mut scaled, &primary, total, &parents, max_passes);
        scaled.retain(|_, count| *count > 0);

        if scaled != additional {
            let mut counts = primary;
            counts.extend(scaled);
            store.write_cohort(key, counts)?;
            rewritten = rewritten.saturating_add(1);
        }
    }

    debug!(rewritten, "Additional social groups balanced");
    Ok(())
}

/// Scale one cohort's additional counts by its recorded change.
fn rescale<R: Rng + ?Sized>(
    additional: &CohortCounts,
    groups: &[AdditionalGroup],
    change: &CohortChange,
    rng: &mut R,
) -> Result<CohortCounts, BalanceError> {
    let mut scaled = CohortCounts::new();
    if change.baseline > 0 {
        for (id, count) in additional {
            let value = allocation::scale_count(
                *count,
                u128::from(change.resolved),
                u128::from(change.baseline),
                rng,
            )?;
            scaled.insert(*id, value);
        }
    } else {
        for group in groups {
            let (numerator, denominator) = allocation::decimal_ratio(group.default_share)?;
            let value = allocation::scale_count(change.resolved, numerator, denominator, rng)?;
            scaled.insert(group.id, value);
        }
        debug!(key = %change.key, total = change.resolved, "Injected additional groups from default shares");
    }
    Ok(scaled)
}

/// Cap each additional count at the cohort total and at its parent's count.
///
/// Lowering a parent can lower its children, so the pass repeats until
/// nothing moves. The catalog rejects parent cycles, so chains are at most
/// as long as the catalog, which bounds the number of passes.
fn clamp(
    additional: &mut CohortCounts,
    primary: &CohortCounts,
    total: u64,
    parents: &BTreeMap<SocialGroupId, SocialGroupId>,
    max_passes: usize,
) {
    for _ in 0..max_passes {
        let mut changed = false;
        let ids: Vec<SocialGroupId> = additional.keys().copied().collect();
        for id in ids {
            let mut bound = total;
            if let Some(parent) = parents.get(&id) {
                let parent_count = primary
                    .get(parent)
                    .or_else(|| additional.get(parent))
                    .copied()
                    .unwrap_or(0);
                bound = bound.min(parent_count);
            }
            if let Some(count) = additional.get_mut(&id) {
                if *count > bound {
                    *count = bound;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rust_decimal_macros::dec;

    use restorator_population::{Snapshot, SocialGroupCatalog};
    use restorator_types::{PopulationRow, Sex, SocialGroup};

    use super::*;

    const WORKERS: SocialGroupId = SocialGroupId(1);
    const OTHERS: SocialGroupId = SocialGroupId(2);
    const STUDENTS: SocialGroupId = SocialGroupId(10);
    const UNION_MEMBERS: SocialGroupId = SocialGroupId(11);
    const VETERANS: SocialGroupId = SocialGroupId(12);

    fn group(
        id: SocialGroupId,
        is_primary: bool,
        parent: Option<SocialGroupId>,
        share: Decimal,
    ) -> SocialGroup {
        SocialGroup {
            id,
            name: format!("group-{id}"),
            is_primary,
            parent,
            default_share: share,
        }
    }

    fn catalog() -> SocialGroupCatalog {
        SocialGroupCatalog::new([
            group(WORKERS, true, None, dec!(0.6)),
            group(OTHERS, true, None, dec!(0.4)),
            group(STUDENTS, false, None, dec!(0.25)),
            group(UNION_MEMBERS, false, Some(WORKERS), dec!(0.1)),
            group(VETERANS, false, Some(STUDENTS), dec!(0.5)),
        ])
        .unwrap()
    }

    fn snapshot(key: CohortKey, counts: &[(SocialGroupId, u64)]) -> Snapshot {
        Snapshot::from_rows(
            catalog(),
            counts.iter().map(|(id, count)| PopulationRow {
                age: key.age,
                sex: key.sex,
                social_group_id: *id,
                count: *count,
            }),
        )
        .unwrap()
    }

    fn ledger(key: CohortKey, baseline: u64, resolved: u64) -> YearLedger {
        let mut ledger = YearLedger::new();
        ledger.record(CohortChange {
            key,
            baseline,
            resolved,
        });
        ledger
    }

    #[test]
    fn halving_a_cohort_halves_its_additional_groups() {
        let key = CohortKey::new(30, Sex::Men);
        // Primary rows already balanced from 200 down to 100.
        let mut store = snapshot(key, &[(WORKERS, 60), (OTHERS, 40), (STUDENTS, 100)]);
        let mut rng = SmallRng::seed_from_u64(1);

        balance_year_additional_social_groups(&mut store, &ledger(key, 200, 100), &mut rng).unwrap();
        let counts = store.read_cohort(key);
        assert_eq!(counts.get(&STUDENTS), Some(&50));
        assert_eq!(counts.get(&WORKERS), Some(&60));
        assert_eq!(counts.get(&OTHERS), Some(&40));
    }

    #[test]
    fn unchanged_cohort_keeps_its_counts() {
        let key = CohortKey::new(31, Sex::Women);
        let mut store = snapshot(key, &[(WORKERS, 7), (OTHERS, 3), (STUDENTS, 4)]);
        let before = store.clone();
        let mut rng = SmallRng::seed_from_u64(2);

        balance_year_additional_social_groups(&mut store, &ledger(key, 10, 10), &mut rng).unwrap();
        assert_eq!(store, before);
    }

    #[test]
    fn counts_are_clamped_to_cohort_total() {
        let key = CohortKey::new(40, Sex::Men);
        // Cohort not in the ledger but carrying an impossible additional count.
        let mut store = snapshot(key, &[(WORKERS, 5), (OTHERS, 5), (STUDENTS, 25)]);
        let mut rng = SmallRng::seed_from_u64(3);

        balance_year_additional_social_groups(&mut store, &YearLedger::new(), &mut rng).unwrap();
        assert_eq!(store.read_cohort(key).get(&STUDENTS), Some(&10));
    }

    #[test]
    fn counts_are_clamped_to_parent() {
        let key = CohortKey::new(41, Sex::Women);
        let mut store = snapshot(
            key,
            &[
                (WORKERS, 4),
                (OTHERS, 16),
                (UNION_MEMBERS, 9),
                (STUDENTS, 12),
                (VETERANS, 15),
            ],
        );
        let mut rng = SmallRng::seed_from_u64(4);

        balance_year_additional_social_groups(&mut store, &YearLedger::new(), &mut rng).unwrap();
        let counts = store.read_cohort(key);
        assert_eq!(counts.get(&UNION_MEMBERS), Some(&4));
        assert_eq!(counts.get(&STUDENTS), Some(&12));
        assert_eq!(counts.get(&VETERANS), Some(&12));
    }

    #[test]
    fn injected_cohort_uses_default_shares() {
        let key = CohortKey::new(0, Sex::Men);
        // Primary rows injected from the default profile: 600 / 400.
        let mut store = snapshot(key, &[(WORKERS, 600), (OTHERS, 400)]);
        let mut rng = SmallRng::seed_from_u64(5);

        balance_year_additional_social_groups(&mut store, &ledger(key, 0, 1000), &mut rng).unwrap();
        let counts = store.read_cohort(key);
        assert_eq!(counts.get(&STUDENTS), Some(&250));
        assert_eq!(counts.get(&UNION_MEMBERS), Some(&100));
        // Half of the whole cohort would be 500, but the parent holds 250.
        assert_eq!(counts.get(&VETERANS), Some(&250));
    }

    #[test]
    fn emptied_cohort_has_no_additional_rows() {
        let key = CohortKey::new(99, Sex::Women);
        let mut store = snapshot(key, &[(STUDENTS, 3)]);
        let mut rng = SmallRng::seed_from_u64(6);

        balance_year_additional_social_groups(&mut store, &ledger(key, 10, 0), &mut rng).unwrap();
        assert!(store.read_cohort(key).is_empty());
    }

    #[test]
    fn scaling_is_unbiased_across_seeds() {
        let key = CohortKey::new(50, Sex::Men);
        // 3 * 10 / 4 = 7.5 students expected.
        let mut total: u64 = 0;
        for seed in 0..400_u64 {
            let mut store = snapshot(key, &[(WORKERS, 6), (OTHERS, 4), (STUDENTS, 3)]);
            let mut rng = SmallRng::seed_from_u64(seed);
            balance_year_additional_social_groups(&mut store, &ledger(key, 4, 10), &mut rng)
                .unwrap();
            let students = *store.read_cohort(key).get(&STUDENTS).unwrap();
            assert!(students == 7 || students == 8);
            total += students;
        }
        // Mean 7.5 -> 3000 over 400 draws.
        assert!((2900..=3100).contains(&total), "total {total}");
    }
}
