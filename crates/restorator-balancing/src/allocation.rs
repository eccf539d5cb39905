//! Integer apportionment with randomized tie-breaks.
//!
//! Two primitives back every balancer:
//!
//! - [`apportion`] splits a head-count over weighted groups so the parts
//!   sum to exactly the head-count and each part is within one person of
//!   its ideal (real-valued) share. This is the largest-remainder method.
//! - [`scale_count`] rescales a single count by a ratio and rounds the
//!   result up with probability equal to the discarded fraction, so its
//!   expected value is the ideal one.
//!
//! Ties between equal remainders are settled by shuffling with the caller's
//! random source before a stable sort. A fixed order would hand the same
//! groups the spare person every simulated year and the error would grow
//! with the horizon.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;

use restorator_population::CohortCounts;
use restorator_types::SocialGroupId;

use crate::BalanceError;

/// Which way a cohort is moving, deciding how rounding leftovers settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The cohort grows (or is injected from nothing). Every group starts
    /// at the floor of its share and spare people go to the largest
    /// remainders.
    Grow,
    /// The cohort shrinks. Every group starts at the ceiling of its share
    /// and surplus people are withdrawn from the smallest remainders.
    Shrink,
}

impl Direction {
    /// Direction of a move from `current` to `needed`.
    pub const fn of(current: u64, needed: u64) -> Self {
        if needed >= current {
            Self::Grow
        } else {
            Self::Shrink
        }
    }
}

/// One group's exact share, split into whole people and a remainder.
#[derive(Debug, Clone, Copy)]
struct Part {
    id: SocialGroupId,
    count: u64,
    /// Numerator of the fractional part; the denominator is the total weight.
    remainder: u128,
}

/// Split `needed` people over `weights` so the result sums to `needed`.
///
/// Each group's ideal share is `weight * needed / total_weight`. Groups end
/// at the floor or the ceiling of that share; which groups get the ceiling
/// is decided by remainder size, ties broken by `rng`. Zero-weight groups
/// always receive zero, so a shrinking cohort never drives a group below
/// zero and no group appears from nothing.
///
/// # Errors
///
/// - [`BalanceError::EmptyWeights`] if the weights sum to zero.
/// - [`BalanceError::ArithmeticOverflow`] if an intermediate product
///   overflows `u128`.
pub fn apportion<R: Rng + ?Sized>(
    weights: &BTreeMap<SocialGroupId, u128>,
    needed: u64,
    direction: Direction,
    rng: &mut R,
) -> Result<CohortCounts, BalanceError> {
    let total_weight = weights
        .values()
        .try_fold(0_u128, |acc, weight| acc.checked_add(*weight))
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "apportionment weight sum",
        })?;
    if total_weight == 0 {
        return Err(BalanceError::EmptyWeights { needed });
    }

    let mut parts = Vec::with_capacity(weights.len());
    let mut floor_sum: u64 = 0;
    for (id, weight) in weights {
        let product =
            weight
                .checked_mul(u128::from(needed))
                .ok_or(BalanceError::ArithmeticOverflow {
                    context: "apportionment share",
                })?;
        let floor = product
            .checked_div(total_weight)
            .and_then(|floor| u64::try_from(floor).ok())
            .ok_or(BalanceError::ArithmeticOverflow {
                context: "apportionment floor",
            })?;
        let remainder = product
            .checked_rem(total_weight)
            .ok_or(BalanceError::ArithmeticOverflow {
                context: "apportionment remainder",
            })?;
        floor_sum = floor_sum
            .checked_add(floor)
            .ok_or(BalanceError::ArithmeticOverflow {
                context: "apportionment floor sum",
            })?;
        parts.push(Part {
            id: *id,
            count: floor,
            remainder,
        });
    }

    // Sum of the fractional parts is exactly the number of people the floors
    // left out, and every one of them is < 1, so `spare` never exceeds the
    // number of groups with a non-zero remainder.
    let spare = needed
        .checked_sub(floor_sum)
        .and_then(|spare| usize::try_from(spare).ok())
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "apportionment leftover",
        })?;

    let mut fractional: Vec<usize> = parts
        .iter()
        .enumerate()
        .filter(|(_, part)| part.remainder > 0)
        .map(|(idx, _)| idx)
        .collect();
    fractional.shuffle(rng);

    match direction {
        Direction::Grow => {
            fractional.sort_by(|a, b| remainder_at(&parts, *b).cmp(&remainder_at(&parts, *a)));
            for idx in fractional.iter().take(spare) {
                adjust(&mut parts, *idx, true)?;
            }
        }
        Direction::Shrink => {
            for idx in &fractional {
                adjust(&mut parts, *idx, true)?;
            }
            let surplus = fractional.len().saturating_sub(spare);
            fractional.sort_by(|a, b| remainder_at(&parts, *a).cmp(&remainder_at(&parts, *b)));
            for idx in fractional.iter().take(surplus) {
                adjust(&mut parts, *idx, false)?;
            }
        }
    }

    Ok(parts.into_iter().map(|part| (part.id, part.count)).collect())
}

fn remainder_at(parts: &[Part], idx: usize) -> u128 {
    parts.get(idx).map_or(0, |part| part.remainder)
}

fn adjust(parts: &mut [Part], idx: usize, up: bool) -> Result<(), BalanceError> {
    let part = parts.get_mut(idx).ok_or(BalanceError::ArithmeticOverflow {
        context: "apportionment index",
    })?;
    let moved = if up {
        part.count.checked_add(1)
    } else {
        part.count.checked_sub(1)
    };
    part.count = moved.ok_or(BalanceError::ArithmeticOverflow {
        context: "apportionment adjustment",
    })?;
    Ok(())
}

/// Turn existing head-counts into apportionment weights.
pub fn count_weights(counts: &CohortCounts) -> BTreeMap<SocialGroupId, u128> {
    counts
        .iter()
        .map(|(id, count)| (*id, u128::from(*count)))
        .collect()
}

/// Turn decimal default shares into exact integer weights.
///
/// All shares are rescaled to the largest scale among them, so the ratios
/// between the resulting mantissas equal the ratios between the shares.
/// When every share is zero the groups are weighted equally.
///
/// # Errors
///
/// - [`BalanceError::NoPrimaryGroups`] for an empty profile.
/// - [`BalanceError::ArithmeticOverflow`] if a share is negative or cannot
///   be represented.
pub fn share_weights(
    profile: &[(SocialGroupId, Decimal)],
) -> Result<BTreeMap<SocialGroupId, u128>, BalanceError> {
    if profile.is_empty() {
        return Err(BalanceError::NoPrimaryGroups);
    }

    let scale = profile
        .iter()
        .map(|(_, share)| share.scale())
        .max()
        .unwrap_or(0);

    let mut weights = BTreeMap::new();
    for (id, share) in profile {
        let mut rescaled = *share;
        rescaled.rescale(scale);
        let weight = u128::try_from(rescaled.mantissa()).map_err(|_err| {
            BalanceError::ArithmeticOverflow {
                context: "negative default share",
            }
        })?;
        weights.insert(*id, weight);
    }

    if weights.values().all(|weight| *weight == 0) {
        for weight in weights.values_mut() {
            *weight = 1;
        }
    }
    Ok(weights)
}

/// Rescale `count` by `numerator / denominator` with stochastic rounding.
///
/// The result is the floor of the exact value plus one with probability
/// equal to the fractional part, drawn from `rng`.
///
/// # Errors
///
/// Returns [`BalanceError::ArithmeticOverflow`] for a zero denominator or an
/// overflowing product.
pub fn scale_count<R: Rng + ?Sized>(
    count: u64,
    numerator: u128,
    denominator: u128,
    rng: &mut R,
) -> Result<u64, BalanceError> {
    let product = u128::from(count)
        .checked_mul(numerator)
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "scaled count",
        })?;
    let floor = product
        .checked_div(denominator)
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "scale denominator",
        })?;
    let remainder = product
        .checked_rem(denominator)
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "scale denominator",
        })?;

    let rounded = if remainder > 0 && rng.random_range(0..denominator) < remainder {
        floor.checked_add(1)
    } else {
        Some(floor)
    };
    rounded
        .and_then(|value| u64::try_from(value).ok())
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "scaled count",
        })
}

/// Split a decimal fraction into an exact `(numerator, denominator)` pair.
///
/// # Errors
///
/// Returns [`BalanceError::ArithmeticOverflow`] for a negative fraction.
pub fn decimal_ratio(fraction: Decimal) -> Result<(u128, u128), BalanceError> {
    let numerator =
        u128::try_from(fraction.mantissa()).map_err(|_err| BalanceError::ArithmeticOverflow {
            context: "negative default share",
        })?;
    let denominator = 10_u128
        .checked_pow(fraction.scale())
        .ok_or(BalanceError::ArithmeticOverflow {
            context: "default share scale",
        })?;
    Ok((numerator, denominator))
}
