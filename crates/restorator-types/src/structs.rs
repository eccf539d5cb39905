//! Core structs shared across the workspace.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::Sex;
use crate::ids::SocialGroupId;

// ---------------------------------------------------------------------------
// Social groups
// ---------------------------------------------------------------------------

/// A social group descriptor from the catalog.
///
/// Primary groups are mutually exclusive and exhaustive: every person in a
/// cohort belongs to exactly one of them. Additional groups are arbitrary,
/// possibly overlapping subsets layered on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialGroup {
    /// Catalog key.
    pub id: SocialGroupId,
    /// Human-readable name.
    pub name: String,
    /// Whether the group is part of the primary partition.
    pub is_primary: bool,
    /// Enclosing group. An additional group never has more members in a
    /// cohort than its parent.
    #[serde(default)]
    pub parent: Option<SocialGroupId>,
    /// Share of a freshly injected cohort that belongs to this group.
    ///
    /// For primary groups the shares act as relative weights and are
    /// normalized over all primary groups. For additional groups the share
    /// is the absolute fraction of the cohort (0.0--1.0).
    #[serde(default)]
    pub default_share: Decimal,
}

// ---------------------------------------------------------------------------
// Cohorts and rows
// ---------------------------------------------------------------------------

/// Identifies a cohort: everyone sharing an (age, sex) pair.
///
/// Ordering is by age first, then sex, which is the order the engine
/// processes cohorts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CohortKey {
    /// Age in whole years.
    pub age: u32,
    /// Sex of the cohort.
    pub sex: Sex,
}

impl CohortKey {
    /// Create a cohort key.
    pub const fn new(age: u32, sex: Sex) -> Self {
        Self { age, sex }
    }
}

impl core::fmt::Display for CohortKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.age, self.sex)
    }
}

/// One stored tuple of a population snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationRow {
    /// Age in whole years.
    pub age: u32,
    /// Sex of the counted people.
    pub sex: Sex,
    /// Social group the people are counted in.
    pub social_group_id: SocialGroupId,
    /// Number of people.
    pub count: u64,
}

impl PopulationRow {
    /// The cohort this row belongs to.
    pub const fn cohort(&self) -> CohortKey {
        CohortKey::new(self.age, self.sex)
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Head-count (or membership count) split by sex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SexTotals {
    /// Total for men.
    pub men: u64,
    /// Total for women.
    pub women: u64,
}

impl SexTotals {
    /// Return the total for one sex.
    pub const fn get(&self, sex: Sex) -> u64 {
        match sex {
            Sex::Men => self.men,
            Sex::Women => self.women,
        }
    }

    /// Add `count` to the total of `sex`. Returns `None` on overflow.
    pub const fn checked_add(self, sex: Sex, count: u64) -> Option<Self> {
        match sex {
            Sex::Men => match self.men.checked_add(count) {
                Some(men) => Some(Self { men, ..self }),
                None => None,
            },
            Sex::Women => match self.women.checked_add(count) {
                Some(women) => Some(Self { women, ..self }),
                None => None,
            },
        }
    }

    /// Combined total of both sexes. Returns `None` on overflow.
    pub const fn combined(&self) -> Option<u64> {
        self.men.checked_add(self.women)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn cohort_keys_order_by_age_then_sex() {
        let mut keys = vec![
            CohortKey::new(3, Sex::Women),
            CohortKey::new(1, Sex::Women),
            CohortKey::new(3, Sex::Men),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                CohortKey::new(1, Sex::Women),
                CohortKey::new(3, Sex::Men),
                CohortKey::new(3, Sex::Women),
            ]
        );
    }

    #[test]
    fn sex_totals_accumulate() {
        let totals = SexTotals::default()
            .checked_add(Sex::Men, 10)
            .and_then(|t| t.checked_add(Sex::Women, 4))
            .and_then(|t| t.checked_add(Sex::Men, 1));
        assert_eq!(totals, Some(SexTotals { men: 11, women: 4 }));
        assert_eq!(totals.and_then(|t| t.combined()), Some(15));
    }

    #[test]
    fn sex_totals_detect_overflow() {
        let totals = SexTotals { men: u64::MAX, women: 0 };
        assert_eq!(totals.checked_add(Sex::Men, 1), None);
        assert_eq!(totals.checked_add(Sex::Women, 1).map(|t| t.women), Some(1));
    }

    #[test]
    fn social_group_defaults_optional_fields() {
        let json = r#"{"id": 4, "name": "students", "is_primary": false}"#;
        let group: Result<SocialGroup, _> = serde_json::from_str(json);
        let group = group.ok();
        assert_eq!(group.as_ref().map(|g| g.parent), Some(None));
        assert_eq!(group.map(|g| g.default_share), Some(dec!(0)));
    }

    #[test]
    fn row_reports_its_cohort() {
        let row = PopulationRow {
            age: 30,
            sex: Sex::Women,
            social_group_id: SocialGroupId::new(1),
            count: 12,
        };
        assert_eq!(row.cohort(), CohortKey::new(30, Sex::Women));
    }
}
