//! Enumeration types for the population restorator.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sex
// ---------------------------------------------------------------------------

/// The sex half of a cohort key.
///
/// Forecasts are supplied independently for men and women, so every
/// balancing step runs once per sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    /// Male population.
    Men,
    /// Female population.
    Women,
}

impl Sex {
    /// Both sexes in the order the engine balances them.
    pub const ALL: [Self; 2] = [Self::Men, Self::Women];

    /// Lowercase label used in logs and file formats.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Men => "men",
            Self::Women => "women",
        }
    }
}

impl core::fmt::Display for Sex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Group filter
// ---------------------------------------------------------------------------

/// Selects which social groups an aggregate is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupFilter {
    /// Only primary (partitioning) groups. Summing these yields head-count.
    Primary,
    /// Only additional (overlapping) groups. Summing these yields
    /// membership count, which may double-count people.
    Additional,
}

impl GroupFilter {
    /// Returns `true` if a group with the given primary flag passes the filter.
    pub const fn accepts(self, is_primary: bool) -> bool {
        match self {
            Self::Primary => is_primary,
            Self::Additional => !is_primary,
        }
    }
}
