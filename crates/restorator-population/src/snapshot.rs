//! In-memory population snapshot.
//!
//! [`Snapshot`] keeps one sparse map of per-group counts per cohort. It is
//! cheap to clone, which is how the driver hands each simulated year a
//! private copy of the previous one. On disk a snapshot is a flat
//! [`SnapshotFile`]: the catalog followed by one row per stored tuple.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use restorator_types::{CohortKey, GroupFilter, PopulationRow, Sex, SexTotals, SocialGroup};

use crate::catalog::SocialGroupCatalog;
use crate::error::PopulationError;
use crate::store::{CohortCounts, PopulationStore};

/// One simulated year of population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotFile", into = "SnapshotFile")]
pub struct Snapshot {
    catalog: SocialGroupCatalog,
    cohorts: BTreeMap<CohortKey, CohortCounts>,
}

/// Serialized form of a [`Snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// The social group catalog.
    pub social_groups: Vec<SocialGroup>,
    /// Every stored (age, sex, group, count) tuple.
    #[serde(default)]
    pub rows: Vec<PopulationRow>,
}

impl Snapshot {
    /// Create an empty snapshot over a catalog.
    pub const fn new(catalog: SocialGroupCatalog) -> Self {
        Self {
            catalog,
            cohorts: BTreeMap::new(),
        }
    }

    /// Build a snapshot from flat rows.
    ///
    /// Rows with a zero count are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::UnknownSocialGroup`] for a row outside the
    /// catalog, or [`PopulationError::DuplicateRow`] if a (cohort, group)
    /// pair repeats.
    pub fn from_rows(
        catalog: SocialGroupCatalog,
        rows: impl IntoIterator<Item = PopulationRow>,
    ) -> Result<Self, PopulationError> {
        let mut cohorts: BTreeMap<CohortKey, CohortCounts> = BTreeMap::new();
        for row in rows {
            if catalog.get(row.social_group_id).is_none() {
                return Err(PopulationError::UnknownSocialGroup(row.social_group_id));
            }
            if row.count == 0 {
                continue;
            }
            let key = row.cohort();
            let counts = cohorts.entry(key).or_default();
            if counts.insert(row.social_group_id, row.count).is_some() {
                return Err(PopulationError::DuplicateRow {
                    key,
                    group: row.social_group_id,
                });
            }
        }
        Ok(Self { catalog, cohorts })
    }

    /// Flatten the snapshot into rows, ordered by age, sex, then group.
    pub fn rows(&self) -> Vec<PopulationRow> {
        self.cohorts
            .iter()
            .flat_map(|(key, counts)| {
                counts.iter().map(move |(id, count)| PopulationRow {
                    age: key.age,
                    sex: key.sex,
                    social_group_id: *id,
                    count: *count,
                })
            })
            .collect()
    }

    /// Parse a snapshot from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::Serialization`] for malformed JSON or any
    /// catalog/row validation error surfaced through it.
    pub fn from_json_str(json: &str) -> Result<Self, PopulationError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a snapshot from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::Io`] if the file cannot be read, or
    /// [`PopulationError::Serialization`] if it does not parse.
    pub fn from_json_file(path: &Path) -> Result<Self, PopulationError> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot = Self::from_json_str(&contents)?;
        debug!(
            path = %path.display(),
            cohorts = snapshot.cohorts.len(),
            groups = snapshot.catalog.len(),
            "Loaded population snapshot"
        );
        Ok(snapshot)
    }

    /// Write the snapshot as JSON, creating or truncating the file.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::Serialization`] or [`PopulationError::Io`].
    pub fn write_json_file(&self, path: &Path, pretty: bool) -> Result<(), PopulationError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl TryFrom<SnapshotFile> for Snapshot {
    type Error = PopulationError;

    fn try_from(file: SnapshotFile) -> Result<Self, Self::Error> {
        let catalog = SocialGroupCatalog::new(file.social_groups)?;
        Self::from_rows(catalog, file.rows)
    }
}

impl From<Snapshot> for SnapshotFile {
    fn from(snapshot: Snapshot) -> Self {
        let rows = snapshot.rows();
        Self {
            social_groups: snapshot.catalog.groups().cloned().collect(),
            rows,
        }
    }
}

impl PopulationStore for Snapshot {
    fn catalog(&self) -> &SocialGroupCatalog {
        &self.catalog
    }

    fn cohort_keys(&self) -> Vec<CohortKey> {
        self.cohorts.keys().copied().collect()
    }

    fn read_cohort(&self, key: CohortKey) -> CohortCounts {
        self.cohorts.get(&key).cloned().unwrap_or_default()
    }

    fn write_cohort(
        &mut self,
        key: CohortKey,
        mut counts: CohortCounts,
    ) -> Result<(), PopulationError> {
        if let Some(unknown) = counts.keys().find(|id| self.catalog.get(**id).is_none()) {
            return Err(PopulationError::UnknownSocialGroup(*unknown));
        }
        counts.retain(|_, count| *count > 0);
        if counts.is_empty() {
            self.cohorts.remove(&key);
        } else {
            self.cohorts.insert(key, counts);
        }
        Ok(())
    }

    fn age_shift(&mut self, delta: u32, max_age: u32) -> Result<(), PopulationError> {
        if let Some(oldest) = self.max_age() {
            oldest
                .checked_add(delta)
                .ok_or(PopulationError::ArithmeticOverflow { context: "age shift" })?;
        }

        let mut shifted = BTreeMap::new();
        let mut discarded: usize = 0;
        for (key, counts) in std::mem::take(&mut self.cohorts) {
            let age = key.age.saturating_add(delta);
            if age > max_age {
                discarded = discarded.saturating_add(1);
                continue;
            }
            shifted.insert(CohortKey::new(age, key.sex), counts);
        }
        self.cohorts = shifted;
        debug!(delta, max_age, discarded, "Shifted cohort ages");
        Ok(())
    }

    fn total(&self, filter: GroupFilter) -> Result<SexTotals, PopulationError> {
        let mut totals = SexTotals::default();
        for (key, counts) in &self.cohorts {
            for (id, count) in counts {
                if filter.accepts(self.catalog.is_primary(*id)?) {
                    totals = totals
                        .checked_add(key.sex, *count)
                        .ok_or(PopulationError::ArithmeticOverflow {
                            context: "population total",
                        })?;
                }
            }
        }
        Ok(totals)
    }

    fn age_total(&self, age: u32) -> Result<u64, PopulationError> {
        self.cohorts
            .range(CohortKey::new(age, Sex::Men)..=CohortKey::new(age, Sex::Women))
            .flat_map(|(_, counts)| counts.values())
            .try_fold(0_u64, |acc, count| acc.checked_add(*count))
            .ok_or(PopulationError::ArithmeticOverflow { context: "age total" })
    }

    fn max_age(&self) -> Option<u32> {
        self.cohorts.keys().next_back().map(|key| key.age)
    }
}
