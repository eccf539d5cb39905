//! Demographic forecast matrices.
//!
//! A forecast holds one table per sex. Each table has an ascending list of
//! age columns and one row per year offset; row 0 describes the starting
//! snapshot and is never applied. Values are kept signed exactly as loaded.
//! A negative target is a fault of the year that reaches it, not of the
//! file.
//!
//! The JSON form is:
//!
//! ```json
//! {
//!   "men":   { "ages": [0, 1, 2], "rows": [[10, 9, 8], [11, 10, 9]] },
//!   "women": { "ages": [0, 1, 2], "rows": [[10, 9, 8], [12, 10, 9]] }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use restorator_types::Sex;

/// Errors that can occur when loading or querying a forecast.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    /// The men and women tables do not share the same age columns.
    #[error("men and women forecasts have different age columns")]
    MismatchedAges,

    /// A table's age columns are not strictly ascending.
    #[error("{sex} forecast ages are not strictly ascending")]
    UnsortedAges {
        /// The offending table.
        sex: Sex,
    },

    /// A row does not have one value per age column.
    #[error("{sex} forecast row {year_offset} has {found} values, expected {expected}")]
    RaggedRow {
        /// The offending table.
        sex: Sex,
        /// Index of the row.
        year_offset: usize,
        /// Number of age columns.
        expected: usize,
        /// Number of values in the row.
        found: usize,
    },

    /// No forecast value exists for the requested cell.
    #[error("no {sex} forecast for age {age} at year offset {year_offset}")]
    MissingEntry {
        /// Requested year offset.
        year_offset: usize,
        /// Requested age.
        age: u32,
        /// Requested sex.
        sex: Sex,
    },

    /// Failed to parse the forecast JSON.
    #[error("failed to parse forecast JSON: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// Failed to read the forecast file.
    #[error("failed to read forecast file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

/// One sex's forecast: age columns and one row of targets per year offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeMatrix {
    /// Age columns, strictly ascending.
    pub ages: Vec<u32>,
    /// Targets per year offset; `rows[i][j]` is the head-count at
    /// `ages[j]` in year offset `i`.
    pub rows: Vec<Vec<i64>>,
}

impl AgeMatrix {
    fn validate(&self, sex: Sex) -> Result<(), ForecastError> {
        if self.ages.windows(2).any(|pair| matches!(pair, [a, b] if a >= b)) {
            return Err(ForecastError::UnsortedAges { sex });
        }
        for (year_offset, row) in self.rows.iter().enumerate() {
            if row.len() != self.ages.len() {
                return Err(ForecastError::RaggedRow {
                    sex,
                    year_offset,
                    expected: self.ages.len(),
                    found: row.len(),
                });
            }
        }
        Ok(())
    }

    fn get(&self, year_offset: usize, age: u32) -> Option<i64> {
        let column = self.ages.binary_search(&age).ok()?;
        self.rows.get(year_offset)?.get(column).copied()
    }
}

/// Forecast targets for both sexes, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ForecastFile", into = "ForecastFile")]
pub struct ForecastedAges {
    men: AgeMatrix,
    women: AgeMatrix,
}

/// On-disk form of [`ForecastedAges`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastFile {
    /// Forecast for men.
    pub men: AgeMatrix,
    /// Forecast for women.
    pub women: AgeMatrix,
}

impl ForecastedAges {
    /// Build a forecast from the two per-sex tables.
    ///
    /// # Errors
    ///
    /// - [`ForecastError::UnsortedAges`] if a table's ages are not strictly
    ///   ascending.
    /// - [`ForecastError::MismatchedAges`] if the tables have different ages.
    /// - [`ForecastError::RaggedRow`] if a row's width differs from the
    ///   number of ages.
    pub fn new(men: AgeMatrix, women: AgeMatrix) -> Result<Self, ForecastError> {
        men.validate(Sex::Men)?;
        women.validate(Sex::Women)?;
        if men.ages != women.ages {
            return Err(ForecastError::MismatchedAges);
        }
        Ok(Self { men, women })
    }

    /// Parse a forecast from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::Json`] for malformed JSON or a table that
    /// fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, ForecastError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a forecast from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::Io`] if the file cannot be read, or
    /// [`ForecastError::Json`] if it cannot be parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, ForecastError> {
        let contents = std::fs::read_to_string(path)?;
        let forecast = Self::from_json_str(&contents)?;
        debug!(
            path = %path.display(),
            ages = forecast.ages().len(),
            horizon = forecast.horizon(),
            "Forecast loaded"
        );
        Ok(forecast)
    }

    /// The forecast age columns, ascending. Shared by both sexes.
    pub fn ages(&self) -> &[u32] {
        &self.men.ages
    }

    /// Number of year offsets after the baseline row covered for both sexes.
    pub fn horizon(&self) -> usize {
        self.men
            .rows
            .len()
            .min(self.women.rows.len())
            .saturating_sub(1)
    }

    /// The forecast head-count of one cohort at one year offset.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::MissingEntry`] if the age is not a forecast
    /// column or the year offset is past the last row.
    pub fn target(&self, year_offset: usize, age: u32, sex: Sex) -> Result<i64, ForecastError> {
        let matrix = match sex {
            Sex::Men => &self.men,
            Sex::Women => &self.women,
        };
        matrix
            .get(year_offset, age)
            .ok_or(ForecastError::MissingEntry {
                year_offset,
                age,
                sex,
            })
    }

    /// Check that rows `1..=years` exist for both sexes.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::MissingEntry`] naming the first missing row.
    pub fn validate_horizon(&self, years: usize) -> Result<(), ForecastError> {
        for sex in Sex::ALL {
            let matrix = match sex {
                Sex::Men => &self.men,
                Sex::Women => &self.women,
            };
            if matrix.rows.len() <= years {
                return Err(ForecastError::MissingEntry {
                    year_offset: matrix.rows.len().max(1),
                    age: self.ages().first().copied().unwrap_or(0),
                    sex,
                });
            }
        }
        Ok(())
    }
}

impl TryFrom<ForecastFile> for ForecastedAges {
    type Error = ForecastError;

    fn try_from(file: ForecastFile) -> Result<Self, Self::Error> {
        Self::new(file.men, file.women)
    }
}

impl From<ForecastedAges> for ForecastFile {
    fn from(forecast: ForecastedAges) -> Self {
        Self {
            men: forecast.men,
            women: forecast.women,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn matrix(ages: &[u32], rows: &[&[i64]]) -> AgeMatrix {
        AgeMatrix {
            ages: ages.to_vec(),
            rows: rows.iter().map(|row| row.to_vec()).collect(),
        }
    }

    #[test]
    fn target_looks_up_by_offset_age_and_sex() {
        let forecast = ForecastedAges::new(
            matrix(&[0, 1, 5], &[&[10, 20, 30], &[11, 21, 31]]),
            matrix(&[0, 1, 5], &[&[12, 22, 32], &[13, 23, 33]]),
        )
        .unwrap();

        assert_eq!(forecast.ages(), &[0, 1, 5]);
        assert_eq!(forecast.horizon(), 1);
        assert_eq!(forecast.target(1, 5, Sex::Men).unwrap(), 31);
        assert_eq!(forecast.target(0, 1, Sex::Women).unwrap(), 22);
        assert!(matches!(
            forecast.target(1, 3, Sex::Men),
            Err(ForecastError::MissingEntry { age: 3, .. })
        ));
        assert!(matches!(
            forecast.target(2, 0, Sex::Women),
            Err(ForecastError::MissingEntry { year_offset: 2, .. })
        ));
    }

    #[test]
    fn negative_values_are_kept_as_loaded() {
        let forecast =
            ForecastedAges::new(matrix(&[0], &[&[1], &[-4]]), matrix(&[0], &[&[1], &[2]])).unwrap();
        assert_eq!(forecast.target(1, 0, Sex::Men).unwrap(), -4);
    }

    #[test]
    fn rejects_malformed_tables() {
        let unsorted = ForecastedAges::new(matrix(&[2, 1], &[]), matrix(&[2, 1], &[]));
        assert!(matches!(
            unsorted,
            Err(ForecastError::UnsortedAges { sex: Sex::Men })
        ));

        let mismatched = ForecastedAges::new(matrix(&[0, 1], &[]), matrix(&[0, 2], &[]));
        assert!(matches!(mismatched, Err(ForecastError::MismatchedAges)));

        let ragged = ForecastedAges::new(
            matrix(&[0, 1], &[&[1, 2]]),
            matrix(&[0, 1], &[&[1, 2], &[3]]),
        );
        assert!(matches!(
            ragged,
            Err(ForecastError::RaggedRow {
                sex: Sex::Women,
                year_offset: 1,
                expected: 2,
                found: 1,
            })
        ));
    }

    #[test]
    fn horizon_validation_requires_every_row() {
        let forecast = ForecastedAges::new(
            matrix(&[0], &[&[1], &[2], &[3]]),
            matrix(&[0], &[&[1], &[2]]),
        )
        .unwrap();

        assert!(forecast.validate_horizon(1).is_ok());
        assert!(matches!(
            forecast.validate_horizon(2),
            Err(ForecastError::MissingEntry {
                sex: Sex::Women,
                ..
            })
        ));
    }

    #[test]
    fn parses_json_form() {
        let json = r#"{
            "men":   { "ages": [0, 1], "rows": [[5, 6], [7, 8]] },
            "women": { "ages": [0, 1], "rows": [[1, 2], [3, 4]] }
        }"#;
        let forecast = ForecastedAges::from_json_str(json).unwrap();
        assert_eq!(forecast.target(1, 1, Sex::Women).unwrap(), 4);

        let bad = r#"{
            "men":   { "ages": [1, 0], "rows": [] },
            "women": { "ages": [1, 0], "rows": [] }
        }"#;
        assert!(matches!(
            ForecastedAges::from_json_str(bad),
            Err(ForecastError::Json { .. })
        ));
    }
}
