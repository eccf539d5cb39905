//! Year callback that exports each resolved year as JSON.
//!
//! After each year is committed, this callback writes the snapshot to
//! `<directory>/<prefix>_<year>.json`. A failed write aborts the run, so
//! the files on disk always form an unbroken sequence of years.

use std::path::PathBuf;

use restorator_core::config::OutputConfig;
use restorator_core::driver::{CallbackError, YearCallback};
use restorator_core::year::YearSummary;
use restorator_population::Snapshot;
use tracing::info;

/// Callback that writes every resolved year to the output directory.
pub struct JsonExportCallback {
    output: OutputConfig,
    written: Vec<PathBuf>,
}

impl JsonExportCallback {
    /// Create an export callback for the given output settings.
    pub const fn new(output: OutputConfig) -> Self {
        Self {
            output,
            written: Vec::new(),
        }
    }

    /// Files written so far, in year order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl YearCallback<Snapshot> for JsonExportCallback {
    fn on_year(&mut self, summary: &YearSummary, snapshot: &Snapshot) -> Result<(), CallbackError> {
        let year = summary.year.ok_or_else(|| {
            CallbackError::new(format!(
                "year offset {} has no calendar year to name its file",
                summary.year_offset
            ))
        })?;
        let path = self.output.year_path(year);
        snapshot
            .write_json_file(&path, self.output.pretty)
            .map_err(CallbackError::new)?;

        info!(year, path = %path.display(), "Year exported");
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use restorator_population::{PopulationStore, SocialGroupCatalog};
    use restorator_types::{CohortKey, PopulationRow, Sex, SocialGroup, SocialGroupId};
    use rust_decimal_macros::dec;

    use super::*;

    fn snapshot() -> Snapshot {
        let catalog = SocialGroupCatalog::new([SocialGroup {
            id: SocialGroupId::new(1),
            name: "everyone".to_owned(),
            is_primary: true,
            parent: None,
            default_share: dec!(1),
        }])
        .unwrap();
        Snapshot::from_rows(
            catalog,
            [PopulationRow {
                age: 0,
                sex: Sex::Women,
                social_group_id: SocialGroupId::new(1),
                count: 12,
            }],
        )
        .unwrap()
    }

    fn summary(year: Option<i32>) -> YearSummary {
        YearSummary {
            year_offset: 1,
            year,
            men: 0,
            women: 12,
            additional: 0,
            cohorts_balanced: 2,
            cohorts_repaired: 0,
        }
    }

    fn output(directory: &Path) -> OutputConfig {
        OutputConfig {
            directory: directory.to_path_buf(),
            file_prefix: String::from("test"),
            pretty: false,
        }
    }

    #[test]
    fn writes_one_file_per_year() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = JsonExportCallback::new(output(dir.path()));

        callback.on_year(&summary(Some(2031)), &snapshot()).unwrap();

        let expected = dir.path().join("test_2031.json");
        assert_eq!(callback.written(), &[expected.clone()]);
        let loaded = Snapshot::from_json_file(&expected).unwrap();
        assert_eq!(
            loaded
                .read_cohort(CohortKey::new(0, Sex::Women))
                .get(&SocialGroupId::new(1)),
            Some(&12)
        );

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&expected).unwrap()).unwrap();
        assert!(raw.get("social_groups").is_some());
        assert!(raw.get("rows").is_some());
    }

    #[test]
    fn unlabelled_year_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = JsonExportCallback::new(output(dir.path()));

        let result = callback.on_year(&summary(None), &snapshot());
        assert!(result.is_err());
        assert!(callback.written().is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = JsonExportCallback::new(output(&dir.path().join("not-created")));

        let result = callback.on_year(&summary(Some(2040)), &snapshot());
        assert!(result.is_err());
        assert!(callback.written().is_empty());
    }
}
