//! Configuration loading and typed config structures for the restorator.
//!
//! The configuration lives in `restorator-config.yaml` in the working
//! directory, or at the path named by `RESTORATOR_CONFIG`. Every section and
//! field is optional; missing values fall back to the defaults below, and a
//! missing file yields the default configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "RESTORATOR_CONFIG";

/// Configuration file used when [`CONFIG_PATH_ENV`] is not set.
pub const DEFAULT_CONFIG_PATH: &str = "restorator-config.yaml";

/// Environment variable overriding `run.seed`.
pub const SEED_ENV: &str = "RESTORATOR_SEED";

/// Environment variable overriding `output.directory`.
pub const OUTPUT_DIR_ENV: &str = "RESTORATOR_OUTPUT_DIR";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for environment variable {name}")]
    InvalidOverride {
        /// The environment variable.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level forecast run configuration.
///
/// Mirrors the structure of `restorator-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ForecastConfig {
    /// Which years to simulate and how to seed the random source.
    #[serde(default)]
    pub run: RunConfig,

    /// Input file locations.
    #[serde(default)]
    pub input: InputConfig,

    /// Export settings for resolved years.
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ForecastConfig {
    /// Load configuration from `RESTORATOR_CONFIG`, or from
    /// `restorator-config.yaml` when the variable is unset.
    ///
    /// A missing file is not an error; the defaults are used with
    /// environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::from_file`], or
    /// [`ConfigError::InvalidOverride`] for a malformed override.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        if path.exists() {
            Self::from_file(&path)
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides()?;
            Ok(config)
        }
    }

    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `RESTORATOR_SEED` overrides `run.seed`
    /// - `RESTORATOR_OUTPUT_DIR` overrides `output.directory`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] for a malformed override.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] for a malformed override.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `RESTORATOR_SEED` and `RESTORATOR_OUTPUT_DIR` from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if the seed is not a `u64`.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if the seed is not a `u64`.
    pub fn apply_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup(SEED_ENV) {
            let seed = val
                .trim()
                .parse::<u64>()
                .map_err(|_err| ConfigError::InvalidOverride {
                    name: SEED_ENV,
                    value: val.clone(),
                })?;
            self.run.seed = Some(seed);
        }
        if let Some(val) = lookup(OUTPUT_DIR_ENV) {
            self.output.directory = PathBuf::from(val);
        }
        Ok(())
    }
}

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Calendar year of the starting snapshot. Year offset `i` is labelled
    /// `base_year + i`.
    #[serde(default = "default_base_year")]
    pub base_year: i32,

    /// Number of years to simulate. `None` runs every year the forecast
    /// covers.
    #[serde(default)]
    pub years: Option<usize>,

    /// Seed for the random source. `None` seeds from the clock.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_year: default_base_year(),
            years: None,
            seed: None,
        }
    }
}

/// Input file configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputConfig {
    /// JSON file holding the starting snapshot and its social group catalog.
    #[serde(default = "default_start_snapshot")]
    pub start_snapshot: PathBuf,

    /// JSON file holding the forecast matrices.
    #[serde(default = "default_forecast")]
    pub forecast: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            start_snapshot: default_start_snapshot(),
            forecast: default_forecast(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// Directory resolved years are written to.
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// File name prefix; each year is written to `<prefix>_<year>.json`.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Whether to pretty-print the JSON output.
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl OutputConfig {
    /// Path of the file for one calendar year.
    pub fn year_path(&self, year: i32) -> PathBuf {
        self.directory
            .join(format!("{}_{year}.json", self.file_prefix))
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            file_prefix: default_file_prefix(),
            pretty: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_base_year() -> i32 {
    2024
}

fn default_start_snapshot() -> PathBuf {
    PathBuf::from("data/start_snapshot.json")
}

fn default_forecast() -> PathBuf {
    PathBuf::from("data/forecast.json")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

fn default_file_prefix() -> String {
    String::from("population")
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ForecastConfig::default();
        assert_eq!(config.run.base_year, 2024);
        assert_eq!(config.run.years, None);
        assert_eq!(config.input.forecast, PathBuf::from("data/forecast.json"));
        assert_eq!(config.output.file_prefix, "population");
        assert!(config.output.pretty);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
run:
  base_year: 2030
  years: 5
  seed: 99

input:
  start_snapshot: "fixtures/start.json"
  forecast: "fixtures/forecast.json"

output:
  directory: "out"
  file_prefix: "region"
  pretty: false

logging:
  level: "debug"
  format: json
"#;
        let config: ForecastConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.run.base_year, 2030);
        assert_eq!(config.run.years, Some(5));
        assert_eq!(config.run.seed, Some(99));
        assert_eq!(config.input.start_snapshot, PathBuf::from("fixtures/start.json"));
        assert_eq!(config.output.directory, PathBuf::from("out"));
        assert!(!config.output.pretty);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "run:\n  base_year: 2001\n";
        let config: ForecastConfig = serde_yml::from_str(yaml).unwrap();

        // Base year is overridden
        assert_eq!(config.run.base_year, 2001);
        // Everything else uses defaults
        assert_eq!(config.output, OutputConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn parse_empty_yaml() {
        let config = ForecastConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn malformed_yaml_is_rejected() {
        let config = ForecastConfig::parse("run: [1, 2");
        assert!(matches!(config, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn year_path_joins_prefix_and_year() {
        let output = OutputConfig {
            directory: PathBuf::from("out"),
            file_prefix: String::from("region"),
            pretty: true,
        };
        assert_eq!(output.year_path(2031), Path::new("out").join("region_2031.json"));
    }

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned())
        }
    }

    #[test]
    fn seed_override_replaces_yaml_seed() {
        let mut config: ForecastConfig = serde_yml::from_str("run:\n  seed: 1\n").unwrap();
        config
            .apply_overrides_from(env(&[(SEED_ENV, " 4242 ")]))
            .unwrap();
        assert_eq!(config.run.seed, Some(4242));
    }

    #[test]
    fn malformed_seed_override_is_rejected() {
        let mut config = ForecastConfig::default();
        let result = config.apply_overrides_from(env(&[(SEED_ENV, "forty-two")]));
        match result {
            Err(ConfigError::InvalidOverride { name, value }) => {
                assert_eq!(name, SEED_ENV);
                assert_eq!(value, "forty-two");
            }
            other => panic!("Expected InvalidOverride, got {other:?}"),
        }
        assert_eq!(config.run.seed, None);
    }

    #[test]
    fn output_dir_override_replaces_directory() {
        let mut config = ForecastConfig::default();
        config
            .apply_overrides_from(env(&[(OUTPUT_DIR_ENV, "/srv/forecast")]))
            .unwrap();
        assert_eq!(config.output.directory, PathBuf::from("/srv/forecast"));
        assert_eq!(config.run.seed, None);
    }

    #[test]
    fn no_overrides_leave_config_unchanged() {
        let mut config = ForecastConfig::default();
        config.apply_overrides_from(env(&[])).unwrap();
        assert_eq!(config, ForecastConfig::default());
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join(DEFAULT_CONFIG_PATH);
        if path.exists() {
            let config = ForecastConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
