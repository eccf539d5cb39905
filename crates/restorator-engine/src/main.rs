//! Forecast runner binary for the population restorator.
//!
//! This is the main entry point that wires the configuration, the input
//! files, and the year progression driver together, and exports every
//! resolved year as JSON.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `restorator-config.yaml` (or
//!    `RESTORATOR_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Load the starting snapshot and its social group catalog
//! 4. Load the forecast matrices
//! 5. Create one year slot per simulated year
//! 6. Prepare the output directory
//! 7. Run the driver with the JSON export callback
//! 8. Log the result

mod error;
mod export_callback;

use anyhow::Context as _;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use restorator_core::config::{ForecastConfig, LogFormat, LoggingConfig};
use restorator_core::driver::{self, RunSummary, YearSlot};
use restorator_core::forecast::ForecastedAges;
use restorator_population::Snapshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::export_callback::JsonExportCallback;

/// Application entry point for the forecast runner.
///
/// # Errors
///
/// Returns an error if configuration, input loading, or the run fails.
fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = ForecastConfig::load().context("failed to load configuration")?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("restorator-engine starting");
    info!(
        base_year = config.run.base_year,
        years = ?config.run.years,
        seeded = config.run.seed.is_some(),
        output = %config.output.directory.display(),
        "Configuration loaded"
    );

    let result = run(&config).context("forecast run failed")?;

    // 8. Log results.
    driver::log_run_end(&result);
    info!(years = result.years.len(), "restorator-engine shutdown complete");
    Ok(())
}

/// Steps 3 through 7 of the startup sequence.
fn run(config: &ForecastConfig) -> Result<RunSummary, EngineError> {
    // 3. Load the starting snapshot.
    let start = Snapshot::from_json_file(&config.input.start_snapshot)?;
    info!(path = %config.input.start_snapshot.display(), "Starting snapshot loaded");

    // 4. Load the forecast.
    let forecast = ForecastedAges::from_json_file(&config.input.forecast)?;
    info!(
        path = %config.input.forecast.display(),
        ages = forecast.ages().len(),
        horizon = forecast.horizon(),
        "Forecast loaded"
    );

    // 5. Create year slots.
    let years = config.run.years.unwrap_or_else(|| forecast.horizon());
    let mut slots = YearSlot::sequence(config.run.base_year, years);

    // 6. Prepare the output directory.
    std::fs::create_dir_all(&config.output.directory).map_err(|source| EngineError::Output {
        path: config.output.directory.clone(),
        source,
    })?;

    // 7. Run the driver.
    let mut callback = JsonExportCallback::new(config.output.clone());
    let mut seeded = config.run.seed.map(StdRng::seed_from_u64);
    let rng = seeded.as_mut().map(|rng| rng as &mut dyn RngCore);
    let result = driver::forecast_people(&start, &forecast, &mut slots, rng, &mut callback)?;

    info!(files = callback.written().len(), "Export complete");
    Ok(result)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
