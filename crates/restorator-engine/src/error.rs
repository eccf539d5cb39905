//! Error types for the forecast runner binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes while loading inputs and running the forecast.

use std::path::PathBuf;

/// Top-level error for the forecast runner binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The starting snapshot could not be loaded.
    #[error("population error: {source}")]
    Population {
        /// The underlying population error.
        #[from]
        source: restorator_population::PopulationError,
    },

    /// The forecast could not be loaded.
    #[error("forecast error: {source}")]
    Forecast {
        /// The underlying forecast error.
        #[from]
        source: restorator_core::forecast::ForecastError,
    },

    /// The forecast run failed.
    #[error("driver error: {source}")]
    Driver {
        /// The underlying driver error.
        #[from]
        source: restorator_core::driver::DriverError,
    },

    /// The output directory could not be prepared.
    #[error("cannot create output directory {}: {source}", path.display())]
    Output {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
