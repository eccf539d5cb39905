//! Year progression driver.
//!
//! [`forecast_people`] walks the year slots in order. Each slot is filled
//! with the snapshot [`resolve_year`] derives from the previous one, and the
//! committed snapshot is then handed to a [`YearCallback`]. A year that
//! fails stops the run; its slot and every later slot stay empty.
//!
//! [`resolve_year`]: crate::year::resolve_year

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use restorator_balancing::BalanceError;
use restorator_population::{PopulationError, PopulationStore};

use crate::forecast::ForecastedAges;
use crate::year::{self, YearSummary};

/// Errors that can occur during a forecast run.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The starting snapshot or forecast cannot drive the requested run.
    /// Raised before any year is simulated.
    #[error("invalid input: {reason}")]
    Input {
        /// What is wrong with the input.
        reason: String,
    },

    /// A year's snapshot violated an invariant.
    #[error("consistency fault in year offset {year_offset}: {reason}")]
    Consistency {
        /// Year offset that failed.
        year_offset: usize,
        /// Description of the violation.
        reason: String,
    },

    /// A balancer failed.
    #[error("balancing failed in year offset {year_offset}: {source}")]
    Balance {
        /// Year offset that failed.
        year_offset: usize,
        /// The underlying balancer error.
        source: BalanceError,
    },

    /// The population store rejected an operation.
    #[error("population store error: {source}")]
    Population {
        /// The underlying store error.
        #[from]
        source: PopulationError,
    },

    /// The year callback asked to stop the run.
    #[error("year callback failed at year offset {year_offset}: {source}")]
    Callback {
        /// Year offset whose callback failed.
        year_offset: usize,
        /// The callback's error.
        source: CallbackError,
    },
}

/// Error returned by a [`YearCallback`] to abort the run.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct CallbackError {
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl CallbackError {
    /// Wrap any error (or message) as a callback failure.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// One entry of the year sequence.
///
/// A slot starts empty, optionally labelled with a calendar year, and is
/// filled exactly once when its year resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearSlot<S> {
    year: Option<i32>,
    snapshot: Option<S>,
}

impl<S> YearSlot<S> {
    /// An unlabelled, empty slot.
    pub const fn new() -> Self {
        Self {
            year: None,
            snapshot: None,
        }
    }

    /// An empty slot labelled with a calendar year.
    ///
    /// For callers that build their own year sequence instead of using
    /// [`YearSlot::sequence`], for example with gaps between labels.
    pub const fn labelled(year: i32) -> Self {
        Self {
            year: Some(year),
            snapshot: None,
        }
    }

    /// Slots for `count` consecutive calendar years after `base_year`.
    pub fn sequence(base_year: i32, count: usize) -> Vec<Self> {
        (1..=count)
            .map(|offset| {
                let year = i32::try_from(offset)
                    .ok()
                    .and_then(|offset| base_year.checked_add(offset));
                Self {
                    year,
                    snapshot: None,
                }
            })
            .collect()
    }

    /// The calendar year label.
    pub const fn year(&self) -> Option<i32> {
        self.year
    }

    /// The resolved snapshot, if the year has completed.
    pub const fn snapshot(&self) -> Option<&S> {
        self.snapshot.as_ref()
    }

    /// Returns `true` once the year has resolved.
    pub const fn is_resolved(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Take the resolved snapshot out of the slot.
    ///
    /// Lets a library caller keep the resolved years once the run has
    /// released its borrow of the slots.
    pub fn into_snapshot(self) -> Option<S> {
        self.snapshot
    }

    fn commit(&mut self, snapshot: S) -> &S {
        self.snapshot.insert(snapshot)
    }
}

impl<S> Default for YearSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuation invoked after each year is committed.
///
/// The snapshot is the one now stored in the year's slot; it can be read
/// but not changed. Returning an error aborts the run.
pub trait YearCallback<S> {
    /// Called after a year resolves and is committed to its slot.
    ///
    /// # Errors
    ///
    /// Any error stops the run with [`DriverError::Callback`].
    fn on_year(&mut self, summary: &YearSummary, snapshot: &S) -> Result<(), CallbackError>;
}

/// A no-op year callback for testing.
pub struct NoOpCallback;

impl<S> YearCallback<S> for NoOpCallback {
    fn on_year(&mut self, _summary: &YearSummary, _snapshot: &S) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Summary of every resolved year, in order.
    pub years: Vec<YearSummary>,
}

impl RunSummary {
    /// The last resolved year, if any.
    pub fn last(&self) -> Option<&YearSummary> {
        self.years.last()
    }
}

/// Resolve one snapshot per year slot, starting from `start`.
///
/// Slot `i` (0-based) is resolved against forecast row `i + 1`. When `rng`
/// is `None` a generator is seeded from the current time.
///
/// # Errors
///
/// - [`DriverError::Input`] if the catalog has no primary group or the
///   forecast does not cover every slot. Nothing is simulated.
/// - Any error of [`year::resolve_year`] for the failing year.
/// - [`DriverError::Callback`] if the callback aborts.
///
/// Slots before the failing year stay filled; the failing slot and every
/// later one stay empty.
pub fn forecast_people<'a, S>(
    start: &'a S,
    forecast: &ForecastedAges,
    year_slots: &'a mut [YearSlot<S>],
    rng: Option<&mut dyn RngCore>,
    callback: &mut dyn YearCallback<S>,
) -> Result<RunSummary, DriverError>
where
    S: PopulationStore + Clone,
{
    start
        .catalog()
        .ensure_primary()
        .map_err(|err| DriverError::Input {
            reason: err.to_string(),
        })?;
    forecast
        .validate_horizon(year_slots.len())
        .map_err(|err| DriverError::Input {
            reason: err.to_string(),
        })?;

    let max_age = start.max_age().unwrap_or_default();
    let mut fallback: StdRng;
    let rng: &mut dyn RngCore = match rng {
        Some(rng) => rng,
        None => {
            fallback = StdRng::seed_from_u64(clock_seed());
            &mut fallback
        }
    };

    info!(
        years = year_slots.len(),
        max_age,
        forecast_ages = forecast.ages().len(),
        "Forecast run starting"
    );

    let mut summaries = Vec::with_capacity(year_slots.len());
    let mut previous: &'a S = start;
    let mut remaining: &'a mut [YearSlot<S>] = year_slots;
    let mut year_offset: usize = 0;

    while let Some((slot, rest)) = core::mem::take(&mut remaining).split_first_mut() {
        remaining = rest;
        year_offset = year_offset.saturating_add(1);

        let (resolved, summary) = year::resolve_year(
            previous,
            year_offset,
            slot.year(),
            forecast,
            max_age,
            &mut *rng,
        )?;

        let committed = slot.commit(resolved);
        debug!(year_offset, year = ?summary.year, "Year committed");
        callback
            .on_year(&summary, committed)
            .map_err(|source| DriverError::Callback {
                year_offset,
                source,
            })?;

        previous = committed;
        summaries.push(summary);
    }

    Ok(RunSummary { years: summaries })
}

/// Log the final state of a run.
pub fn log_run_end(result: &RunSummary) {
    if let Some(last) = result.last() {
        info!(
            years = result.years.len(),
            final_year = ?last.year,
            men = last.men,
            women = last.women,
            additional = last.additional,
            "Forecast run complete"
        );
    } else {
        warn!("Forecast run ended with no years simulated");
    }
}

/// Seed derived from the current Unix time.
fn clock_seed() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use restorator_population::Snapshot;

    use super::*;

    #[test]
    fn sequence_labels_consecutive_years() {
        let slots: Vec<YearSlot<Snapshot>> = YearSlot::sequence(2020, 3);
        let years: Vec<Option<i32>> = slots.iter().map(YearSlot::year).collect();
        assert_eq!(years, vec![Some(2021), Some(2022), Some(2023)]);
        assert!(slots.iter().all(|slot| !slot.is_resolved()));
    }

    #[test]
    fn commit_fills_slot_once() {
        let mut slot: YearSlot<u32> = YearSlot::labelled(1999);
        assert_eq!(slot.snapshot(), None);
        assert_eq!(*slot.commit(7), 7);
        assert!(slot.is_resolved());
        assert_eq!(slot.year(), Some(1999));
        assert_eq!(slot.into_snapshot(), Some(7));
    }

    #[test]
    fn callback_error_keeps_message() {
        let err = CallbackError::new("disk full");
        assert_eq!(err.to_string(), "disk full");
    }
}
