//! Year progression for the population restorator.
//!
//! This crate turns a starting snapshot and a demographic forecast into a
//! sequence of resolved yearly snapshots. Each year clones its predecessor,
//! ages everyone by one year, and hands the result to the balancers in
//! `restorator-balancing` until every cohort matches its forecast.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `restorator-config.yaml` into
//!   strongly-typed structs.
//! - [`forecast`] -- [`ForecastedAges`], the per-sex target matrices indexed
//!   by year offset and age.
//! - [`year`] -- Resolution of one simulated year and its [`YearSummary`].
//! - [`driver`] -- [`forecast_people`], the sequential loop over year slots,
//!   and the [`YearCallback`] continuation.
//!
//! [`ForecastedAges`]: forecast::ForecastedAges
//! [`YearSummary`]: year::YearSummary
//! [`forecast_people`]: driver::forecast_people
//! [`YearCallback`]: driver::YearCallback

pub mod config;
pub mod driver;
pub mod forecast;
pub mod year;
