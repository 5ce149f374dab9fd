//! Point-source pollutant dispersion over sampled wind fields.
//!
//! Mass released at a source is carried across a rounded longitude/latitude grid by wind
//! vectors obtained from a [`wind::WindProvider`]. Each [`core::Simulation::step`] emits,
//! prunes, advects in sub-steps and advances the clock; [`core::Simulation::get_status`]
//! exposes the plume as (x, y, mass) records for reporting.
//!
//! With the `python` feature the crate also builds a Python extension module exposing
//! `PlumeSim`.

pub mod core;
pub mod error;
pub mod report;
pub mod wind;

#[cfg(feature = "python")]
mod python;

pub use crate::core::{SimConfig, Simulation};
pub use crate::error::{Error, Result};
