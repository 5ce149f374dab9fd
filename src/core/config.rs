use crate::core::particle::MAX_PRECISION;
use crate::error::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default decimal digits kept when binning coordinates (~100 m at the equator).
pub const DEFAULT_PRECISION: u32 = 3;
/// Default mass below which a bin is discarded before advection.
pub const DEFAULT_PRUNE_THRESHOLD: f64 = 1e-4;
/// Default number of coordinates per wind query.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 2500;

/// Names of the two wind components requested from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindFields {
    /// Eastward component (m/s).
    pub u: String,
    /// Northward component (m/s).
    pub v: String,
}

impl Default for WindFields {
    fn default() -> Self {
        Self {
            u: "wind_u".into(),
            v: "wind_v".into(),
        }
    }
}

impl WindFields {
    /// Both names in request order (u, v).
    pub fn names(&self) -> [&str; 2] {
        [self.u.as_str(), self.v.as_str()]
    }
}

/// Construction-time configuration of a dispersion run.
///
/// In JSON, timestamps are RFC 3339 strings and intervals are whole seconds. Everything
/// after `simulation_interval` may be omitted and takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Initial clock value and start of the source's active window.
    pub start_time: DateTime<Utc>,
    /// End of the source's active window (inclusive).
    pub end_time: DateTime<Utc>,
    /// Source longitude.
    pub source_x: f64,
    /// Source latitude; also fixes the longitude movement scale.
    pub source_y: f64,
    /// Macro step: clock advance per `step()`.
    #[serde(with = "seconds")]
    pub iteration_interval: TimeDelta,
    /// Micro step used for sub-stepped advection; must divide the macro step.
    #[serde(with = "seconds")]
    pub simulation_interval: TimeDelta,
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Mass released by the source on each active step.
    #[serde(default = "default_emission_mass")]
    pub emission_mass: f64,
    #[serde(default)]
    pub wind_fields: WindFields,
    /// Query batches concurrently on the rayon pool.
    #[serde(default)]
    pub parallel_batches: bool,
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

fn default_prune_threshold() -> f64 {
    DEFAULT_PRUNE_THRESHOLD
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_emission_mass() -> f64 {
    1.0
}

impl SimConfig {
    /// Configuration with every optional knob at its default.
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        source: (f64, f64),
        iteration_interval: TimeDelta,
        simulation_interval: TimeDelta,
    ) -> Self {
        Self {
            start_time,
            end_time,
            source_x: source.0,
            source_y: source.1,
            iteration_interval,
            simulation_interval,
            precision: DEFAULT_PRECISION,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            emission_mass: default_emission_mass(),
            wind_fields: WindFields::default(),
            parallel_batches: false,
        }
    }

    /// Load a configuration from a JSON file. The result is not yet validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check every invariant the engine relies on.
    ///
    /// Errors: `Error::InvalidParam` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.end_time < self.start_time {
            return Err(Error::InvalidParam(
                "end_time must not be earlier than start_time".into(),
            ));
        }
        if !self.source_x.is_finite() || !self.source_y.is_finite() {
            return Err(Error::InvalidParam("source coordinates must be finite".into()));
        }
        if self.source_y.abs() >= 90.0 {
            return Err(Error::InvalidParam(
                "source latitude must lie strictly between -90 and 90".into(),
            ));
        }
        if self.precision == 0 || self.precision > MAX_PRECISION {
            return Err(Error::InvalidParam(format!(
                "precision must be in 1..={MAX_PRECISION}"
            )));
        }
        if !self.prune_threshold.is_finite() || self.prune_threshold < 0.0 {
            return Err(Error::InvalidParam(
                "prune_threshold must be finite and >= 0".into(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(Error::InvalidParam("max_batch_size must be > 0".into()));
        }
        if !self.emission_mass.is_finite() || self.emission_mass < 0.0 {
            return Err(Error::InvalidParam(
                "emission_mass must be finite and >= 0".into(),
            ));
        }
        if self.wind_fields.u.is_empty() || self.wind_fields.v.is_empty() {
            return Err(Error::InvalidParam("wind field names must be non-empty".into()));
        }
        self.substeps()?;
        let first_step_end = self
            .start_time
            .checked_add_signed(self.iteration_interval)
            .ok_or_else(|| Error::InvalidParam("start_time + iteration_interval overflows".into()))?;
        if self.end_time < first_step_end {
            return Err(Error::InvalidParam(
                "end_time must be at least one iteration_interval after start_time".into(),
            ));
        }
        Ok(())
    }

    /// Number of micro steps per macro step.
    ///
    /// Errors: `Error::InvalidParam` if either interval is non-positive or the macro step is
    /// not a whole multiple of the micro step.
    pub fn substeps(&self) -> Result<u32> {
        let macro_us = positive_micros(self.iteration_interval, "iteration_interval")?;
        let micro_us = positive_micros(self.simulation_interval, "simulation_interval")?;
        if macro_us % micro_us != 0 {
            return Err(Error::InvalidParam(format!(
                "iteration_interval ({}s) is not an integer multiple of simulation_interval ({}s)",
                macro_us as f64 / 1e6,
                micro_us as f64 / 1e6
            )));
        }
        u32::try_from(macro_us / micro_us)
            .map_err(|_| Error::InvalidParam("too many sub-steps per iteration".into()))
    }
}

fn positive_micros(d: TimeDelta, name: &str) -> Result<i64> {
    match d.num_microseconds() {
        Some(us) if us > 0 => Ok(us),
        _ => Err(Error::InvalidParam(format!(
            "{name} must be positive and at least one microsecond"
        ))),
    }
}

/// Serde adapter storing a `TimeDelta` as whole seconds.
mod seconds {
    use chrono::TimeDelta;
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
        if d.subsec_nanos() != 0 {
            return Err(ser::Error::custom(format!(
                "interval {d} is not a whole number of seconds"
            )));
        }
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TimeDelta, D::Error> {
        let secs = i64::deserialize(d)?;
        TimeDelta::try_seconds(secs)
            .ok_or_else(|| de::Error::custom(format!("interval of {secs}s is out of range")))
    }
}
