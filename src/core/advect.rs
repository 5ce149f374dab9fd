use crate::core::config::{SimConfig, WindFields};
use crate::core::particle::{bin, BinKey, ParticleState};
use crate::error::{Error, Result};
use crate::wind::{fetch_wind, WindProvider, WindVector};
use chrono::{DateTime, TimeDelta, Utc};
use log::trace;
use rayon::prelude::*;

/// Meters spanned by one degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Degrees of displacement per sub-step per m/s of wind, on each axis.
///
/// Fixed once from the source latitude, so longitude compression is that of the source row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementScale {
    pub x: f64,
    pub y: f64,
}

impl MovementScale {
    /// Errors: `Error::InvalidParam` if the sub-step is non-positive or the latitude is polar.
    pub fn new(latitude: f64, substep: TimeDelta) -> Result<Self> {
        let micros = substep
            .num_microseconds()
            .filter(|&us| us > 0)
            .ok_or_else(|| Error::InvalidParam("sub-step must be positive".into()))?;
        if !latitude.is_finite() || latitude.abs() >= 90.0 {
            return Err(Error::InvalidParam(format!(
                "no longitude scale at latitude {latitude}"
            )));
        }
        let secs = micros as f64 / 1e6;
        let cos_lat = latitude.to_radians().cos();
        Ok(Self {
            x: secs / (METERS_PER_DEGREE * cos_lat),
            y: secs / METERS_PER_DEGREE,
        })
    }
}

/// Moves (coordinate, mass) pairs through one macro step of wind.
///
/// Coordinates are queried in batches of at most `max_batch_size`; each batch produces its
/// own partial state and the partials merge by binning, so batch boundaries do not show in
/// the result beyond floating-point summation order.
#[derive(Debug, Clone)]
pub struct Advector {
    scale: MovementScale,
    substeps: u32,
    precision: u32,
    max_batch_size: usize,
    fields: WindFields,
    parallel: bool,
}

impl Advector {
    /// Build from a configuration. Validates the parts it depends on.
    pub fn from_config(cfg: &SimConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            scale: MovementScale::new(cfg.source_y, cfg.simulation_interval)?,
            substeps: cfg.substeps()?,
            precision: cfg.precision,
            max_batch_size: cfg.max_batch_size,
            fields: cfg.wind_fields.clone(),
            parallel: cfg.parallel_batches,
        })
    }

    pub fn scale(&self) -> MovementScale {
        self.scale
    }

    pub fn substeps(&self) -> u32 {
        self.substeps
    }

    /// Same advector with a different batch bound.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Result<Self> {
        if max_batch_size == 0 {
            return Err(Error::InvalidParam("max_batch_size must be > 0".into()));
        }
        self.max_batch_size = max_batch_size;
        Ok(self)
    }

    /// Advect `bins` over the window `[start, start + duration]`.
    ///
    /// On error no partial result is returned; the caller keeps whatever state it had.
    pub fn advect<P: WindProvider + ?Sized>(
        &self,
        provider: &P,
        bins: &[(BinKey, f64)],
        start: DateTime<Utc>,
        duration: TimeDelta,
    ) -> Result<ParticleState> {
        if bins.is_empty() {
            return Ok(ParticleState::new());
        }
        let run = |batch: &[(BinKey, f64)]| self.advect_batch(provider, batch, start, duration);
        if self.parallel {
            bins.par_chunks(self.max_batch_size)
                .map(run)
                .try_reduce(ParticleState::new, |mut acc, part| {
                    acc.absorb(part);
                    Ok(acc)
                })
        } else {
            let mut out = ParticleState::new();
            for batch in bins.chunks(self.max_batch_size) {
                out.absorb(run(batch)?);
            }
            Ok(out)
        }
    }

    fn advect_batch<P: WindProvider + ?Sized>(
        &self,
        provider: &P,
        batch: &[(BinKey, f64)],
        start: DateTime<Utc>,
        duration: TimeDelta,
    ) -> Result<ParticleState> {
        let coords: Vec<(f64, f64)> = batch.iter().map(|(k, _)| (k.x(), k.y())).collect();
        let winds = fetch_wind(provider, &coords, start, duration, &self.fields)?;
        trace!("advecting batch of {} bins", batch.len());

        let mut out = ParticleState::new();
        for (&(x, y), (&(_, mass), wind)) in coords.iter().zip(batch.iter().zip(&winds)) {
            self.smear(&mut out, x, y, mass, wind)?;
        }
        Ok(out)
    }

    /// Spread `mass` evenly over the sub-step positions along the wind vector.
    fn smear(
        &self,
        out: &mut ParticleState,
        x: f64,
        y: f64,
        mass: f64,
        wind: &WindVector,
    ) -> Result<()> {
        let share = mass / f64::from(self.substeps);
        let step_x = self.scale.x * wind.u;
        let step_y = self.scale.y * wind.v;
        for i in 1..=self.substeps {
            let i = f64::from(i);
            let key = bin(x + i * step_x, y + i * step_y, self.precision)?;
            out.merge(key, share);
        }
        Ok(())
    }
}
