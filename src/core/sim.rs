use crate::core::advect::Advector;
use crate::core::config::SimConfig;
use crate::core::particle::{bin, BinKey, ParticleState};
use crate::error::{Error, Result};
use crate::report::StatusRecord;
use crate::wind::WindProvider;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};

/// Step controller of a point-source dispersion run.
///
/// Each [`step`](Simulation::step) emits from the source (while its window is open), drops
/// negligible bins, advects the rest through one iteration interval of wind, and advances
/// the clock. A step either completes or leaves the simulation exactly as it was.
#[derive(Debug)]
pub struct Simulation<P> {
    config: SimConfig,
    advector: Advector,
    provider: P,
    source: BinKey,
    time_now: DateTime<Utc>,
    state: ParticleState,
    steps: u64,
    emitted: f64,
    pruned: f64,
}

impl<P: WindProvider> Simulation<P> {
    /// Create a simulation with an empty plume at `config.start_time`.
    ///
    /// Errors: `Error::InvalidParam` for any invalid configuration value.
    pub fn new(config: SimConfig, provider: P) -> Result<Self> {
        let advector = Advector::from_config(&config)?;
        let source = bin(config.source_x, config.source_y, config.precision)?;
        info!(
            "dispersion from ({}, {}) starting {}, {} sub-steps per iteration",
            source.x(),
            source.y(),
            config.start_time,
            advector.substeps()
        );
        Ok(Self {
            time_now: config.start_time,
            config,
            advector,
            provider,
            source,
            state: ParticleState::new(),
            steps: 0,
            emitted: 0.0,
            pruned: 0.0,
        })
    }

    /// Perform one iteration: emit, prune, advect, advance time.
    ///
    /// Errors: any provider or data error. The clock, the plume and the mass ledgers are then
    /// unchanged, so the call can be retried.
    pub fn step(&mut self) -> Result<()> {
        let dt = self.config.iteration_interval;
        let Some(step_end) = self.time_now.checked_add_signed(dt) else {
            warn!("clock at {} cannot advance by {dt}", self.time_now);
            return Err(Error::MathError(format!(
                "clock overflow advancing {} by {dt}",
                self.time_now
            )));
        };

        let mut working = self.state.clone();
        let emission = if self.in_window(step_end) {
            working.merge(self.source, self.config.emission_mass);
            self.config.emission_mass
        } else {
            0.0
        };
        let dropped = working.prune(self.config.prune_threshold);
        let bins: Vec<(BinKey, f64)> = working.iter().map(|(&k, &m)| (k, m)).collect();

        let next = match self
            .advector
            .advect(&self.provider, &bins, self.time_now, dt)
        {
            Ok(next) => next,
            Err(e) => {
                warn!("step at {} failed, state kept: {e}", self.time_now);
                return Err(e);
            }
        };

        self.state = next;
        self.time_now = step_end;
        self.steps += 1;
        self.emitted += emission;
        self.pruned += dropped;
        debug!(
            "step {} -> {}: {} bins, mass {:.6} (emitted {emission}, pruned {dropped:.3e})",
            self.steps,
            self.time_now,
            self.state.len(),
            self.state.total_mass()
        );
        Ok(())
    }

    /// Whether the source releases mass on the next step: true while the end of that step
    /// still lies within `[start_time, end_time]`.
    pub fn source_active(&self) -> bool {
        self.time_now
            .checked_add_signed(self.config.iteration_interval)
            .is_some_and(|step_end| self.in_window(step_end))
    }

    fn in_window(&self, t: DateTime<Utc>) -> bool {
        t >= self.config.start_time && t <= self.config.end_time
    }

    /// Current plume as (x, y, mass) records ordered by x, then y.
    pub fn get_status(&self) -> Vec<StatusRecord> {
        StatusRecord::from_state(&self.state)
    }
}

impl<P> Simulation<P> {
    /// Returns current simulated time.
    pub fn time(&self) -> DateTime<Utc> {
        self.time_now
    }

    /// The plume after the last completed step.
    pub fn state(&self) -> &ParticleState {
        &self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn iteration_interval(&self) -> TimeDelta {
        self.config.iteration_interval
    }

    /// Bin the source emits into.
    pub fn source(&self) -> BinKey {
        self.source
    }

    /// Completed steps.
    pub fn steps_taken(&self) -> u64 {
        self.steps
    }

    /// Mass currently in the plume.
    pub fn total_mass(&self) -> f64 {
        self.state.total_mass()
    }

    /// Cumulative mass released by the source.
    pub fn emitted_mass(&self) -> f64 {
        self.emitted
    }

    /// Cumulative mass discarded by pruning.
    pub fn pruned_mass(&self) -> f64 {
        self.pruned
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wind::{ConstantWind, FieldRecord, WindQuery};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 2, 3, 21, 0, 0).unwrap()
    }

    fn config(hours_active: i64) -> SimConfig {
        SimConfig::new(
            t0(),
            t0() + TimeDelta::hours(hours_active),
            (-80.52, 40.84),
            TimeDelta::hours(1),
            TimeDelta::minutes(30),
        )
    }

    /// Calm wind that can be switched to failing.
    struct Flaky {
        fail: AtomicBool,
    }

    impl WindProvider for Flaky {
        fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Provider("service unavailable".into()));
            }
            ConstantWind::calm().query(query)
        }
    }

    #[test]
    fn starts_empty_at_start_time() -> Result<()> {
        let sim = Simulation::new(config(3), ConstantWind::calm())?;
        assert_eq!(sim.time(), t0());
        assert!(sim.state().is_empty());
        assert!(sim.get_status().is_empty());
        assert_eq!(sim.steps_taken(), 0);
        Ok(())
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let mut cfg = config(3);
        cfg.simulation_interval = TimeDelta::minutes(40);
        assert!(Simulation::new(cfg, ConstantWind::calm()).is_err());
    }

    #[test]
    fn emits_once_per_active_step() -> Result<()> {
        let mut sim = Simulation::new(config(3), ConstantWind::calm())?;
        for _ in 0..5 {
            sim.step()?;
        }
        assert_eq!(sim.time(), t0() + TimeDelta::hours(5));
        assert!((sim.emitted_mass() - 3.0).abs() < 1e-12);
        assert!((sim.total_mass() - 3.0).abs() < 1e-9);
        assert_eq!(sim.state().len(), 1);
        Ok(())
    }

    #[test]
    fn failed_step_changes_nothing() -> Result<()> {
        let provider = Flaky {
            fail: AtomicBool::new(false),
        };
        let mut sim = Simulation::new(config(3), provider)?;
        sim.step()?;
        let before = sim.state().clone();

        sim.provider().fail.store(true, Ordering::SeqCst);
        let err = sim.step().unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(sim.time(), t0() + TimeDelta::hours(1));
        assert_eq!(sim.state(), &before);
        assert_eq!(sim.steps_taken(), 1);
        assert_eq!(sim.emitted_mass(), 1.0);

        // Retrying once the provider recovers proceeds normally.
        sim.provider().fail.store(false, Ordering::SeqCst);
        sim.step()?;
        assert_eq!(sim.steps_taken(), 2);
        assert!((sim.total_mass() - 2.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn clock_overflow_is_an_error() -> Result<()> {
        // Two such iterations from 2023 pass the largest representable date.
        let iteration = TimeDelta::days(365 * 200_000);
        let cfg = SimConfig::new(t0(), t0() + iteration, (0.0, 0.0), iteration, iteration);
        let mut sim = Simulation::new(cfg, ConstantWind::calm())?;
        sim.step()?;
        let time = sim.time();
        assert!(!sim.source_active());

        let err = sim.step().unwrap_err();
        assert!(matches!(err, Error::MathError(_)));
        assert_eq!(sim.time(), time);
        assert_eq!(sim.steps_taken(), 1);
        assert_eq!(sim.total_mass(), 1.0);
        Ok(())
    }
}
