mod common;

use chrono::TimeDelta;
use common::{t0, Breakable, Fault};
use plumesim::core::particle::bin;
use plumesim::error::{Error, Result};
use plumesim::report::StatusRecord;
use plumesim::wind::ConstantWind;
use plumesim::{SimConfig, Simulation};

fn one_iteration_source(substeps: i32) -> SimConfig {
    let iteration = TimeDelta::hours(2);
    SimConfig::new(
        t0(),
        t0() + iteration,
        (0.0, 0.0),
        iteration,
        iteration / substeps,
    )
}

/// A single emission under calm wind stays put at the source, and no more mass is released
/// once the window has closed.
#[test]
fn single_emission_without_wind() -> Result<()> {
    let mut sim = Simulation::new(one_iteration_source(2), ConstantWind::calm())?;

    sim.step()?;
    assert_eq!(
        sim.get_status(),
        vec![StatusRecord {
            x: 0.0,
            y: 0.0,
            mass: 1.0
        }]
    );

    sim.step()?;
    assert_eq!(
        sim.get_status(),
        vec![StatusRecord {
            x: 0.0,
            y: 0.0,
            mass: 1.0
        }]
    );
    assert_eq!(sim.emitted_mass(), 1.0);
    Ok(())
}

/// Uniform eastward wind with two sub-steps splits the unit into two half-mass bins at
/// distinct positive x.
#[test]
fn uniform_eastward_wind_splits_into_two_bins() -> Result<()> {
    let mut sim = Simulation::new(one_iteration_source(2), ConstantWind::new(10.0, 0.0))?;
    sim.step()?;

    let status = sim.get_status();
    assert_eq!(status.len(), 2);
    for rec in &status {
        assert!(rec.x > 0.0);
        assert_eq!(rec.y, 0.0);
        assert_eq!(rec.mass, 0.5);
    }
    assert!(status[0].x < status[1].x);

    // One hour at 10 m/s is 36 km, about 0.323 degrees at the equator.
    let first = bin(0.323, 0.0, 3)?;
    let second = bin(0.647, 0.0, 3)?;
    assert_eq!(sim.state().mass_at(&first), 0.5);
    assert_eq!(sim.state().mass_at(&second), 0.5);
    Ok(())
}

/// A record lacking a wind component fails the step and leaves time and state bit-identical.
#[test]
fn provider_missing_field_aborts_the_step() -> Result<()> {
    let iteration = TimeDelta::hours(4);
    let cfg = SimConfig::new(
        t0(),
        t0() + iteration * 10,
        (0.0, 0.0),
        iteration,
        TimeDelta::hours(1),
    );
    let provider = Breakable::new(ConstantWind::new(3.0, 1.0), Fault::MissingField);
    let mut sim = Simulation::new(cfg, provider)?;
    for _ in 0..3 {
        sim.step()?;
    }
    assert!(sim.state().len() > 4, "need a multi-coordinate batch");

    let time = sim.time();
    let bits: Vec<(u64, u64, u64)> = sim
        .get_status()
        .iter()
        .map(|r| (r.x.to_bits(), r.y.to_bits(), r.mass.to_bits()))
        .collect();

    sim.provider().set_broken(true);
    let err = sim.step().unwrap_err();
    assert!(matches!(err, Error::MissingField { ref field, .. } if field == "wind_v"));

    let bits_after: Vec<(u64, u64, u64)> = sim
        .get_status()
        .iter()
        .map(|r| (r.x.to_bits(), r.y.to_bits(), r.mass.to_bits()))
        .collect();
    assert_eq!(sim.time(), time);
    assert_eq!(bits_after, bits);
    Ok(())
}
