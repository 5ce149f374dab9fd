//! Dispersion engine core: particle bins, configuration, advection and the step controller.

pub mod advect;
pub mod config;
pub mod particle;
pub mod sim;

pub use advect::{Advector, MovementScale, METERS_PER_DEGREE};
pub use config::{SimConfig, WindFields};
pub use particle::{bin, BinKey, ParticleState};
pub use sim::Simulation;
