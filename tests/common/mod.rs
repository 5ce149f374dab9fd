#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use plumesim::error::{Error, Result};
use plumesim::wind::{FieldRecord, WindProvider, WindQuery};
use plumesim::SimConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 2, 3, 21, 0, 0).unwrap()
}

/// Source at the origin, one-hour iterations split into `substeps` micro steps, active for
/// `active_steps` iterations.
pub fn config(active_steps: i32, substeps: i32) -> SimConfig {
    let iteration = TimeDelta::hours(1);
    SimConfig::new(
        t0(),
        t0() + iteration * active_steps,
        (0.0, 0.0),
        iteration,
        iteration / substeps,
    )
}

/// Wind that varies smoothly with position, so neighbouring bins drift apart.
#[derive(Default)]
pub struct Swirl;

impl Swirl {
    pub fn at(x: f64, y: f64) -> (f64, f64) {
        (4.0 + 3.0 * (7.0 * y).sin(), 2.0 * (5.0 * x).cos())
    }
}

impl WindProvider for Swirl {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        Ok(query
            .coords
            .iter()
            .map(|&(x, y)| {
                let (u, v) = Swirl::at(x, y);
                FieldRecord::new()
                    .with(query.fields[0], u)
                    .with(query.fields[1], v)
            })
            .collect())
    }
}

/// Wraps another provider and records the size of every query.
pub struct Recording<P> {
    pub inner: P,
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl<P> Recording<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

impl<P: WindProvider> WindProvider for Recording<P> {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        self.batch_sizes.lock().unwrap().push(query.coords.len());
        self.inner.query(query)
    }
}

/// How a [`Breakable`] provider misbehaves once broken.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// One record in the middle of each batch lacks the northward component.
    MissingField,
    /// The last record of each batch is dropped.
    ShortAnswer,
    /// The call itself fails.
    Unavailable,
}

/// Delegates to `inner` until `broken` is set.
pub struct Breakable<P> {
    pub inner: P,
    pub fault: Fault,
    pub broken: AtomicBool,
}

impl<P> Breakable<P> {
    pub fn new(inner: P, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            broken: AtomicBool::new(false),
        }
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }
}

impl<P: WindProvider> WindProvider for Breakable<P> {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        if !self.broken.load(Ordering::SeqCst) {
            return self.inner.query(query);
        }
        match self.fault {
            Fault::Unavailable => Err(Error::Provider("connection reset".into())),
            Fault::ShortAnswer => {
                let mut recs = self.inner.query(query)?;
                recs.pop();
                Ok(recs)
            }
            Fault::MissingField => {
                let mut recs = self.inner.query(query)?;
                let mid = recs.len() / 2;
                let u = recs[mid].get(query.fields[0]).unwrap_or(0.0);
                recs[mid] = FieldRecord::new().with(query.fields[0], u);
                Ok(recs)
            }
        }
    }
}
