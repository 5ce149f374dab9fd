//! Read-only views of the plume for downstream reporting.
//!
//! Spatial aggregation and plotting live outside this crate; they consume the flat
//! (x, y, mass) records produced here, optionally via CSV.

use crate::core::particle::ParticleState;
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io;

/// One occupied bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub x: f64,
    pub y: f64,
    pub mass: f64,
}

impl StatusRecord {
    /// Records for every bin of `state`, ordered by x, then y.
    pub fn from_state(state: &ParticleState) -> Vec<StatusRecord> {
        state
            .iter()
            .map(|(k, &mass)| StatusRecord {
                x: k.x(),
                y: k.y(),
                mass,
            })
            .collect()
    }
}

/// Write records as `x,y,mass` CSV with a header row.
pub fn write_csv<W: io::Write>(records: &[StatusRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if records.is_empty() {
        wtr.write_record(["x", "y", "mass"])?;
    }
    for rec in records {
        wtr.serialize(rec)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read back records written by [`write_csv`].
pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<StatusRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for rec in rdr.deserialize() {
        out.push(rec?);
    }
    Ok(out)
}

/// The plume status at one simulated time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub time: DateTime<Utc>,
    pub records: Vec<StatusRecord>,
}

#[derive(Serialize)]
struct SnapshotRow<'a> {
    time: &'a str,
    x: f64,
    y: f64,
    mass: f64,
}

impl Snapshot {
    pub fn new(time: DateTime<Utc>, records: Vec<StatusRecord>) -> Self {
        Self { time, records }
    }

    pub fn total_mass(&self) -> f64 {
        self.records.iter().map(|r| r.mass).sum()
    }

    /// Write as `time,x,y,mass` CSV, the time stamp in RFC 3339 on every row.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let stamp = self.time.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut wtr = csv::Writer::from_writer(writer);
        if self.records.is_empty() {
            wtr.write_record(["time", "x", "y", "mass"])?;
        }
        for r in &self.records {
            wtr.serialize(SnapshotRow {
                time: &stamp,
                x: r.x,
                y: r.y,
                mass: r.mass,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}
