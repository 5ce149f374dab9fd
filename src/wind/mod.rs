//! Wind field provider boundary.
//!
//! The engine never talks to a data service directly. It hands a [`WindQuery`] to a
//! [`WindProvider`] and gets back one [`FieldRecord`] per coordinate, in request order.
//! [`fetch_wind`] validates that answer and turns it into [`WindVector`]s.

pub mod gridded;

pub use gridded::GriddedWind;

use crate::core::config::WindFields;
use crate::error::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use log::trace;
use std::collections::HashMap;
use std::sync::Arc;

/// One request to a wind provider.
#[derive(Debug, Clone, Copy)]
pub struct WindQuery<'a> {
    /// (x, y) coordinates to sample.
    pub coords: &'a [(f64, f64)],
    /// Start of the time window.
    pub start: DateTime<Utc>,
    /// Length of the time window.
    pub duration: TimeDelta,
    /// Requested field names.
    pub fields: &'a [&'a str],
}

/// Field values a provider reports for one coordinate.
///
/// A field that is missing, or present as NaN, means the provider has no data for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRecord {
    values: HashMap<String, f64>,
}

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) {
        self.values.insert(field.into(), value);
    }

    /// Value of `field`, or `None` when absent or NaN.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied().filter(|v| !v.is_nan())
    }
}

/// Source of wind samples.
///
/// Implementations must return exactly one record per query coordinate, in the same order.
/// Any `Err` is treated by the engine as a failed step; retries belong to the provider.
pub trait WindProvider: Send + Sync {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>>;
}

impl<P: WindProvider + ?Sized> WindProvider for &P {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        (**self).query(query)
    }
}

impl<P: WindProvider + ?Sized> WindProvider for Box<P> {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        (**self).query(query)
    }
}

impl<P: WindProvider + ?Sized> WindProvider for Arc<P> {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        (**self).query(query)
    }
}

/// Wind velocity at one coordinate (m/s): `u` eastward, `v` northward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindVector {
    pub u: f64,
    pub v: f64,
}

/// Query `provider` for the wind at `coords` and pair each record with its coordinate.
///
/// Errors:
/// - whatever the provider returns;
/// - `Error::RecordCountMismatch` if the record count differs from `coords.len()`;
/// - `Error::MissingField` if a record lacks either wind component.
pub fn fetch_wind<P: WindProvider + ?Sized>(
    provider: &P,
    coords: &[(f64, f64)],
    start: DateTime<Utc>,
    duration: TimeDelta,
    fields: &WindFields,
) -> Result<Vec<WindVector>> {
    if coords.is_empty() {
        return Ok(Vec::new());
    }
    let names = fields.names();
    let query = WindQuery {
        coords,
        start,
        duration,
        fields: &names,
    };
    let records = provider.query(&query)?;
    trace!(
        "wind query: {} coordinates at {start}, {} records",
        coords.len(),
        records.len()
    );
    if records.len() != coords.len() {
        return Err(Error::RecordCountMismatch {
            expected: coords.len(),
            got: records.len(),
        });
    }

    coords
        .iter()
        .zip(&records)
        .map(|(&(x, y), rec)| {
            let component = |field: &str| {
                rec.get(field).ok_or_else(|| Error::MissingField {
                    field: field.to_string(),
                    x,
                    y,
                })
            };
            Ok(WindVector {
                u: component(&fields.u)?,
                v: component(&fields.v)?,
            })
        })
        .collect()
}

/// A spatially and temporally uniform wind field.
#[derive(Debug, Clone)]
pub struct ConstantWind {
    record: FieldRecord,
}

impl ConstantWind {
    /// Uniform wind under the default field names.
    pub fn new(u: f64, v: f64) -> Self {
        Self::with_fields(&WindFields::default(), u, v)
    }

    /// Uniform wind reported under custom field names.
    pub fn with_fields(fields: &WindFields, u: f64, v: f64) -> Self {
        Self {
            record: FieldRecord::new()
                .with(fields.u.clone(), u)
                .with(fields.v.clone(), v),
        }
    }

    /// No wind anywhere.
    pub fn calm() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl WindProvider for ConstantWind {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        Ok(vec![self.record.clone(); query.coords.len()])
    }
}
