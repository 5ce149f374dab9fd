use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::collections::btree_map::{self, BTreeMap};

/// Largest supported rounding precision (decimal digits). Beyond this an f64 degree
/// coordinate no longer carries the requested digits.
pub const MAX_PRECISION: u32 = 12;

/// Grid key of a particle bin: a (longitude, latitude) pair rounded to a fixed number of
/// decimal digits.
///
/// Keys order by x, then y, which gives status reports a stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinKey {
    x: NotNan<f64>,
    y: NotNan<f64>,
}

impl BinKey {
    /// Rounded x (longitude).
    #[inline]
    pub fn x(&self) -> f64 {
        self.x.into_inner()
    }

    /// Rounded y (latitude).
    #[inline]
    pub fn y(&self) -> f64 {
        self.y.into_inner()
    }
}

/// Round `v` to `precision` decimal digits.
///
/// Negative zero is folded into zero so both land in the same bin.
#[inline]
pub fn round_to(v: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (v * scale).round() / scale + 0.0
}

/// Map a raw coordinate to its bin key.
///
/// Errors:
/// - `Error::MathError` if either coordinate is NaN or infinite.
pub fn bin(x: f64, y: f64, precision: u32) -> Result<BinKey> {
    if !x.is_finite() || !y.is_finite() {
        return Err(Error::MathError(format!(
            "cannot bin non-finite coordinate ({x}, {y})"
        )));
    }
    let x = NotNan::new(round_to(x, precision))
        .map_err(|_| Error::MathError("rounded x is NaN".into()))?;
    let y = NotNan::new(round_to(y, precision))
        .map_err(|_| Error::MathError("rounded y is NaN".into()))?;
    Ok(BinKey { x, y })
}

/// The plume at one simulated time: bin key → accumulated mass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleState {
    bins: BTreeMap<BinKey, f64>,
}

impl ParticleState {
    /// An empty plume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `mass` to the bin at `key`, creating it if absent.
    pub fn merge(&mut self, key: BinKey, mass: f64) {
        *self.bins.entry(key).or_insert(0.0) += mass;
    }

    /// Merge every bin of `other` into `self`.
    pub fn absorb(&mut self, other: ParticleState) {
        if self.bins.is_empty() {
            self.bins = other.bins;
            return;
        }
        for (key, mass) in other.bins {
            self.merge(key, mass);
        }
    }

    /// Mass stored at `key` (zero when the bin does not exist).
    pub fn mass_at(&self, key: &BinKey) -> f64 {
        self.bins.get(key).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, key: &BinKey) -> bool {
        self.bins.contains_key(key)
    }

    /// Drop every bin whose mass is at or below `threshold`. Returns the discarded mass.
    pub fn prune(&mut self, threshold: f64) -> f64 {
        let mut dropped = 0.0;
        self.bins.retain(|_, mass| {
            if *mass > threshold {
                true
            } else {
                dropped += *mass;
                false
            }
        });
        dropped
    }

    /// Sum of all bin masses.
    pub fn total_mass(&self) -> f64 {
        self.bins.values().sum()
    }

    /// Number of occupied bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bins in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, BinKey, f64> {
        self.bins.iter()
    }
}

impl<'a> IntoIterator for &'a ParticleState {
    type Item = (&'a BinKey, &'a f64);
    type IntoIter = btree_map::Iter<'a, BinKey, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.bins.iter()
    }
}

impl FromIterator<(BinKey, f64)> for ParticleState {
    fn from_iter<I: IntoIterator<Item = (BinKey, f64)>>(iter: I) -> Self {
        let mut state = ParticleState::new();
        for (key, mass) in iter {
            state.merge(key, mass);
        }
        state
    }
}
