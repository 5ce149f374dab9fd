use super::{FieldRecord, WindProvider, WindQuery};
use crate::error::{Error, Result};
use log::debug;
use std::io;
use std::path::Path;

/// A static wind field sampled at scattered points, answered by nearest-sample lookup.
///
/// Samples come from CSV with `x` and `y` columns plus any number of numeric field columns
/// (empty cells mean "no data"). A query coordinate farther than `max_distance` degrees from
/// every sample gets an empty record, which the engine reports as missing data.
#[derive(Debug, Clone)]
pub struct GriddedWind {
    samples: Vec<Sample>,
    max_distance: f64,
}

#[derive(Debug, Clone)]
struct Sample {
    x: f64,
    y: f64,
    record: FieldRecord,
}

impl GriddedWind {
    /// Read samples from a CSV file.
    pub fn from_csv_path(path: impl AsRef<Path>, max_distance: f64) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file, max_distance)
    }

    /// Read samples from any CSV source.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `max_distance` is negative/NaN, the `x`/`y` columns are
    ///   missing, or a cell is not a number.
    pub fn from_csv_reader<R: io::Read>(reader: R, max_distance: f64) -> Result<Self> {
        if max_distance.is_nan() || max_distance < 0.0 {
            return Err(Error::InvalidParam("max_distance must be >= 0".into()));
        }
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| Error::InvalidParam(format!("wind CSV lacks a `{name}` column")))
        };
        let (ix, iy) = (column("x")?, column("y")?);

        let mut samples = Vec::new();
        for (line, row) in rdr.records().enumerate() {
            let row = row?;
            let number = |i: usize| -> Result<Option<f64>> {
                let cell = row.get(i).unwrap_or("");
                if cell.is_empty() {
                    return Ok(None);
                }
                cell.parse::<f64>().map(Some).map_err(|_| {
                    Error::InvalidParam(format!(
                        "wind CSV row {}: `{cell}` in column `{}` is not a number",
                        line + 2,
                        &headers[i]
                    ))
                })
            };
            let (Some(x), Some(y)) = (number(ix)?, number(iy)?) else {
                return Err(Error::InvalidParam(format!(
                    "wind CSV row {}: x and y are required",
                    line + 2
                )));
            };
            let mut record = FieldRecord::new();
            for (i, name) in headers.iter().enumerate() {
                if i == ix || i == iy {
                    continue;
                }
                if let Some(value) = number(i)? {
                    record.insert(name, value);
                }
            }
            samples.push(Sample { x, y, record });
        }
        debug!("loaded {} wind samples", samples.len());
        Ok(Self {
            samples,
            max_distance,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn nearest(&self, x: f64, y: f64) -> Option<&Sample> {
        let limit_sq = self.max_distance * self.max_distance;
        self.samples
            .iter()
            .map(|s| {
                let (dx, dy) = (s.x - x, s.y - y);
                (dx * dx + dy * dy, s)
            })
            .filter(|(d_sq, _)| *d_sq <= limit_sq)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, s)| s)
    }
}

impl WindProvider for GriddedWind {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        Ok(query
            .coords
            .iter()
            .map(|&(x, y)| {
                self.nearest(x, y)
                    .map(|s| s.record.clone())
                    .unwrap_or_default()
            })
            .collect())
    }
}
