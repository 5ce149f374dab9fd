use chrono::{DateTime, TimeDelta, Utc};
use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2};
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::fmt::Display;
use std::path::PathBuf;

use crate::core::config::{
    WindFields, DEFAULT_MAX_BATCH_SIZE, DEFAULT_PRECISION, DEFAULT_PRUNE_THRESHOLD,
};
use crate::core::{SimConfig, Simulation};
use crate::error::{Error, Result};
use crate::report::{self, Snapshot};
use crate::wind::{FieldRecord, WindProvider, WindQuery};

fn py_err(e: Error) -> PyErr {
    match e {
        Error::InvalidParam(_) => PyValueError::new_err(e.to_string()),
        Error::Io(_) => PyIOError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

fn provider_err<E: Display>(e: E) -> Error {
    Error::Provider(e.to_string())
}

/// Wind provider backed by a Python callable.
///
/// The callable is invoked as `wind(xs, ys, start, duration, fields)` and must return an
/// iterable of dicts, one per coordinate in order. Missing keys or `None` values mean no data.
struct PyWindProvider {
    callback: Py<PyAny>,
}

impl WindProvider for PyWindProvider {
    fn query(&self, query: &WindQuery<'_>) -> Result<Vec<FieldRecord>> {
        Python::attach(|py| {
            let xs: Vec<f64> = query.coords.iter().map(|c| c.0).collect();
            let ys: Vec<f64> = query.coords.iter().map(|c| c.1).collect();
            let fields: Vec<&str> = query.fields.to_vec();
            let answer = self
                .callback
                .call1(py, (xs, ys, query.start, query.duration, fields))
                .map_err(provider_err)?;

            let mut records = Vec::with_capacity(query.coords.len());
            for item in answer.bind(py).try_iter().map_err(provider_err)? {
                let item = item.map_err(provider_err)?;
                let dict = item.downcast::<PyDict>().map_err(provider_err)?;
                let mut rec = FieldRecord::new();
                for &name in query.fields {
                    let Some(value) = dict.get_item(name).map_err(provider_err)? else {
                        continue;
                    };
                    if value.is_none() {
                        continue;
                    }
                    rec.insert(name, value.extract::<f64>().map_err(provider_err)?);
                }
                records.push(rec);
            }
            Ok(records)
        })
    }
}

/// PlumeSim: Python-facing wrapper around the dispersion step controller.
///
/// API:
/// - __new__(start_time, end_time, source_x, source_y, iteration_interval,
///   simulation_interval, wind, precision=3, prune_threshold=1e-4, max_batch_size=2500,
///   emission_mass=1.0, wind_fields=("wind_u", "wind_v"))
/// - step()
/// - get_status() -> np.ndarray, shape (N, 3) of [x, y, mass]
/// - time() -> datetime
#[pyclass]
pub struct PlumeSim {
    sim: Simulation<PyWindProvider>,
}

#[pymethods]
impl PlumeSim {
    /// Configure a dispersion run. Times must be timezone-aware datetimes; intervals are
    /// timedeltas. `wind` is the provider callable described on the class.
    ///
    /// Errors: raises ValueError on invalid configuration.
    #[new]
    #[pyo3(signature = (
        start_time,
        end_time,
        source_x,
        source_y,
        iteration_interval,
        simulation_interval,
        wind,
        precision=DEFAULT_PRECISION,
        prune_threshold=DEFAULT_PRUNE_THRESHOLD,
        max_batch_size=DEFAULT_MAX_BATCH_SIZE,
        emission_mass=1.0,
        wind_fields=(String::from("wind_u"), String::from("wind_v"))
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        source_x: f64,
        source_y: f64,
        iteration_interval: TimeDelta,
        simulation_interval: TimeDelta,
        wind: Py<PyAny>,
        precision: u32,
        prune_threshold: f64,
        max_batch_size: usize,
        emission_mass: f64,
        wind_fields: (String, String),
    ) -> PyResult<Self> {
        let mut config = SimConfig::new(
            start_time,
            end_time,
            (source_x, source_y),
            iteration_interval,
            simulation_interval,
        );
        config.precision = precision;
        config.prune_threshold = prune_threshold;
        config.max_batch_size = max_batch_size;
        config.emission_mass = emission_mass;
        config.wind_fields = WindFields {
            u: wind_fields.0,
            v: wind_fields.1,
        };
        let sim = Simulation::new(config, PyWindProvider { callback: wind }).map_err(py_err)?;
        Ok(Self { sim })
    }

    /// Advance one iteration interval (releases the GIL outside the wind callback).
    ///
    /// Errors: raises RuntimeError if the wind callable fails or returns incomplete data;
    /// the simulation is then unchanged.
    fn step(&mut self, py: Python<'_>) -> PyResult<()> {
        py.detach(|| self.sim.step()).map_err(py_err)
    }

    /// Return the plume as a NumPy array of shape (N, 3): [x, y, mass], ordered by x then y.
    fn get_status(&self, py: Python<'_>) -> Py<PyArray2<f64>> {
        let records = self.sim.get_status();
        let mut arr = Array2::<f64>::zeros((records.len(), 3));
        for (i, r) in records.iter().enumerate() {
            arr[[i, 0]] = r.x;
            arr[[i, 1]] = r.y;
            arr[[i, 2]] = r.mass;
        }
        arr.into_pyarray(py).unbind()
    }

    /// Current simulated time.
    fn time(&self) -> DateTime<Utc> {
        self.sim.time()
    }

    fn steps_taken(&self) -> u64 {
        self.sim.steps_taken()
    }

    fn total_mass(&self) -> f64 {
        self.sim.total_mass()
    }

    /// Cumulative mass released by the source.
    fn emitted_mass(&self) -> f64 {
        self.sim.emitted_mass()
    }

    /// Cumulative mass discarded by pruning.
    fn pruned_mass(&self) -> f64 {
        self.sim.pruned_mass()
    }

    /// Write the current status as `time,x,y,mass` CSV (or `x,y,mass` with `stamped=False`).
    #[pyo3(signature = (path, stamped=true))]
    fn write_status_csv(&self, path: PathBuf, stamped: bool) -> PyResult<()> {
        let file = std::fs::File::create(path).map_err(|e| py_err(e.into()))?;
        let records = self.sim.get_status();
        let written = if stamped {
            Snapshot::new(self.sim.time(), records).write_csv(file)
        } else {
            report::write_csv(&records, file)
        };
        written.map_err(py_err)
    }
}

/// The plumesim Python module entry point.
#[pymodule]
fn plumesim(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PlumeSim>()?;
    Ok(())
}
