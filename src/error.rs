use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the dispersion engine and its collaborators.
///
/// Configuration problems surface from `Simulation::new`; provider problems surface from
/// `Simulation::step`, which leaves the engine untouched when it returns one of them.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The wind provider answered a batch with the wrong number of records.
    #[error("wind provider returned {got} records for {expected} coordinates")]
    RecordCountMismatch { expected: usize, got: usize },

    /// A record lacks a requested field (absent or NaN).
    #[error("wind provider has no `{field}` value at ({x}, {y})")]
    MissingField { field: String, x: f64, y: f64 },

    /// The wind provider itself failed (remote call, interpreter error, ...).
    #[error("wind provider failure: {0}")]
    Provider(String),

    /// Advection produced a position that cannot be binned.
    #[error("numerical error: {0}")]
    MathError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
