//! Error type shared by grid construction, upscaling and misfit evaluation.

use thiserror::Error;

use crate::axis::Axis;

/// Crate result type
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while building grids and overlap maps or evaluating a misfit.
///
/// Modelling policies (zero aggregated pore volume, non-finite cell values) are
/// not errors and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("non-finite cell width on {axis} axis at index {index}")]
    NonFiniteWidth { axis: Axis, index: usize },

    #[error("negative cell width on {axis} axis at index {index}")]
    NegativeWidth { axis: Axis, index: usize },

    #[error("non-finite cell boundary on {axis} axis at index {index}")]
    NonFiniteBoundary { axis: Axis, index: usize },

    #[error("cell boundary on {axis} axis at index {index} is below the previous boundary")]
    DecreasingBoundary { axis: Axis, index: usize },

    #[error("{axis} axis has no cells")]
    EmptyAxis { axis: Axis },

    #[error("source cell {index} has zero length and cannot carry overlap weight")]
    DegenerateCell { index: usize },

    #[error("dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("no reference model attached")]
    MissingReference,

    #[error("no timesteps requested")]
    NoTimesteps,

    #[error("timestep {0} is not available")]
    UnknownTimestep(usize),

    #[error("property lookup for {property} failed: {message}")]
    Property { property: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("job {id} could not be dispatched: {message}")]
    Job { id: u64, message: String },
}

impl Error {
    pub(crate) fn shape(expected: &[usize], found: &[usize]) -> Self {
        Error::DimensionMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
