//! Module containing the universal error type
use thiserror::Error;

/// Universal error type for marching cubes extraction
#[derive(Error, Debug)]
pub enum Error {
    /// Could not grow a buffer to the requested size
    #[error("could not allocate {requested} elements of {kind} storage")]
    AllocationFailure {
        /// Name of the buffer kind being grown
        kind: &'static str,
        /// Number of elements requested
        requested: usize,
    },

    /// Grid dimensions do not match the state held by the context
    #[error("grid dimensions {actual:?} do not match expected {expected:?}")]
    DimensionMismatch {
        /// Dimensions held by the context
        expected: [usize; 3],
        /// Dimensions passed by the caller
        actual: [usize; 3],
    },

    /// Worker failed while running a parallel stage
    #[error("device execution error: {0}")]
    DeviceExecution(String),

    /// Slice length does not match the grid or mesh size
    #[error("`{name}` has length {actual}, expected {expected}")]
    BadSliceLength {
        /// Name of the offending argument
        name: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// There is no successful forward pass to differentiate
    #[error("no forward pass on record for this context")]
    NoForwardState,

    /// Mesh has more triangles than a binary STL can count
    #[error("mesh has {0} triangles, more than an STL file can hold")]
    TooManyTriangles(usize),

    /// Grid dimensions are empty or overflow the cell count
    #[error("invalid grid dimensions {0:?}")]
    BadDims([usize; 3]),

    /// IO error; see inner code for details
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Error::DeviceExecution(e.to_string())
    }
}
