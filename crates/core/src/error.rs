//! Error types for sightline

use thiserror::Error;

/// Main error type for sightline operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("No surface selected or surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Surface must use a projected coordinate system, got {0}")]
    SurfaceNotProjected(String),

    #[error("A geoprocessing job is already in flight")]
    JobBusy,

    #[error("Geoprocessing job failed: {0}")]
    JobFailed(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for sightline operations
pub type Result<T> = std::result::Result<T, Error>;
