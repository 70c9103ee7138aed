//! # Sightline Core
//!
//! Core types, traits and I/O for the sightline visibility analysis library.
//!
//! This crate provides:
//! - `Raster<T>`: Generic elevation/visibility grid type
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `Feature`/`FeatureCollection`: vector result layers
//! - Native GeoTIFF I/O for surfaces and viewshed output

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
    pub use crate::Algorithm;
}

/// Core trait for analyses in sightline.
///
/// Analyses are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the analysis
    type Input;
    /// Output type for the analysis
    type Output;
    /// Parameters controlling behavior
    type Params: Default;
    /// Error type for execution
    type Error: std::error::Error;

    /// Returns the analysis name
    fn name(&self) -> &'static str;

    /// Returns a description of what the analysis does
    fn description(&self) -> &'static str;

    /// Execute the analysis
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
