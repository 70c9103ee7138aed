//! I/O operations for reading and writing surfaces and result grids

mod native;

pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};
