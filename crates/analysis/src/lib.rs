//! # Sightline Analysis
//!
//! Visibility analysis algorithms for sightline.
//!
//! ## Available analyses
//!
//! - **visibility**: observer/target line-of-sight aggregation
//! - **sector**: ring-sector ("range fan") mask construction
//! - **viewshed**: radial viewshed within a range/bearing window
//! - **surface**: surface capability trait and raster-backed adapter
//! - **jobs**: geoprocessing-style job submission with busy/cancel state

pub(crate) mod maybe_rayon;

pub mod jobs;
pub mod sector;
pub mod surface;
pub mod viewshed;
pub mod visibility;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::jobs::{ExecutionMode, JobOutput, JobRunner, JobStatus, ViewshedJobParams};
    pub use crate::sector::{ring_sector_mask, RingSectorSpec, ANGULAR_STEP_DEGREES};
    pub use crate::surface::{Point3, RasterSurface, Sightline, SurfaceService};
    pub use crate::viewshed::{
        cumulative_radial_viewshed, radial_viewshed, CumulativeViewshed, RadialViewshed,
        RadialViewshedParams,
    };
    pub use crate::visibility::{
        aggregate_visibility, AggregationParams, SightlineRecord, VisibilityAggregate,
    };
    pub use sightline_core::prelude::*;
}
