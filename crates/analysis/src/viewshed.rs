//! Radial viewshed (RLOS) analysis
//!
//! Determines which cells of an elevation grid are visible from an observer,
//! restricted to a range-fan window: a minimum/maximum radius and a start/end
//! compass bearing span. Rays are traced from the observer to each perimeter
//! cell of the search square, marking cells whose slope angle reaches the
//! running maximum along the ray.
//!
//! Reference:
//! Franklin, W.R. & Ray, C. (1994). Higher isn't necessarily better:
//! visibility algorithms and experiments. GIS/LIS.

use geo_types::Point;
use ndarray::Array2;

use crate::maybe_rayon::*;
use crate::sector::bearing_in_span;
use crate::surface::EFFECTIVE_EARTH_RADIUS;
use sightline_core::{Algorithm, Error, Raster, Result};

/// Parameters for radial viewshed analysis
#[derive(Debug, Clone)]
pub struct RadialViewshedParams {
    /// Observer position in map coordinates
    pub observer: Point<f64>,
    /// Minimum visible range in map units
    pub inner_radius: f64,
    /// Maximum visible range in map units
    pub outer_radius: f64,
    /// Start of the bearing span, compass degrees
    pub start_bearing: f64,
    /// End of the bearing span, compass degrees
    pub end_bearing: f64,
    /// Observer height above the surface
    pub observer_offset: f64,
    /// Target height above the surface at each cell
    pub target_offset: f64,
    /// Apply Earth-curvature/refraction correction (4/3 model)
    pub curvature: bool,
}

impl Default for RadialViewshedParams {
    fn default() -> Self {
        Self {
            observer: Point::new(0.0, 0.0),
            inner_radius: 0.0,
            outer_radius: 1000.0,
            start_bearing: 0.0,
            end_bearing: 360.0,
            observer_offset: 2.0,
            target_offset: 0.0,
            curvature: true,
        }
    }
}

/// Radial viewshed analysis
#[derive(Debug, Clone, Default)]
pub struct RadialViewshed;

impl Algorithm for RadialViewshed {
    type Input = Raster<f64>;
    type Output = Raster<u8>;
    type Params = RadialViewshedParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "RadialViewshed"
    }

    fn description(&self) -> &'static str {
        "Compute cell visibility from an observer within a range and bearing window"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        radial_viewshed(&input, &params)
    }
}

/// Compute the radial viewshed from a single observer.
///
/// Cells inside the range-fan window are marked 1 when visible; everything
/// else (hidden, out of range, outside the bearing span) stays 0. Cells
/// inside the inner radius are never marked but still obstruct rays running
/// through them.
///
/// # Errors
/// Fails when the observer falls outside the grid, sits on a void cell, or
/// the radii are inverted.
pub fn radial_viewshed(dem: &Raster<f64>, params: &RadialViewshedParams) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();

    if dem.is_empty() {
        return Err(Error::SurfaceUnavailable(
            "elevation raster has no cells".to_string(),
        ));
    }
    if params.outer_radius <= 0.0 || params.inner_radius < 0.0
        || params.inner_radius > params.outer_radius
    {
        return Err(Error::InvalidParameter {
            name: "inner_radius/outer_radius",
            value: format!("{}/{}", params.inner_radius, params.outer_radius),
            reason: "require 0 <= inner <= outer and outer > 0".to_string(),
        });
    }

    let cell_size = dem.cell_size();

    let (col_f, row_f) = dem.geo_to_pixel(params.observer.x(), params.observer.y());
    if col_f < 0.0 || row_f < 0.0 || col_f >= cols as f64 || row_f >= rows as f64 {
        return Err(Error::IndexOutOfBounds {
            row: row_f.floor().max(0.0) as usize,
            col: col_f.floor().max(0.0) as usize,
            rows,
            cols,
        });
    }
    let obs_row = row_f.floor() as usize;
    let obs_col = col_f.floor() as usize;

    let obs_ground = dem.get(obs_row, obs_col)?;
    if dem.is_nodata(obs_ground) {
        return Err(Error::Algorithm("Observer is on a void cell".to_string()));
    }
    let obs_z = obs_ground + params.observer_offset;

    let obs_r = obs_row as isize;
    let obs_c = obs_col as isize;
    let max_r = (params.outer_radius / cell_size).ceil() as isize;

    // Perimeter cells of the search square; one ray per cell
    let mut ray_targets: Vec<(isize, isize)> = Vec::new();
    for c in (obs_c - max_r)..=(obs_c + max_r) {
        ray_targets.push((obs_r - max_r, c));
        ray_targets.push((obs_r + max_r, c));
    }
    for r in (obs_r - max_r + 1)..=(obs_r + max_r - 1) {
        ray_targets.push((r, obs_c - max_r));
        ray_targets.push((r, obs_c + max_r));
    }

    let visibility_maps: Vec<Vec<(usize, usize)>> = ray_targets
        .into_par_iter()
        .map(|(tr, tc)| trace_radial_ray(dem, obs_r, obs_c, obs_z, tr, tc, params))
        .collect();

    let mut output_data = Array2::<u8>::zeros((rows, cols));
    if params.inner_radius == 0.0 {
        output_data[(obs_row, obs_col)] = 1;
    }
    for visible_cells in &visibility_maps {
        for &(r, c) in visible_cells {
            output_data[(r, c)] = 1;
        }
    }

    let mut output = dem.with_same_meta::<u8>(rows, cols);
    output.set_nodata(Some(0));
    *output.data_mut() = output_data;

    Ok(output)
}

/// Trace one ray from the observer toward a perimeter cell, returning the
/// in-window cells visible along it.
fn trace_radial_ray(
    dem: &Raster<f64>,
    obs_r: isize,
    obs_c: isize,
    obs_z: f64,
    target_r: isize,
    target_c: isize,
    params: &RadialViewshedParams,
) -> Vec<(usize, usize)> {
    let (rows, cols) = dem.shape();
    let cell_size = dem.cell_size();

    let mut visible = Vec::new();
    let mut max_angle = f64::NEG_INFINITY;

    let dr = target_r - obs_r;
    let dc = target_c - obs_c;
    let steps = dr.unsigned_abs().max(dc.unsigned_abs());
    if steps == 0 {
        return visible;
    }

    let step_r = dr as f64 / steps as f64;
    let step_c = dc as f64 / steps as f64;

    for s in 1..=steps {
        let cr = (obs_r as f64 + step_r * s as f64).round() as isize;
        let cc = (obs_c as f64 + step_c * s as f64).round() as isize;

        if cr < 0 || cc < 0 || (cr as usize) >= rows || (cc as usize) >= cols {
            break;
        }
        let r = cr as usize;
        let c = cc as usize;

        let z = unsafe { dem.get_unchecked(r, c) };
        if dem.is_nodata(z) {
            break;
        }

        let drow = (cr - obs_r) as f64 * cell_size;
        let dcol = (cc - obs_c) as f64 * cell_size;
        let dist = (drow * drow + dcol * dcol).sqrt();

        if dist < f64::EPSILON {
            continue;
        }
        if dist > params.outer_radius {
            break;
        }

        let drop = if params.curvature {
            dist * dist / (2.0 * EFFECTIVE_EARTH_RADIUS)
        } else {
            0.0
        };
        let target_z = z + params.target_offset - drop;
        let angle = (target_z - obs_z) / dist;

        if angle >= max_angle {
            // dcol points east, -drow north (rows grow southward)
            let bearing = dcol.atan2(-drow).to_degrees();
            if dist >= params.inner_radius
                && bearing_in_span(bearing, params.start_bearing, params.end_bearing)
            {
                visible.push((r, c));
            }
            max_angle = angle;
        }
    }

    visible
}

/// Cumulative radial viewshed over multiple observers.
#[derive(Debug)]
pub struct CumulativeViewshed {
    /// Per-cell count of observers that can see the cell
    pub counts: Raster<f64>,
    /// Indices of observers skipped (off the grid or on a void cell)
    pub skipped_observers: Vec<usize>,
}

/// Compute a cumulative viewshed: each cell's value is the number of
/// observers that can see it.
///
/// Observers that fall off the grid or on a void cell are skipped, mirroring
/// the aggregation policy for void points; their indices are reported.
pub fn cumulative_radial_viewshed(
    dem: &Raster<f64>,
    observers: &[Point<f64>],
    params: &RadialViewshedParams,
) -> Result<CumulativeViewshed> {
    let (rows, cols) = dem.shape();
    let mut counts = dem.with_same_meta::<f64>(rows, cols);
    let mut skipped = Vec::new();

    for (i, observer) in observers.iter().enumerate() {
        let mut observer_params = params.clone();
        observer_params.observer = *observer;

        let vs = match radial_viewshed(dem, &observer_params) {
            Ok(vs) => vs,
            Err(Error::IndexOutOfBounds { .. }) | Err(Error::Algorithm(_)) => {
                skipped.push(i);
                continue;
            }
            Err(e) => return Err(e),
        };

        for row in 0..rows {
            for col in 0..cols {
                if unsafe { vs.get_unchecked(row, col) } > 0 {
                    let current = unsafe { counts.get_unchecked(row, col) };
                    counts.set(row, col, current + 1.0)?;
                }
            }
        }
    }

    Ok(CumulativeViewshed {
        counts,
        skipped_observers: skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::GeoTransform;

    fn flat_dem(size: usize, z: f64) -> Raster<f64> {
        let mut dem = Raster::filled(size, size, z);
        dem.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
        dem
    }

    /// Map coordinates of a cell center.
    fn cell_center(dem: &Raster<f64>, row: usize, col: usize) -> Point<f64> {
        let (x, y) = dem.pixel_to_geo(col, row);
        Point::new(x, y)
    }

    fn params_at(dem: &Raster<f64>, row: usize, col: usize) -> RadialViewshedParams {
        RadialViewshedParams {
            observer: cell_center(dem, row, col),
            curvature: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_terrain_all_in_range_visible() {
        let dem = flat_dem(21, 100.0);
        let mut params = params_at(&dem, 10, 10);
        params.outer_radius = 8.0;

        let result = radial_viewshed(&dem, &params).unwrap();

        assert_eq!(result.get(10, 10).unwrap(), 1, "observer cell visible");
        assert_eq!(result.get(10, 15).unwrap(), 1, "in range");
        assert_eq!(result.get(5, 10).unwrap(), 1, "in range");
        assert_eq!(result.get(10, 19).unwrap(), 0, "beyond outer radius");
    }

    #[test]
    fn test_wall_blocks_cells_behind() {
        let mut dem = flat_dem(21, 0.0);
        for r in 0..21 {
            dem.set(r, 12, 1000.0).unwrap();
        }
        let mut params = params_at(&dem, 10, 10);
        params.outer_radius = 9.0;

        let result = radial_viewshed(&dem, &params).unwrap();

        assert_eq!(result.get(10, 11).unwrap(), 1, "before the wall");
        assert_eq!(result.get(10, 12).unwrap(), 1, "wall crest visible");
        assert_eq!(result.get(10, 15).unwrap(), 0, "hidden behind the wall");
    }

    #[test]
    fn test_bearing_window_masks_quadrants() {
        let dem = flat_dem(21, 50.0);
        let mut params = params_at(&dem, 10, 10);
        params.outer_radius = 8.0;
        params.start_bearing = 0.0;
        params.end_bearing = 90.0;

        let result = radial_viewshed(&dem, &params).unwrap();

        assert_eq!(result.get(5, 10).unwrap(), 1, "due north, bearing 0");
        assert_eq!(result.get(10, 15).unwrap(), 1, "due east, bearing 90");
        assert_eq!(result.get(7, 13).unwrap(), 1, "northeast quadrant");
        assert_eq!(result.get(10, 5).unwrap(), 0, "due west excluded");
        assert_eq!(result.get(15, 10).unwrap(), 0, "due south excluded");
        assert_eq!(result.get(13, 7).unwrap(), 0, "southwest excluded");
    }

    #[test]
    fn test_inner_radius_excludes_near_cells() {
        let dem = flat_dem(21, 50.0);
        let mut params = params_at(&dem, 10, 10);
        params.inner_radius = 3.0;
        params.outer_radius = 8.0;

        let result = radial_viewshed(&dem, &params).unwrap();

        assert_eq!(result.get(10, 10).unwrap(), 0, "observer cell masked");
        assert_eq!(result.get(10, 12).unwrap(), 0, "inside inner radius");
        assert_eq!(result.get(10, 15).unwrap(), 1, "between inner and outer");
    }

    #[test]
    fn test_wraparound_bearing_window() {
        let dem = flat_dem(21, 50.0);
        let mut params = params_at(&dem, 10, 10);
        params.outer_radius = 8.0;
        params.start_bearing = 270.0;
        params.end_bearing = 90.0;

        let result = radial_viewshed(&dem, &params).unwrap();

        assert_eq!(result.get(10, 5).unwrap(), 1, "due west in span");
        assert_eq!(result.get(5, 10).unwrap(), 1, "due north in span");
        assert_eq!(result.get(10, 15).unwrap(), 1, "due east in span");
        assert_eq!(result.get(15, 10).unwrap(), 0, "due south excluded");
    }

    #[test]
    fn test_curvature_hides_beyond_horizon() {
        // 201×201 grid at 100m cells: observer 2m above flat ground has a
        // refracted horizon near 5.8km
        let mut dem = Raster::filled(201, 201, 0.0_f64);
        dem.set_transform(GeoTransform::new(0.0, 20_100.0, 100.0, -100.0));

        let observer = {
            let (x, y) = dem.pixel_to_geo(100, 100);
            Point::new(x, y)
        };
        let mut params = RadialViewshedParams {
            observer,
            outer_radius: 10_000.0,
            observer_offset: 2.0,
            curvature: true,
            ..Default::default()
        };

        let with_curvature = radial_viewshed(&dem, &params).unwrap();
        assert_eq!(with_curvature.get(100, 130).unwrap(), 1, "3km: inside horizon");
        assert_eq!(with_curvature.get(100, 190).unwrap(), 0, "9km: over the horizon");

        params.curvature = false;
        let flat_earth = radial_viewshed(&dem, &params).unwrap();
        assert_eq!(flat_earth.get(100, 190).unwrap(), 1, "flat earth sees 9km");
    }

    #[test]
    fn test_observer_outside_grid_fails() {
        let dem = flat_dem(10, 0.0);
        let params = RadialViewshedParams {
            observer: Point::new(-5.0, 5.0),
            curvature: false,
            ..Default::default()
        };
        assert!(radial_viewshed(&dem, &params).is_err());
    }

    #[test]
    fn test_observer_on_void_cell_fails() {
        let mut dem = flat_dem(10, 0.0);
        dem.set(5, 5, f64::NAN).unwrap();
        let params = params_at(&dem, 5, 5);
        assert!(matches!(
            radial_viewshed(&dem, &params),
            Err(Error::Algorithm(_))
        ));
    }

    #[test]
    fn test_inverted_radii_rejected() {
        let dem = flat_dem(10, 0.0);
        let mut params = params_at(&dem, 5, 5);
        params.inner_radius = 50.0;
        params.outer_radius = 10.0;
        assert!(matches!(
            radial_viewshed(&dem, &params),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_cumulative_counts_observers() {
        let dem = flat_dem(21, 10.0);
        let observers = vec![cell_center(&dem, 10, 5), cell_center(&dem, 10, 15)];
        let params = RadialViewshedParams {
            outer_radius: 6.0,
            curvature: false,
            ..Default::default()
        };

        let result = cumulative_radial_viewshed(&dem, &observers, &params).unwrap();
        assert!(result.skipped_observers.is_empty());

        // midway cell is in range of both observers
        assert_eq!(result.counts.get(10, 10).unwrap(), 2.0);
        // cells near one observer only
        assert_eq!(result.counts.get(10, 2).unwrap(), 1.0);
        assert_eq!(result.counts.get(10, 18).unwrap(), 1.0);
        // far corner out of range of both
        assert_eq!(result.counts.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_cumulative_skips_bad_observers() {
        let mut dem = flat_dem(21, 10.0);
        dem.set(10, 15, f64::NAN).unwrap();

        let observers = vec![
            cell_center(&dem, 10, 5),
            cell_center(&dem, 10, 15), // void cell
            Point::new(-100.0, -100.0), // off the grid
        ];
        let params = RadialViewshedParams {
            outer_radius: 5.0,
            curvature: false,
            ..Default::default()
        };

        let result = cumulative_radial_viewshed(&dem, &observers, &params).unwrap();
        assert_eq!(result.skipped_observers, vec![1, 2]);
        assert_eq!(result.counts.get(10, 5).unwrap(), 1.0);
    }
}
