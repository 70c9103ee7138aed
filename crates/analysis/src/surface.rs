//! Surface capability abstraction
//!
//! The aggregation and viewshed analyses never touch terrain data directly;
//! they go through [`SurfaceService`], a statically-typed capability for
//! elevation sampling and pairwise line-of-sight queries. [`RasterSurface`]
//! is the bundled adapter over an elevation grid; hosts with their own
//! surface engine implement the trait instead.

use geo_types::Point;
use sightline_core::{Error, Raster, Result};

/// Effective Earth radius accounting for standard atmospheric refraction
/// (4/3 model), in meters.
pub const EFFECTIVE_EARTH_RADIUS: f64 = 6_371_000.0 * 4.0 / 3.0;

/// A 3D position in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Horizontal (map-plane) distance to another point
    pub fn horizontal_distance(&self, other: &Point3) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<Point3> for Point<f64> {
    fn from(p: Point3) -> Self {
        Point::new(p.x, p.y)
    }
}

/// Outcome of a single line-of-sight query.
///
/// The segment lists split the sightline's ground profile into stretches
/// whose terrain is visible / hidden from the observer; implementations that
/// cannot produce them leave the lists empty.
#[derive(Debug, Clone, Default)]
pub struct Sightline {
    /// Whether the target is visible from the observer
    pub is_visible: bool,
    /// First ground point where terrain blocks the ray, if any
    pub obstruction: Option<Point3>,
    /// Ground stretches visible from the observer
    pub visible_segments: Vec<[Point3; 2]>,
    /// Ground stretches hidden from the observer
    pub invisible_segments: Vec<[Point3; 2]>,
}

/// Terrain surface capability.
///
/// `elevation` returns `None` for void samples (no data at that position);
/// callers are expected to skip such points, not fail. The z values handed to
/// `line_of_sight` already include any observer/target height offsets.
pub trait SurfaceService {
    /// Sample the surface elevation at a map position
    fn elevation(&self, x: f64, y: f64) -> Option<f64>;

    /// Evaluate line of sight between two 3D points
    fn line_of_sight(&self, observer: Point3, target: Point3) -> Sightline;
}

/// [`SurfaceService`] adapter over an elevation raster.
///
/// Elevation is sampled bilinearly; line of sight steps along the ray at a
/// fixed interval (default: one cell size) and compares ray height against
/// the terrain, optionally correcting for Earth curvature and standard
/// atmospheric refraction.
#[derive(Debug)]
pub struct RasterSurface<'a> {
    dem: &'a Raster<f64>,
    sample_interval: f64,
    curvature: bool,
}

impl<'a> RasterSurface<'a> {
    /// Wrap an elevation raster as a surface service.
    ///
    /// Fails with [`Error::SurfaceUnavailable`] when the raster holds no
    /// cells, so callers get the semantic "no surface selected" condition
    /// instead of a void at every sample.
    pub fn new(dem: &'a Raster<f64>) -> Result<Self> {
        if dem.is_empty() {
            return Err(Error::SurfaceUnavailable(
                "elevation raster has no cells".to_string(),
            ));
        }
        Ok(Self {
            dem,
            sample_interval: dem.cell_size(),
            curvature: true,
        })
    }

    /// Toggle Earth-curvature/refraction correction (default: on)
    pub fn with_curvature(mut self, curvature: bool) -> Self {
        self.curvature = curvature;
        self
    }

    /// Override the ray sample interval in map units
    pub fn with_sample_interval(mut self, interval: f64) -> Self {
        if interval > 0.0 {
            self.sample_interval = interval;
        }
        self
    }

    /// Nearest-cell elevation, used when bilinear neighbors are void
    fn nearest(&self, col_f: f64, row_f: f64) -> Option<f64> {
        let col = col_f.floor();
        let row = row_f.floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        match self.dem.get(row, col) {
            Ok(v) if !self.dem.is_nodata(v) => Some(v),
            _ => None,
        }
    }
}

impl SurfaceService for RasterSurface<'_> {
    fn elevation(&self, x: f64, y: f64) -> Option<f64> {
        let (rows, cols) = self.dem.shape();
        let (col_f, row_f) = self.dem.geo_to_pixel(x, y);

        if col_f < 0.0 || row_f < 0.0 || col_f >= cols as f64 || row_f >= rows as f64 {
            return None;
        }

        // Interpolate between cell centers; the edge half-cell clamps
        let cf = (col_f - 0.5).clamp(0.0, (cols - 1) as f64);
        let rf = (row_f - 0.5).clamp(0.0, (rows - 1) as f64);
        let c0 = cf.floor() as usize;
        let r0 = rf.floor() as usize;
        let c1 = (c0 + 1).min(cols - 1);
        let r1 = (r0 + 1).min(rows - 1);
        let fx = cf - c0 as f64;
        let fy = rf - r0 as f64;

        let z00 = self.dem.get(r0, c0).ok()?;
        let z01 = self.dem.get(r0, c1).ok()?;
        let z10 = self.dem.get(r1, c0).ok()?;
        let z11 = self.dem.get(r1, c1).ok()?;

        let any_void = [z00, z01, z10, z11]
            .iter()
            .any(|&z| self.dem.is_nodata(z));
        if any_void {
            return self.nearest(col_f, row_f);
        }

        let top = z00 * (1.0 - fx) + z01 * fx;
        let bottom = z10 * (1.0 - fx) + z11 * fx;
        Some(top * (1.0 - fy) + bottom * fy)
    }

    fn line_of_sight(&self, observer: Point3, target: Point3) -> Sightline {
        let dx = target.x - observer.x;
        let dy = target.y - observer.y;
        let dz = target.z - observer.z;
        let horiz = observer.horizontal_distance(&target);

        let mut sightline = Sightline {
            is_visible: true,
            ..Default::default()
        };

        if horiz < self.sample_interval {
            // Too close for terrain to matter
            sightline.visible_segments.push([observer, target]);
            return sightline;
        }

        let steps = ((horiz / self.sample_interval).ceil() as usize).max(2);

        // Max slope angle seen so far along the profile; a ground sample is
        // visible from the observer iff its angle reaches the running max
        let mut max_angle = f64::NEG_INFINITY;

        // (run start, run end, classification) of the current ground stretch
        let mut run: Option<(Point3, Point3, bool)> = None;

        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let sx = observer.x + dx * t;
            let sy = observer.y + dy * t;
            let dist = horiz * t;

            let Some(ground) = self.elevation(sx, sy) else {
                // Void samples cannot obstruct
                continue;
            };

            // Curvature drop relative to the chord between the endpoints
            let drop = if self.curvature {
                (dist * (horiz - dist)) / (2.0 * EFFECTIVE_EARTH_RADIUS)
            } else {
                0.0
            };
            let ground_eff = ground - drop;

            let ray_height = observer.z + dz * t;
            if ground_eff > ray_height && sightline.obstruction.is_none() {
                sightline.is_visible = false;
                sightline.obstruction = Some(Point3::new(sx, sy, ground));
            }

            let angle = (ground_eff - observer.z) / dist;
            let visible = angle >= max_angle;
            if angle > max_angle {
                max_angle = angle;
            }

            let ground_pt = Point3::new(sx, sy, ground);
            run = Some(match run {
                None => (ground_pt, ground_pt, visible),
                Some((start, _, cls)) if cls == visible => (start, ground_pt, cls),
                Some((start, last, cls)) => {
                    push_segment(&mut sightline, start, last, cls);
                    (last, ground_pt, visible)
                }
            });
        }

        if let Some((start, last, cls)) = run {
            push_segment(&mut sightline, start, last, cls);
        }

        sightline
    }
}

fn push_segment(sightline: &mut Sightline, start: Point3, end: Point3, visible: bool) {
    if visible {
        sightline.visible_segments.push([start, end]);
    } else {
        sightline.invisible_segments.push([start, end]);
    }
}
