//! Ring-sector ("range fan") mask construction
//!
//! Builds the donut-wedge polygon used to mask a field-of-view region:
//! an annular sector between an inner and outer radius, bounded by a start
//! and end compass bearing. Arcs are densified to straight segments so the
//! mask survives raster-masking operations that reject true circular arcs.

use std::f64::consts::PI;

use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};

/// Angular stride for arc densification, in compass degrees.
pub const ANGULAR_STEP_DEGREES: f64 = 5.0;

/// Tolerance for deciding whether a stride landed on the boundary angle.
const ANGLE_EPSILON: f64 = 1e-9;

/// Specification of an annular sector mask.
///
/// Bearings are compass degrees (clockwise from north); values outside
/// 0–360 are normalized, not rejected. Radii are map units with
/// `0 <= inner_radius <= outer_radius`.
#[derive(Debug, Clone)]
pub struct RingSectorSpec {
    pub center: Point<f64>,
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub start_bearing: f64,
    pub end_bearing: f64,
}

/// Build the ring-sector mask polygon for a spec.
///
/// The first part is the sector ring itself: the outer arc walked start→end,
/// then the inner arc walked back end→start so the boundary closes into a
/// single ring. When the inner radius is zero the wedge is anchored at the
/// center point instead. When the span covers the full circle the result
/// degenerates to an annulus with the inner circle as a hole.
///
/// When the inner radius is positive a second part is added: a small
/// densified buffer around the center, 1% of the outer radius. Downstream
/// raster masks built from this polygon then always include the observer
/// location even though the ring itself excludes it.
pub fn ring_sector_mask(spec: &RingSectorSpec) -> MultiPolygon<f64> {
    // Out-of-range bearings wrap onto the compass rose
    let mut start = spec.start_bearing.rem_euclid(360.0);
    let end = spec.end_bearing.rem_euclid(360.0);

    // A span that cuts across 360 (ex. 270°→90°) becomes a signed
    // continuous range instead of inline modulo arithmetic
    if start > end {
        start -= 360.0;
    }

    let delta = (end - start).abs();
    if delta < ANGLE_EPSILON || delta >= 360.0 {
        return annulus_mask(spec);
    }

    let min_angle = start.min(end);
    let max_angle = start.max(end);

    let mut ring: Vec<Coord<f64>> = Vec::new();

    if spec.inner_radius == 0.0 {
        // Degenerate inner arc collapses to the center point
        ring.push(Coord {
            x: spec.center.x(),
            y: spec.center.y(),
        });
    }

    walk_arc(&spec.center, spec.outer_radius, min_angle, max_angle, &mut ring);

    if spec.inner_radius > 0.0 {
        // Inner arc runs in reverse so the boundary forms one closed ring
        walk_arc(&spec.center, spec.inner_radius, max_angle, min_angle, &mut ring);
    }

    let first = ring[0];
    ring.push(first);

    let mut parts = vec![Polygon::new(LineString::from(ring), vec![])];

    if spec.inner_radius > 0.0 {
        parts.push(center_buffer(spec));
    }

    MultiPolygon(parts)
}

/// Full-circle case: outer ring with the inner circle as a hole.
fn annulus_mask(spec: &RingSectorSpec) -> MultiPolygon<f64> {
    let mut outer: Vec<Coord<f64>> = Vec::new();
    walk_arc(&spec.center, spec.outer_radius, 0.0, 360.0, &mut outer);

    let mut interiors = Vec::new();
    if spec.inner_radius > 0.0 {
        let mut inner: Vec<Coord<f64>> = Vec::new();
        walk_arc(&spec.center, spec.inner_radius, 360.0, 0.0, &mut inner);
        interiors.push(LineString::from(inner));
    }

    MultiPolygon(vec![Polygon::new(LineString::from(outer), interiors)])
}

/// Walk an arc between two bearings (either direction) at the fixed stride,
/// guaranteeing the exact boundary bearing is the last sample even when the
/// stride overshoots.
fn walk_arc(center: &Point<f64>, radius: f64, from: f64, to: f64, out: &mut Vec<Coord<f64>>) {
    let step = if to >= from {
        ANGULAR_STEP_DEGREES
    } else {
        -ANGULAR_STEP_DEGREES
    };

    let strides = ((to - from) / step).floor() as usize;
    for i in 0..=strides {
        out.push(arc_vertex(center, radius, from + step * i as f64));
    }

    let last = from + step * strides as f64;
    if (to - last).abs() > ANGLE_EPSILON {
        out.push(arc_vertex(center, radius, to));
    }
}

/// Vertex on a circle at a compass bearing.
fn arc_vertex(center: &Point<f64>, radius: f64, bearing: f64) -> Coord<f64> {
    let theta = bearing_to_cartesian_radians(bearing);
    Coord {
        x: center.x() + radius * theta.cos(),
        y: center.y() + radius * theta.sin(),
    }
}

/// Convert a compass bearing (clockwise from north) to a Cartesian angle
/// (counterclockwise from east), in radians.
fn bearing_to_cartesian_radians(bearing: f64) -> f64 {
    (450.0 - bearing).rem_euclid(360.0) * (PI / 180.0)
}

/// Densified buffer around the center point, radius 1% of the outer radius,
/// segment length 0.2% of the outer radius.
fn center_buffer(spec: &RingSectorSpec) -> Polygon<f64> {
    let radius = spec.outer_radius * 0.01;
    let interval = spec.outer_radius * 0.002;
    let segments = ((2.0 * PI * radius / interval).ceil() as usize).max(8);

    let step = 360.0 / segments as f64;
    let mut coords = Vec::with_capacity(segments + 1);
    for i in 0..segments {
        coords.push(arc_vertex(&spec.center, radius, step * i as f64));
    }
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// Whether a compass bearing falls inside a start→end span.
///
/// The span is normalized the same way as [`ring_sector_mask`]: a start
/// greater than the end wraps through 0/360, and a zero-width span means the
/// full circle.
pub fn bearing_in_span(bearing: f64, start_bearing: f64, end_bearing: f64) -> bool {
    let mut start = start_bearing.rem_euclid(360.0);
    let end = end_bearing.rem_euclid(360.0);
    if start > end {
        start -= 360.0;
    }
    if (end - start).abs() < ANGLE_EPSILON {
        return true;
    }

    let b = bearing.rem_euclid(360.0);
    (b >= start - ANGLE_EPSILON && b <= end + ANGLE_EPSILON)
        || (b - 360.0 >= start - ANGLE_EPSILON && b - 360.0 <= end + ANGLE_EPSILON)
}
