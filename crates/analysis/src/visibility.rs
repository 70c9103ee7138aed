//! Observer/target visibility aggregation
//!
//! Iterates every observer/target pair, asks the surface capability whether
//! an unobstructed sightline exists, and aggregates two views of the answer:
//! per observer, "can this point see at least one target"; per target, "how
//! many observers can see it".
//!
//! Points whose elevation samples as void are skipped silently: they get no
//! entries in any output map and do not perturb other points' results. The
//! skipped indices are reported so callers can warn about partial coverage.

use std::collections::{BTreeMap, BTreeSet};

use geo_types::Point;

use crate::surface::{Point3, Sightline, SurfaceService};

/// Parameters for visibility aggregation
#[derive(Debug, Clone)]
pub struct AggregationParams {
    /// Height added above the sampled surface at each observer (z units)
    pub observer_offset: f64,
    /// Height added above the sampled surface at each target
    pub target_offset: f64,
    /// Record per-pair sightline geometry for rendering
    pub record_sightlines: bool,
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self {
            observer_offset: 2.0,
            target_offset: 0.0,
            record_sightlines: true,
        }
    }
}

/// One observer/target sightline, kept for rendering.
///
/// `from`/`to` carry the offset-adjusted 3D endpoints; `line` is the oracle
/// outcome passed through untouched.
#[derive(Debug, Clone)]
pub struct SightlineRecord {
    pub observer: usize,
    pub target: usize,
    pub from: Point3,
    pub to: Point3,
    pub line: Sightline,
}

/// Result of visibility aggregation.
///
/// All maps are keyed by input index. Recomputed in full on every run; with a
/// deterministic surface the same inputs always produce the same maps.
#[derive(Debug, Clone, Default)]
pub struct VisibilityAggregate {
    /// Observer index → sees at least one target
    pub observer_sees: BTreeMap<usize, bool>,
    /// Target index → number of observers that can see it (absent: never seen)
    pub target_observer_count: BTreeMap<usize, u32>,
    /// Observer indices skipped because their elevation was void
    pub skipped_observers: Vec<usize>,
    /// Target indices skipped because their elevation was void
    pub skipped_targets: Vec<usize>,
    /// Per-pair sightlines, in pair visit order, when requested
    pub sightlines: Vec<SightlineRecord>,
}

impl VisibilityAggregate {
    /// Total points (observers + targets) skipped for void elevation
    pub fn skipped_count(&self) -> usize {
        self.skipped_observers.len() + self.skipped_targets.len()
    }
}

/// Aggregate pairwise visibility between observers and targets.
///
/// For each observer in input order, the surface elevation is sampled and the
/// observer offset applied; for each target (nested, input order) likewise.
/// The line-of-sight capability is invoked on every surviving pair. There is
/// no early exit once an observer is known to see something, because the
/// per-target counts need every pair visited.
///
/// The loop is strictly sequential: each call mutates the shared accumulators.
/// Cost is O(|observers| × |targets|) line-of-sight calls.
pub fn aggregate_visibility<S: SurfaceService>(
    surface: &S,
    observers: &[Point<f64>],
    targets: &[Point<f64>],
    params: &AggregationParams,
) -> VisibilityAggregate {
    let mut aggregate = VisibilityAggregate::default();
    let mut void_targets: BTreeSet<usize> = BTreeSet::new();

    for (oi, observer) in observers.iter().enumerate() {
        let Some(observer_z) = surface.elevation(observer.x(), observer.y()) else {
            aggregate.skipped_observers.push(oi);
            continue;
        };
        let from = Point3::new(
            observer.x(),
            observer.y(),
            observer_z + params.observer_offset,
        );

        let mut sees_any = false;

        for (ti, target) in targets.iter().enumerate() {
            let Some(target_z) = surface.elevation(target.x(), target.y()) else {
                void_targets.insert(ti);
                continue;
            };
            let to = Point3::new(target.x(), target.y(), target_z + params.target_offset);

            let line = surface.line_of_sight(from, to);

            if line.is_visible {
                sees_any = true;
                *aggregate.target_observer_count.entry(ti).or_insert(0) += 1;
            }

            if params.record_sightlines {
                aggregate.sightlines.push(SightlineRecord {
                    observer: oi,
                    target: ti,
                    from,
                    to,
                    line,
                });
            }
        }

        aggregate.observer_sees.insert(oi, sees_any);
    }

    aggregate.skipped_targets = void_targets.into_iter().collect();
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic oracle over a flat surface with configurable void
    /// positions and a fixed line-of-sight answer.
    struct FixedOracle {
        visible: bool,
        void_points: Vec<(f64, f64)>,
    }

    impl FixedOracle {
        fn visible() -> Self {
            Self {
                visible: true,
                void_points: Vec::new(),
            }
        }

        fn blind() -> Self {
            Self {
                visible: false,
                void_points: Vec::new(),
            }
        }
    }

    impl SurfaceService for FixedOracle {
        fn elevation(&self, x: f64, y: f64) -> Option<f64> {
            let void = self
                .void_points
                .iter()
                .any(|&(vx, vy)| (vx - x).abs() < 1e-9 && (vy - y).abs() < 1e-9);
            if void {
                None
            } else {
                Some(100.0)
            }
        }

        fn line_of_sight(&self, _observer: Point3, _target: Point3) -> Sightline {
            Sightline {
                is_visible: self.visible,
                ..Default::default()
            }
        }
    }

    fn points(coords: &[(f64, f64)]) -> Vec<Point<f64>> {
        coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_all_visible() {
        let observers = points(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let targets = points(&[(5.0, 5.0), (15.0, 5.0)]);

        let agg = aggregate_visibility(
            &FixedOracle::visible(),
            &observers,
            &targets,
            &AggregationParams::default(),
        );

        assert!(agg.observer_sees.values().all(|&sees| sees));
        assert_eq!(agg.observer_sees.len(), 3);
        for ti in 0..targets.len() {
            assert_eq!(agg.target_observer_count[&ti], observers.len() as u32);
        }
        assert!(agg.skipped_observers.is_empty());
        assert!(agg.skipped_targets.is_empty());
        assert_eq!(agg.sightlines.len(), 6);
    }

    #[test]
    fn test_none_visible() {
        let observers = points(&[(0.0, 0.0), (10.0, 0.0)]);
        let targets = points(&[(5.0, 5.0), (15.0, 5.0)]);

        let agg = aggregate_visibility(
            &FixedOracle::blind(),
            &observers,
            &targets,
            &AggregationParams::default(),
        );

        assert!(agg.observer_sees.values().all(|&sees| !sees));
        assert!(agg.target_observer_count.is_empty());
    }

    #[test]
    fn test_idempotent() {
        let observers = points(&[(0.0, 0.0), (10.0, 0.0)]);
        let targets = points(&[(5.0, 5.0)]);
        let params = AggregationParams::default();
        let oracle = FixedOracle::visible();

        let a = aggregate_visibility(&oracle, &observers, &targets, &params);
        let b = aggregate_visibility(&oracle, &observers, &targets, &params);

        assert_eq!(a.observer_sees, b.observer_sees);
        assert_eq!(a.target_observer_count, b.target_observer_count);
        assert_eq!(a.skipped_observers, b.skipped_observers);
        assert_eq!(a.skipped_targets, b.skipped_targets);
    }

    #[test]
    fn test_void_observer_skipped_silently() {
        let observers = points(&[(0.0, 0.0), (10.0, 0.0)]);
        let targets = points(&[(5.0, 5.0)]);

        let oracle = FixedOracle {
            visible: true,
            void_points: vec![(0.0, 0.0)],
        };
        let agg =
            aggregate_visibility(&oracle, &observers, &targets, &AggregationParams::default());

        // skipped observer has no entry anywhere
        assert!(!agg.observer_sees.contains_key(&0));
        assert_eq!(agg.skipped_observers, vec![0]);

        // remaining observer is unaffected
        assert_eq!(agg.observer_sees[&1], true);
        assert_eq!(agg.target_observer_count[&0], 1);
    }

    #[test]
    fn test_void_target_skipped_silently() {
        let observers = points(&[(0.0, 0.0), (10.0, 0.0)]);
        let targets = points(&[(5.0, 5.0), (15.0, 5.0)]);

        let oracle = FixedOracle {
            visible: true,
            void_points: vec![(15.0, 5.0)],
        };
        let agg =
            aggregate_visibility(&oracle, &observers, &targets, &AggregationParams::default());

        assert!(!agg.target_observer_count.contains_key(&1));
        assert_eq!(agg.skipped_targets, vec![1]);
        assert_eq!(agg.target_observer_count[&0], 2);
        assert!(agg.observer_sees.values().all(|&sees| sees));
    }

    #[test]
    fn test_counts_accumulate_per_target() {
        // One observer blind, handled by giving each observer its own oracle
        // pass: a target seen by two of three observers counts 2
        let observers = points(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let targets = points(&[(5.0, 5.0)]);

        struct AlternatingOracle;
        impl SurfaceService for AlternatingOracle {
            fn elevation(&self, _x: f64, _y: f64) -> Option<f64> {
                Some(50.0)
            }
            fn line_of_sight(&self, observer: Point3, _target: Point3) -> Sightline {
                Sightline {
                    // observers at x == 10 see nothing
                    is_visible: observer.x != 10.0,
                    ..Default::default()
                }
            }
        }

        let agg = aggregate_visibility(
            &AlternatingOracle,
            &observers,
            &targets,
            &AggregationParams::default(),
        );

        assert_eq!(agg.target_observer_count[&0], 2);
        assert_eq!(agg.observer_sees[&0], true);
        assert_eq!(agg.observer_sees[&1], false);
        assert_eq!(agg.observer_sees[&2], true);
    }

    #[test]
    fn test_sightlines_not_recorded_when_disabled() {
        let observers = points(&[(0.0, 0.0)]);
        let targets = points(&[(5.0, 5.0)]);

        let params = AggregationParams {
            record_sightlines: false,
            ..Default::default()
        };
        let agg = aggregate_visibility(&FixedOracle::visible(), &observers, &targets, &params);

        assert!(agg.sightlines.is_empty());
        assert_eq!(agg.observer_sees[&0], true);
    }
}
