//! End-to-end exercises of the full extraction-to-trajectories pipeline,
//! each built around a synthetic scalar field whose critical points are
//! known ahead of time.

use critrace::lattice::Lattice;
use critrace::{CriticalPointType, Options, Pipeline, Trajectory};

/// Samples `f` over every point of a `start`/`size` lattice, last axis
/// (time) fastest-varying, matching `Field`'s storage convention.
fn sample(start: Vec<i64>, size: Vec<i64>, mut f: impl FnMut(&[i64]) -> f64) -> (Lattice, Vec<f64>) {
    let dim = size.len();
    let lattice = Lattice::new(start.clone(), size.clone());
    let mut values = Vec::with_capacity(lattice.len());
    let mut point = start.clone();
    loop {
        values.push(f(&point));
        let mut axis = dim;
        loop {
            if axis == 0 {
                return (lattice, values);
            }
            axis -= 1;
            point[axis] += 1;
            if point[axis] < start[axis] + size[axis] {
                break;
            }
            point[axis] = start[axis];
        }
    }
}

/// A woven spatial pattern drifting upward over time, shifted by a large
/// constant so every sampled value (and hence every trajectory's peak) is
/// positive.
fn woven_field(spatial: i64, steps: i64) -> (Lattice, Vec<f64>) {
    let freq = std::f64::consts::PI / spatial as f64;
    sample(vec![0, 0, 0], vec![spatial, spatial, steps], |p| {
        let (x, y, t) = (p[0] as f64, p[1] as f64, p[2] as f64);
        (freq * x).sin() * (freq * y).cos() + 0.05 * t + 10.0
    })
}

fn canonical_points(t: &Trajectory) -> Vec<f64> {
    let mut flat = vec![t.len() as f64];
    for (x, val) in &t.points {
        flat.extend(x.iter().copied());
        flat.push(*val);
    }
    flat
}

fn assert_same_trajectory_multiset(a: &[Trajectory], b: &[Trajectory]) {
    assert_eq!(a.len(), b.len(), "trajectory counts differ");
    let mut a: Vec<_> = a.iter().map(canonical_points).collect();
    let mut b: Vec<_> = b.iter().map(canonical_points).collect();
    a.sort_by(|x, y| x.partial_cmp(y).unwrap());
    b.sort_by(|x, y| x.partial_cmp(y).unwrap());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.len(), y.len(), "a matched trajectory has a different point count");
        for (xi, yi) in x.iter().zip(y) {
            assert!((xi - yi).abs() < 1e-6, "{xi} != {yi}");
        }
    }
}

#[test]
fn woven_field_single_rank_maximum_mode_produces_trajectories() {
    let (lattice, values) = woven_field(32, 32);
    let mut options = Options::default();
    options.critical_point_type = CriticalPointType::Maximum;
    options.nblocks = 1;
    options.load_balancing = false;

    let (trajectories, _stats) = Pipeline::run(lattice, values, &options).unwrap();

    assert!(!trajectories.is_empty());
    for t in &trajectories {
        assert!(t.len() >= 2);
        assert!(t.max_val() > 0.0);
    }
}

#[test]
fn load_balanced_four_rank_run_matches_single_rank_run() {
    let (lattice, values) = woven_field(32, 32);
    let mut options = Options::default();
    options.critical_point_type = CriticalPointType::Maximum;
    options.nblocks = 1;
    options.load_balancing = false;
    let (single_rank, _) = Pipeline::run(lattice.clone(), values.clone(), &options).unwrap();

    options.nblocks = 4;
    options.load_balancing = true;
    let (balanced, _) = Pipeline::run(lattice, values, &options).unwrap();

    assert_same_trajectory_multiset(&single_rank, &balanced);
}

#[test]
fn uniform_field_has_no_critical_points_anywhere() {
    let (lattice, values) = sample(vec![0, 0, 0], vec![6, 6, 6], |_| 3.0);
    let options = Options::default();
    let (trajectories, _stats) = Pipeline::run(lattice, values, &options).unwrap();
    assert!(trajectories.is_empty());
}

/// A single time step has no top (d-simplex) hypercells at all: every
/// chain long enough to pin `k = dim` necessarily crosses the time axis,
/// and with only one time sample that crossing always lands out of
/// bounds. With no hypercells, `RelationBuilder` links nothing, so every
/// intersection is its own singleton component and falls below the
/// default length threshold.
#[test]
fn single_frame_input_has_no_temporal_extent() {
    let (lattice, values) = sample(vec![0, 0, 0], vec![8, 8, 1], |p| {
        let (x, y) = (p[0] as f64, p[1] as f64);
        (x * 0.7).sin() * (y * 0.7).cos()
    });
    let options = Options::default();
    let (trajectories, _stats) = Pipeline::run(lattice, values, &options).unwrap();
    assert!(trajectories.is_empty());
}

#[test]
fn two_disjoint_maxima_each_produce_their_own_trajectory() {
    let centers = [(2.3, 2.3), (6.7, 6.7)];
    let bump = |x: f64, y: f64, cx: f64, cy: f64| -((x - cx).powi(2) + (y - cy).powi(2));

    let (lattice, values) = sample(vec![0, 0, 0], vec![9, 9, 4], |p| {
        let (x, y, t) = (p[0] as f64, p[1] as f64, p[2] as f64);
        let a = bump(x, y, centers[0].0, centers[0].1);
        let b = bump(x, y, centers[1].0, centers[1].1);
        a.max(b) + 0.05 * t
    });

    let mut options = Options::default();
    options.critical_point_type = CriticalPointType::Maximum;
    options.nblocks = 1;
    options.load_balancing = false;

    let (trajectories, _stats) = Pipeline::run(lattice, values, &options).unwrap();
    assert_eq!(trajectories.len(), 2);

    for &(cx, cy) in &centers {
        let found = trajectories.iter().any(|t| {
            t.points
                .iter()
                .all(|(x, _)| (x[0] - cx).abs() < 1.0 && (x[1] - cy).abs() < 1.0)
        });
        assert!(found, "no trajectory tracked the maximum near ({cx}, {cy})");
    }
}

#[test]
fn value_threshold_above_the_global_maximum_drops_everything() {
    let (lattice, values) = woven_field(12, 12);
    let global_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let mut options = Options::default();
    options.value_threshold = global_max + 1.0;
    options.nblocks = 1;
    options.load_balancing = false;

    let (trajectories, _stats) = Pipeline::run(lattice, values, &options).unwrap();
    assert!(trajectories.is_empty());
}
