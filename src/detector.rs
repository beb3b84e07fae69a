//! Critical point extraction via inverse-linear interpolation of the
//! gradient over each `(d-1)`-simplex.

use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector};

use crate::field::{Field, GradientField};
use crate::simplex::{SimplexId, SimplexMesh};
use crate::config::CriticalPointType;

/// A critical point found strictly inside a `(d-1)`-simplex.
#[derive(Debug, Clone)]
pub struct Intersection {
    /// Primary key: the simplex this critical point was found inside.
    pub eid: SimplexId,
    /// Interpolated coordinate.
    pub x: DVector<f64>,
    /// Interpolated scalar value at `x`.
    pub val: f64,
    /// Integer corner of `eid`.
    pub corner: Vec<i64>,
    /// Sibling ids linked by [`crate::relation::RelationBuilder`]; always
    /// strictly less than `eid` under the canonical order.
    pub related: BTreeSet<SimplexId>,
}

impl Intersection {
    fn new(eid: SimplexId, x: DVector<f64>, val: f64) -> Self {
        let corner = eid.corner();
        Intersection {
            eid,
            x,
            val,
            corner,
            related: BTreeSet::new(),
        }
    }
}

/// Aggregate numerical-rejection counts, surfaced but never consulted for
/// control flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionStats {
    /// Rejected because `G` was singular or near-singular.
    pub singular: usize,
    /// Rejected because some `mu_i` fell outside `[0, 1]`.
    pub outside_simplex: usize,
    /// Rejected because the interpolated Hessian was not negative-definite
    /// (only counted in [`CriticalPointType::Maximum`] mode).
    pub not_maximum: usize,
}

impl DetectionStats {
    pub fn rejected(&self) -> usize {
        self.singular + self.outside_simplex + self.not_maximum
    }
}

/// Iterates every `(d-1)`-simplex of a ghosted sub-lattice and extracts
/// critical points from the interpolated gradient field.
pub struct CriticalPointDetector<'a> {
    mesh: &'a SimplexMesh,
    field: &'a Field,
    gradient: &'a GradientField,
    critical_point_type: CriticalPointType,
}

impl<'a> CriticalPointDetector<'a> {
    pub fn new(
        mesh: &'a SimplexMesh,
        field: &'a Field,
        gradient: &'a GradientField,
        critical_point_type: CriticalPointType,
    ) -> Self {
        CriticalPointDetector {
            mesh,
            field,
            gradient,
            critical_point_type,
        }
    }

    /// Runs the detector over every `(d-1)`-simplex, in parallel over the
    /// (deterministic) enumeration order from [`SimplexMesh::element_for`].
    ///
    /// Intersections are accumulated behind a single mutex: the detector is
    /// not the bottleneck rayon is brought in for elsewhere in the
    /// pipeline, and a single lock keeps the result trivially deterministic
    /// regardless of scheduling.
    pub fn run(&self) -> (Vec<Intersection>, DetectionStats) {
        use rayon::prelude::*;
        use std::sync::Mutex;

        let dim = self.mesh.dim();
        let mut faces = Vec::new();
        self.mesh.element_for(dim - 1, |s| faces.push(s));

        let found = Mutex::new(Vec::new());
        let stats = Mutex::new(DetectionStats::default());

        faces.par_iter().for_each(|s| {
            match self.evaluate(s) {
                Ok(intersection) => found.lock().unwrap().push(intersection),
                Err(rejection) => {
                    let mut stats = stats.lock().unwrap();
                    match rejection {
                        Rejection::Singular => stats.singular += 1,
                        Rejection::OutsideSimplex => stats.outside_simplex += 1,
                        Rejection::NotMaximum => stats.not_maximum += 1,
                    }
                }
            }
        });

        let mut intersections = found.into_inner().unwrap();
        intersections.sort_by(|a, b| a.eid.cmp(&b.eid));
        (intersections, stats.into_inner().unwrap())
    }

    fn evaluate(&self, s: &SimplexId) -> Result<Intersection, Rejection> {
        let dim = self.mesh.dim();
        let vertices = s.vertices();
        debug_assert_eq!(vertices.len(), dim);

        let gradients: Vec<DVector<f64>> = vertices
            .iter()
            .map(|v| self.gradient.at(v).expect("ghosted lattice must cover every simplex vertex"))
            .collect();

        let mu = match solve_barycentric(&gradients) {
            Some(mu) => mu,
            None => return Err(Rejection::Singular),
        };

        if !mu.iter().all(|&m| (0.0..=1.0).contains(&m)) {
            return Err(Rejection::OutsideSimplex);
        }

        if self.critical_point_type == CriticalPointType::Maximum {
            let hessian = self.interpolate_hessian(vertices, &mu);
            let spatial = spatial_block(&hessian, dim - 1);
            if !is_negative_definite(&spatial) {
                return Err(Rejection::NotMaximum);
            }
        }

        let mut x = DVector::zeros(dim);
        let mut val = 0.0;
        for (i, v) in vertices.iter().enumerate() {
            let coord = DVector::from_iterator(dim, v.iter().map(|&c| c as f64));
            x += &coord * mu[i];
            val += mu[i] * self.field.value_at(v).expect("vertex must be in bounds");
        }

        Ok(Intersection::new(s.clone(), x, val))
    }

    fn interpolate_hessian(&self, vertices: &[Vec<i64>], mu: &DVector<f64>) -> DMatrix<f64> {
        let dim = self.mesh.dim();
        let mut hessian = DMatrix::zeros(dim, dim);
        for (i, v) in vertices.iter().enumerate() {
            if let Some(h) = self.field.hessian_at(v) {
                hessian += h * mu[i];
            }
        }
        hessian
    }
}

#[derive(Debug, Clone, Copy)]
enum Rejection {
    Singular,
    OutsideSimplex,
    NotMaximum,
}

/// Solves `G mu = 0`, `sum(mu) = 1` for the barycentric coordinates of the
/// zero of a linearly-interpolated gradient field, by replacing the last
/// row of `G` with the partition-of-unity constraint (the system is
/// generically rank-deficient by exactly one once `G mu = 0` holds, so the
/// dropped row carries no information the remaining rows and the
/// constraint don't already fix).
fn solve_barycentric(gradients: &[DVector<f64>]) -> Option<DVector<f64>> {
    let dim = gradients.len();
    let mut a = DMatrix::zeros(dim, dim);
    for row in 0..dim - 1 {
        for (col, g) in gradients.iter().enumerate() {
            a[(row, col)] = g[row];
        }
    }
    for col in 0..dim {
        a[(dim - 1, col)] = 1.0;
    }

    let scale = a.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs())).max(1.0);
    let det = a.determinant();
    if det.abs() < 1e-9 * scale {
        return None;
    }

    let mut b = DVector::zeros(dim);
    b[dim - 1] = 1.0;

    let lu = a.lu();
    lu.solve(&b)
}

/// The leading `n x n` spatial block of `hessian`, dropping the time
/// row/column. The field's last axis is always time (see
/// [`crate::field::Field`]'s storage convention), and for a field that is
/// merely linear in time (the common case: no space-time coupling) the
/// time row/column of the full interpolated Hessian is ~0, giving a zero
/// eigenvalue that would make every point fail a negative-definiteness
/// check over the full matrix. Maximum-mode filtering only cares whether
/// the point is a spatial maximum, so only the spatial eigenvalues
/// should be checked.
fn spatial_block(hessian: &DMatrix<f64>, n: usize) -> DMatrix<f64> {
    let mut spatial = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            spatial[(i, j)] = hessian[(i, j)];
        }
    }
    spatial
}

fn is_negative_definite(hessian: &DMatrix<f64>) -> bool {
    let eigen = nalgebra::linalg::SymmetricEigen::new(hessian.clone());
    eigen.eigenvalues.iter().all(|&lambda| lambda < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Lattice;

    /// f(x, y, t) = -(x^2 + y^2) + t, a paraboloid moving upward in time:
    /// a single local maximum at (0, 0) for every t, which should be found
    /// as a critical point of the (d-1)-faces crossing x = y = 0.
    fn paraboloid(n: i64, dim: usize) -> (SimplexMesh, Field, GradientField) {
        let half = n / 2;
        let lattice = Lattice::new(vec![-half; dim], vec![n; dim]);
        let size = lattice.size().to_vec();
        let mut values = Vec::with_capacity(lattice.len());
        let mut point = vec![-half; dim];
        loop {
            let spatial: f64 = point[..dim - 1].iter().map(|&c| (c * c) as f64).sum();
            let t = point[dim - 1] as f64;
            values.push(-spatial + t);
            let mut axis = dim;
            loop {
                if axis == 0 {
                    let field = Field::new(lattice.clone(), values);
                    let gradient = GradientField::compute(&field);
                    let mesh = SimplexMesh::new(lattice);
                    return (mesh, field, gradient);
                }
                axis -= 1;
                point[axis] += 1;
                if point[axis] < -half + size[axis] {
                    break;
                }
                point[axis] = -half;
            }
        }
    }

    #[test]
    fn finds_critical_points_in_all_mode() {
        let (mesh, field, gradient) = paraboloid(6, 3);
        let detector = CriticalPointDetector::new(&mesh, &field, &gradient, CriticalPointType::All);
        let (intersections, _stats) = detector.run();
        assert!(!intersections.is_empty());
    }

    #[test]
    fn uniform_field_has_no_critical_points() {
        let dim = 3;
        let lattice = Lattice::new(vec![0; dim], vec![4; dim]);
        let values = vec![1.0; lattice.len()];
        let field = Field::new(lattice.clone(), values);
        let gradient = GradientField::compute(&field);
        let mesh = SimplexMesh::new(lattice);
        let detector = CriticalPointDetector::new(&mesh, &field, &gradient, CriticalPointType::All);
        let (intersections, stats) = detector.run();
        assert!(intersections.is_empty());

        // A uniform field has a zero gradient everywhere, so every
        // (d-1)-simplex's G matrix is singular: every face gets rejected,
        // and specifically as `singular`, not for any other reason.
        let mut face_count = 0;
        mesh.element_for(dim - 1, |_| face_count += 1);
        assert_eq!(stats.singular, face_count);
        assert_eq!(stats.rejected(), face_count);
    }

    #[test]
    fn maximum_mode_is_at_least_as_strict_as_all_mode() {
        let (mesh, field, gradient) = paraboloid(6, 3);
        let all = CriticalPointDetector::new(&mesh, &field, &gradient, CriticalPointType::All).run();
        let maximum =
            CriticalPointDetector::new(&mesh, &field, &gradient, CriticalPointType::Maximum).run();
        assert!(maximum.0.len() <= all.0.len());
    }
}
