//! Finite-difference gradient and Hessian of a gridded scalar field,
//! restricted to a ghosted sub-lattice.
//!
//! Coordinates, gradients and Hessians use `nalgebra`'s dynamically-sized
//! `DVector`/`DMatrix` rather than compile-time `DimName` generics, since
//! `dim` only ever takes two values (3, 4) here.

use nalgebra::{DMatrix, DVector};

use crate::lattice::Lattice;

/// A dense, row-major scalar field sampled on a [`Lattice`].
///
/// Values are stored flattened with the last axis varying fastest, which
/// for a (x, y, [z], t) lattice makes time the fastest-varying axis.
pub struct Field {
    lattice: Lattice,
    values: Vec<f64>,
}

impl Field {
    pub fn new(lattice: Lattice, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), lattice.len(), "field size must match lattice size");
        Field { lattice, values }
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    fn strides(&self) -> Vec<i64> {
        let size = self.lattice.size();
        let dim = size.len();
        let mut strides = vec![1i64; dim];
        for axis in (0..dim - 1).rev() {
            strides[axis] = strides[axis + 1] * size[axis + 1];
        }
        strides
    }

    fn flat_index(&self, point: &[i64]) -> Option<usize> {
        if !self.lattice.contains(point) {
            return None;
        }
        let lower = self.lattice.lower_bound();
        let strides = self.strides();
        let idx = point
            .iter()
            .zip(&lower)
            .zip(&strides)
            .map(|((&p, &lo), &stride)| (p - lo) * stride)
            .sum::<i64>();
        Some(idx as usize)
    }

    /// Scalar value at an integer grid point, if it lies within bounds.
    pub fn value_at(&self, point: &[i64]) -> Option<f64> {
        self.flat_index(point).map(|i| self.values[i])
    }

    /// Copies out the portion of this field covered by `sub` (a ghosted
    /// per-rank sub-lattice), for use by [`crate::detector::CriticalPointDetector`].
    pub fn restrict(&self, sub: &Lattice) -> Field {
        let dim = sub.dim();
        let mut values = Vec::with_capacity(sub.len());
        let lower = sub.lower_bound().to_vec();
        let upper = sub.upper_bound();
        let mut point = lower.clone();
        loop {
            values.push(self.value_at(&point).expect("sub-lattice must lie within the global field"));
            let mut axis = dim;
            loop {
                if axis == 0 {
                    return Field::new(sub.clone(), values);
                }
                axis -= 1;
                point[axis] += 1;
                if point[axis] < upper[axis] {
                    break;
                }
                point[axis] = lower[axis];
            }
        }
    }

    /// Central (or one-sided, at the boundary) finite-difference gradient
    /// at `point`. Returns `None` if `point` is not inside the lattice.
    pub fn gradient_at(&self, point: &[i64]) -> Option<DVector<f64>> {
        let dim = self.lattice.dim();
        if !self.lattice.contains(point) {
            return None;
        }
        let mut grad = DVector::zeros(dim);
        for axis in 0..dim {
            grad[axis] = self.directional_derivative(point, axis);
        }
        Some(grad)
    }

    fn directional_derivative(&self, point: &[i64], axis: usize) -> f64 {
        let mut plus = point.to_vec();
        plus[axis] += 1;
        let mut minus = point.to_vec();
        minus[axis] -= 1;

        match (self.value_at(&plus), self.value_at(&minus)) {
            (Some(p), Some(m)) => (p - m) / 2.0,
            (Some(p), None) => p - self.value_at(point).unwrap(),
            (None, Some(m)) => self.value_at(point).unwrap() - m,
            (None, None) => 0.0,
        }
    }

    /// Finite-difference Hessian at `point` (symmetric `dim x dim`
    /// matrix), used by the "maximum" critical point filter.
    pub fn hessian_at(&self, point: &[i64]) -> Option<DMatrix<f64>> {
        let dim = self.lattice.dim();
        if !self.lattice.contains(point) {
            return None;
        }
        let mut hessian = DMatrix::zeros(dim, dim);
        let center = self.value_at(point)?;
        for i in 0..dim {
            for j in i..dim {
                let value = if i == j {
                    let mut plus = point.to_vec();
                    plus[i] += 1;
                    let mut minus = point.to_vec();
                    minus[i] -= 1;
                    match (self.value_at(&plus), self.value_at(&minus)) {
                        (Some(p), Some(m)) => p - 2.0 * center + m,
                        _ => 0.0,
                    }
                } else {
                    let mut pp = point.to_vec();
                    pp[i] += 1;
                    pp[j] += 1;
                    let mut pm = point.to_vec();
                    pm[i] += 1;
                    pm[j] -= 1;
                    let mut mp = point.to_vec();
                    mp[i] -= 1;
                    mp[j] += 1;
                    let mut mm = point.to_vec();
                    mm[i] -= 1;
                    mm[j] -= 1;
                    match (
                        self.value_at(&pp),
                        self.value_at(&pm),
                        self.value_at(&mp),
                        self.value_at(&mm),
                    ) {
                        (Some(pp), Some(pm), Some(mp), Some(mm)) => (pp - pm - mp + mm) / 4.0,
                        _ => 0.0,
                    }
                };
                hessian[(i, j)] = value;
                hessian[(j, i)] = value;
            }
        }
        Some(hessian)
    }
}

/// Precomputed gradient field derived from a [`Field`], used by
/// [`crate::detector::CriticalPointDetector`].
pub struct GradientField {
    lattice: Lattice,
    values: Vec<DVector<f64>>,
}

impl GradientField {
    pub fn compute(field: &Field) -> Self {
        let lattice = field.lattice().clone();
        let dim = lattice.dim();
        let mut values = Vec::with_capacity(lattice.len());

        let lower = lattice.lower_bound().to_vec();
        let upper = lattice.upper_bound();
        let mut point = lower.clone();
        loop {
            values.push(
                field
                    .gradient_at(&point)
                    .unwrap_or_else(|| DVector::zeros(dim)),
            );
            let mut axis = dim;
            loop {
                if axis == 0 {
                    return GradientField { lattice, values };
                }
                axis -= 1;
                point[axis] += 1;
                if point[axis] < upper[axis] {
                    break;
                }
                point[axis] = lower[axis];
            }
        }
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn at(&self, point: &[i64]) -> Option<DVector<f64>> {
        if !self.lattice.contains(point) {
            return None;
        }
        let lower = self.lattice.lower_bound();
        let size = self.lattice.size();
        let dim = size.len();
        let mut strides = vec![1i64; dim];
        for axis in (0..dim - 1).rev() {
            strides[axis] = strides[axis + 1] * size[axis + 1];
        }
        let idx = point
            .iter()
            .zip(lower)
            .zip(&strides)
            .map(|((&p, &lo), &stride)| (p - lo) * stride)
            .sum::<i64>() as usize;
        Some(self.values[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_field(n: i64, dim: usize) -> Field {
        let lattice = Lattice::new(vec![0; dim], vec![n; dim]);
        let size = lattice.size().to_vec();
        let mut values = Vec::with_capacity(lattice.len());
        let mut point = vec![0i64; dim];
        loop {
            // f(x) = sum(x_i), so grad is (1,1,...,1) everywhere and the Hessian is zero.
            values.push(point.iter().sum::<i64>() as f64);
            let mut axis = dim;
            loop {
                if axis == 0 {
                    return Field::new(lattice, values);
                }
                axis -= 1;
                point[axis] += 1;
                if point[axis] < size[axis] {
                    break;
                }
                point[axis] = 0;
            }
        }
    }

    #[test]
    fn gradient_of_linear_field_is_constant() {
        let field = linear_field(5, 3);
        let grad = field.gradient_at(&[2, 2, 2]).unwrap();
        for i in 0..3 {
            assert!((grad[i] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn hessian_of_linear_field_is_zero() {
        let field = linear_field(5, 3);
        let hessian = field.hessian_at(&[2, 2, 2]).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!(hessian[(i, j)].abs() < 1e-9);
            }
        }
    }

    #[test]
    fn out_of_bounds_point_has_no_gradient() {
        let field = linear_field(5, 3);
        assert!(field.gradient_at(&[10, 0, 0]).is_none());
    }
}
