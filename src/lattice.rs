//! Index arithmetic over an axis-aligned integer hyperrectangle, and its
//! partitioning into per-rank (core, ghost) sub-lattices.

use crate::Rank;

/// An axis-aligned integer hyperrectangle: `dim` axes, each spanning
/// `[start[i], start[i] + size[i])`.
///
/// Invariant: `size[i] >= 1` for every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lattice {
    dim: usize,
    start: Vec<i64>,
    size: Vec<i64>,
}

impl Lattice {
    pub fn new(start: Vec<i64>, size: Vec<i64>) -> Self {
        assert_eq!(start.len(), size.len(), "start/size dimension mismatch");
        assert!(!size.is_empty(), "a lattice needs at least one axis");
        assert!(size.iter().all(|&n| n >= 1), "lattice axis sizes must be >= 1");
        Lattice {
            dim: start.len(),
            start,
            size,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Inclusive lower bound per axis.
    pub fn lower_bound(&self) -> &[i64] {
        &self.start
    }

    /// Exclusive upper bound per axis.
    pub fn upper_bound(&self) -> Vec<i64> {
        self.start
            .iter()
            .zip(&self.size)
            .map(|(s, n)| s + n)
            .collect()
    }

    pub fn size(&self) -> &[i64] {
        &self.size
    }

    /// Total number of lattice points (product of axis sizes).
    pub fn len(&self) -> usize {
        self.size.iter().product::<i64>() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `point` (a `dim`-length integer coordinate) lies within
    /// this lattice's bounds.
    pub fn contains(&self, point: &[i64]) -> bool {
        if point.len() != self.dim {
            return false;
        }
        let upper = self.upper_bound();
        point
            .iter()
            .zip(&self.start)
            .zip(&upper)
            .all(|((&p, &lo), &hi)| lo <= p && p < hi)
    }

    /// Grows this lattice outward by `margin` along every axis, clamped to
    /// `global`'s bounds. Used to turn a rank's core sub-lattice into its
    /// ghosted sub-lattice.
    pub fn grow_clamped(&self, margin: i64, global: &Lattice) -> Lattice {
        let global_upper = global.upper_bound();
        let upper = self.upper_bound();
        let new_start: Vec<i64> = self
            .start
            .iter()
            .zip(&global.start)
            .map(|(&s, &g)| (s - margin).max(g))
            .collect();
        let new_upper: Vec<i64> = upper
            .iter()
            .zip(&global_upper)
            .map(|(&u, &g)| (u + margin).min(g))
            .collect();
        let new_size: Vec<i64> = new_start
            .iter()
            .zip(&new_upper)
            .map(|(&s, &u)| (u - s).max(1))
            .collect();
        Lattice::new(new_start, new_size)
    }

    /// Splits this lattice into `nblocks` contiguous core sub-lattices by
    /// recursive bisection of the longest remaining axis, a recursive
    /// coordinate bisection over integer index ranges rather than
    /// continuous point clouds.
    ///
    /// Returns one `(core, ghost)` pair per rank, ranks numbered in the
    /// order produced by the recursive split.
    pub fn partition(&self, nblocks: usize, ghost_margin: i64) -> Vec<(Rank, Lattice, Lattice)> {
        assert!(nblocks >= 1);
        let cores = Self::recursive_split(self.clone(), nblocks);
        cores
            .into_iter()
            .enumerate()
            .map(|(i, core)| {
                let ghost = core.grow_clamped(ghost_margin, self);
                (Rank(i), core, ghost)
            })
            .collect()
    }

    fn recursive_split(lattice: Lattice, nblocks: usize) -> Vec<Lattice> {
        if nblocks <= 1 {
            return vec![lattice];
        }
        let left_count = nblocks / 2;
        let right_count = nblocks - left_count;

        let axis = (0..lattice.dim)
            .max_by_key(|&i| lattice.size[i])
            .expect("lattice has at least one axis");

        let total = lattice.size[axis];
        let split_at = (total * left_count as i64 / nblocks as i64).max(1).min(total - 1).max(1);

        let mut left_size = lattice.size.clone();
        left_size[axis] = split_at;
        let left = Lattice::new(lattice.start.clone(), left_size);

        let mut right_start = lattice.start.clone();
        right_start[axis] += split_at;
        let mut right_size = lattice.size.clone();
        right_size[axis] = total - split_at;
        let right = Lattice::new(right_start, right_size);

        let mut out = Self::recursive_split(left, left_count);
        out.extend(Self::recursive_split(right, right_count));
        out
    }
}
